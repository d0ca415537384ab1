/// Database row types — these map directly to SQLite rows.
/// Distinct from courier-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub public_key: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub iv: String,
    pub ciphertext: String,
    pub created_at: String,
}
