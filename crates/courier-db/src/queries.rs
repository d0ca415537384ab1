use crate::Database;
use crate::models::{MessageRow, UserRow};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use tracing::warn;

impl Database {
    // -- Users --

    /// Idempotent registration: returns the existing user for a known
    /// username (updating the stored key if it changed), inserts otherwise.
    pub fn register_user(&self, username: &str, public_key: &str) -> Result<UserRow> {
        self.with_conn(|conn| upsert_user(conn, username, public_key))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn search_users(&self, query: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| query_users_matching(conn, query))
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        from_id: i64,
        to_id: i64,
        iv: &str,
        ciphertext: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (from_id, to_id, iv, ciphertext) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![from_id, to_id, iv, ciphertext],
            )?;

            let id = conn.last_insert_rowid();
            query_message_by_id(conn, id)?
                .ok_or_else(|| anyhow!("Message {} missing after insert", id))
        })
    }

    /// Full conversation between two identities, direction-agnostic,
    /// ascending by creation time with row id breaking timestamp ties.
    pub fn get_history(&self, user_id: i64, peer_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_history(conn, user_id, peer_id))
    }
}

fn upsert_user(conn: &Connection, username: &str, public_key: &str) -> Result<UserRow> {
    if let Some(existing) = query_user_by_username(conn, username)? {
        return refresh_public_key(conn, existing, public_key);
    }

    match conn.execute(
        "INSERT INTO users (username, public_key) VALUES (?1, ?2)",
        (username, public_key),
    ) {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            query_user_by_id(conn, id)?.ok_or_else(|| anyhow!("User {} missing after insert", id))
        }
        // Lost a registration race: another caller inserted this username
        // between our read and our write. Re-read and treat as an update.
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            warn!("Concurrent registration for '{}', resolving as update", username);
            let existing = query_user_by_username(conn, username)?
                .ok_or_else(|| anyhow!("User '{}' missing after unique conflict", username))?;
            refresh_public_key(conn, existing, public_key)
        }
        Err(e) => Err(e.into()),
    }
}

fn refresh_public_key(conn: &Connection, user: UserRow, public_key: &str) -> Result<UserRow> {
    if user.public_key == public_key {
        return Ok(user);
    }

    conn.execute(
        "UPDATE users SET public_key = ?1 WHERE id = ?2",
        rusqlite::params![public_key, user.id],
    )?;

    Ok(UserRow {
        public_key: public_key.to_string(),
        ..user
    })
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, public_key, created_at FROM users WHERE id = ?1")?;

    let row = stmt.query_row([id], user_from_row).optional()?;

    Ok(row)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn
        .prepare("SELECT id, username, public_key, created_at FROM users WHERE username = ?1")?;

    let row = stmt.query_row([username], user_from_row).optional()?;

    Ok(row)
}

fn query_users_matching(conn: &Connection, query: &str) -> Result<Vec<UserRow>> {
    // lower() on both sides for case-insensitive substring match; storage
    // stays case-sensitive.
    let mut stmt = conn.prepare(
        "SELECT id, username, public_key, created_at FROM users
         WHERE lower(username) LIKE '%' || lower(?1) || '%'",
    )?;

    let rows = stmt
        .query_map([query], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_message_by_id(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_id, to_id, iv, ciphertext, created_at FROM messages WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], message_from_row).optional()?;

    Ok(row)
}

fn query_history(conn: &Connection, user_id: i64, peer_id: i64) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, from_id, to_id, iv, ciphertext, created_at
         FROM messages
         WHERE (from_id = ?1 AND to_id = ?2) OR (from_id = ?2 AND to_id = ?1)
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![user_id, peer_id], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        public_key: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        from_id: row.get(1)?,
        to_id: row.get(2)?,
        iv: row.get(3)?,
        ciphertext: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[test]
    fn register_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        let first = db.register_user("alice", "PK1").unwrap();
        let second = db.register_user("alice", "PK1").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.public_key, "PK1");

        // Still a single row
        let found = db.search_users("alice").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn register_overwrites_changed_key() {
        let db = Database::open_in_memory().unwrap();

        let first = db.register_user("alice", "PK1").unwrap();
        let second = db.register_user("alice", "PK2").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.public_key, "PK2");

        let stored = db.get_user_by_id(first.id).unwrap().unwrap();
        assert_eq!(stored.public_key, "PK2");
    }

    #[test]
    fn lookup_missing_user_returns_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user_by_id(999).unwrap().is_none());
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn search_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.register_user("Alice", "PK1").unwrap();
        db.register_user("bob", "PK2").unwrap();

        let found = db.search_users("ali").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "Alice");

        let none = db.search_users("carol").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn search_matches_substring_anywhere() {
        let db = Database::open_in_memory().unwrap();
        db.register_user("alice", "PK1").unwrap();
        db.register_user("malice", "PK2").unwrap();

        let found = db.search_users("LICE").unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn insert_message_returns_assigned_fields() {
        let db = Database::open_in_memory().unwrap();

        let msg = db.insert_message(1, 2, "iv1", "ct1").unwrap();
        assert!(msg.id > 0);
        assert_eq!(msg.from_id, 1);
        assert_eq!(msg.to_id, 2);
        assert_eq!(msg.iv, "iv1");
        assert_eq!(msg.ciphertext, "ct1");
        assert!(!msg.created_at.is_empty());
    }

    #[test]
    fn history_is_symmetric_and_ordered() {
        let db = Database::open_in_memory().unwrap();

        db.insert_message(1, 2, "iv1", "ct1").unwrap();
        db.insert_message(2, 1, "iv2", "ct2").unwrap();
        db.insert_message(1, 2, "iv3", "ct3").unwrap();
        // Unrelated pair must not leak in
        db.insert_message(1, 3, "iv4", "ct4").unwrap();

        let forward = db.get_history(1, 2).unwrap();
        let reverse = db.get_history(2, 1).unwrap();

        assert_eq!(forward.len(), 3);
        assert_eq!(reverse.len(), 3);

        let ivs: Vec<&str> = forward.iter().map(|m| m.iv.as_str()).collect();
        assert_eq!(ivs, ["iv1", "iv2", "iv3"]);

        let reverse_ids: Vec<i64> = reverse.iter().map(|m| m.id).collect();
        let forward_ids: Vec<i64> = forward.iter().map(|m| m.id).collect();
        assert_eq!(forward_ids, reverse_ids);
    }

    #[test]
    fn history_of_strangers_is_empty() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(1, 2, "iv", "ct").unwrap();

        assert!(db.get_history(5, 6).unwrap().is_empty());
    }

    #[test]
    fn message_ids_are_opaque_references() {
        // No existence check on from_id/to_id: the relay trusts the caller.
        let db = Database::open_in_memory().unwrap();

        let msg = db.insert_message(404, 500, "iv", "ct").unwrap();
        assert_eq!(msg.from_id, 404);

        let history = db.get_history(404, 500).unwrap();
        assert_eq!(history.len(), 1);
    }
}
