use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    /// Serialized public key (e.g. JWK JSON). Opaque to the server.
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub public_key: String,
}

// -- Messages --

/// The server never inspects `iv` or `ciphertext`; clients own the full
/// cryptographic lifecycle and the relay stores both verbatim.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub from_id: i64,
    pub to_id: i64,
    pub iv: String,
    pub ciphertext: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub iv: String,
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
}
