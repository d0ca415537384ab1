use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            public_key  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY,
            from_id     INTEGER NOT NULL,
            to_id       INTEGER NOT NULL,
            iv          TEXT NOT NULL,
            ciphertext  TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_from
            ON messages(from_id);

        CREATE INDEX IF NOT EXISTS idx_messages_to
            ON messages(to_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
