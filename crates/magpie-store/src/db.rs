use rusqlite::{Connection, Result};

/// Initialise the transcript schema. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS turns (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL,
            author_id       TEXT NOT NULL,
            role            TEXT NOT NULL,
            message_type    TEXT NOT NULL,
            content         TEXT NOT NULL,
            tool_call_id    TEXT,
            tool_name       TEXT,
            expires_at      TEXT,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_turns_conv
            ON turns(conversation_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_turns_age
            ON turns(created_at);",
    )
}
