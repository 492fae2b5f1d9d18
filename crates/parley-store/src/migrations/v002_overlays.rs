//! v002 -- Per-message overlays.
//!
//! Reactions and "delete for me" markers get one row per (message, user)
//! pair instead of a serialized column on `messages`, so two writers
//! touching the same message never rewrite each other's state.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS reactions (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,  -- preserves reaction order
    message_id TEXT NOT NULL,                      -- FK -> messages(id)
    user_id    TEXT NOT NULL,                      -- FK -> users(id)
    emoji      TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reactions_message ON reactions(message_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_reactions_unique ON reactions(message_id, user_id, emoji);

CREATE TABLE IF NOT EXISTS message_hidden (
    message_id TEXT NOT NULL,                      -- FK -> messages(id)
    user_id    TEXT NOT NULL,                      -- FK -> users(id)
    hidden_at  TEXT NOT NULL,

    PRIMARY KEY (message_id, user_id),
    FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
