//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `users` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id               TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    phone            TEXT NOT NULL UNIQUE,
    name             TEXT NOT NULL,
    avatar_url       TEXT,
    language         TEXT NOT NULL DEFAULT 'en',
    theme            TEXT NOT NULL DEFAULT 'light',
    blocked_numbers  TEXT NOT NULL DEFAULT '[]',  -- JSON array of phones
    privacy_settings TEXT NOT NULL DEFAULT '{"publications":"everyone"}',
    created_at       TEXT NOT NULL                -- RFC-3339, microseconds, UTC
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id                   TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    sender_id            TEXT NOT NULL,              -- FK -> users(id)
    receiver_id          TEXT NOT NULL,              -- FK -> users(id)
    content              TEXT NOT NULL,
    kind                 TEXT NOT NULL DEFAULT 'text',
    file_url             TEXT,
    file_name            TEXT,
    deleted_for_everyone INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    created_at           TEXT NOT NULL,              -- RFC-3339, microseconds, UTC

    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
