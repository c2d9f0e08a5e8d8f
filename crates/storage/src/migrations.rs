//! Idempotent schema migrations, run once inside one transaction at
//! `Storage::open` (§3.1).

use rusqlite::Connection;

use conductor_domain::error::{Error, Result};

pub fn run(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction().map_err(storage_err)?;

    tx.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            status          TEXT NOT NULL,
            options         TEXT NOT NULL,
            message_count   INTEGER NOT NULL DEFAULT 0,
            cost_usd        REAL NOT NULL DEFAULT 0,
            error_message   TEXT,
            git_branch      TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC);

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT NOT NULL,
            sequence        INTEGER NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            metadata        TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            UNIQUE(session_id, sequence)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, sequence ASC);

        CREATE TABLE IF NOT EXISTS shell_commands (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id     TEXT NOT NULL,
            session_name        TEXT,
            working_directory   TEXT,
            git_branch          TEXT,
            model_provider      TEXT,
            model_name          TEXT,
            executed_at         TEXT NOT NULL,
            command             TEXT NOT NULL,
            output              TEXT,
            success             INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_shell_commands_conv ON shell_commands(conversation_id, executed_at DESC);

        CREATE TABLE IF NOT EXISTS claude_commands (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id     TEXT NOT NULL,
            session_name        TEXT,
            working_directory   TEXT,
            git_branch          TEXT,
            model_provider      TEXT,
            model_name          TEXT,
            executed_at         TEXT NOT NULL,
            tool_name           TEXT NOT NULL,
            input               TEXT NOT NULL,
            output              TEXT,
            success             INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_claude_commands_conv ON claude_commands(conversation_id, executed_at DESC);

        CREATE TABLE IF NOT EXISTS user_messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id     TEXT NOT NULL,
            session_name        TEXT,
            working_directory   TEXT,
            git_branch          TEXT,
            model_provider      TEXT,
            model_name          TEXT,
            executed_at         TEXT NOT NULL,
            content             TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_user_messages_conv ON user_messages(conversation_id, executed_at DESC);

        CREATE TABLE IF NOT EXISTS notifications (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id     TEXT NOT NULL,
            session_name        TEXT,
            working_directory   TEXT,
            git_branch          TEXT,
            model_provider      TEXT,
            model_name          TEXT,
            executed_at         TEXT NOT NULL,
            title               TEXT NOT NULL,
            body                TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notifications_conv ON notifications(conversation_id, executed_at DESC);
        ",
    )
    .map_err(storage_err)?;

    tx.commit().map_err(storage_err)?;
    Ok(())
}

pub(crate) fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}
