use rusqlite::{Connection, Result};

/// Initialise all tables the ledger touches. Safe to call on every
/// startup — CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    create_principals_table(conn)?;
    create_roles_table(conn)?;
    create_threads_table(conn)?;
    create_bindings_table(conn)?;
    create_events_table(conn)?;
    create_token_usage_table(conn)?;
    create_audit_table(conn)?;
    Ok(())
}

fn create_principals_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS principals (
            id           TEXT PRIMARY KEY NOT NULL,
            kind         TEXT NOT NULL,
            fingerprint  TEXT UNIQUE,
            display_name TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'pending',
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_principals_fingerprint
            ON principals (fingerprint);",
    )
}

fn create_roles_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS roles (
            subject_kind TEXT NOT NULL,
            subject_id   TEXT NOT NULL,
            role_name    TEXT NOT NULL,
            PRIMARY KEY (subject_kind, subject_id, role_name)
        );",
    )
}

fn create_threads_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS threads (
            id          TEXT PRIMARY KEY NOT NULL,
            frontend    TEXT NOT NULL,
            external_id TEXT NOT NULL,
            agent_id    TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE(frontend, external_id)
        );",
    )
}

fn create_bindings_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bindings (
            id                    TEXT PRIMARY KEY NOT NULL,
            frontend              TEXT NOT NULL,
            channel_id            TEXT NOT NULL,
            agent_principal_id    TEXT NOT NULL,
            agent_working_dir     TEXT,
            created_at            TEXT NOT NULL,
            creator_principal_id  TEXT NOT NULL,
            UNIQUE(frontend, channel_id)
        );",
    )
}

fn create_events_table(conn: &Connection) -> Result<()> {
    // idx_events_conversation drives the conversation-key paged read;
    // idx_events_thread drives the by-thread paged read.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS ledger_events (
            id                TEXT PRIMARY KEY NOT NULL,
            conversation_key  TEXT NOT NULL,
            thread_id         TEXT,
            direction         TEXT NOT NULL,
            author            TEXT NOT NULL,
            timestamp         TEXT NOT NULL,
            event_type        TEXT NOT NULL,
            text              TEXT,
            raw_ref           TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_events_conversation
            ON ledger_events (conversation_key, timestamp, id);
        CREATE INDEX IF NOT EXISTS idx_events_thread
            ON ledger_events (thread_id, timestamp, id);",
    )
}

fn create_token_usage_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS token_usage (
            id                TEXT PRIMARY KEY NOT NULL,
            request_id        TEXT NOT NULL UNIQUE,
            input_tokens      INTEGER NOT NULL,
            output_tokens     INTEGER NOT NULL,
            message_event_id  TEXT,
            created_at        TEXT NOT NULL
        );",
    )
}

fn create_audit_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_entries (
            id                  TEXT PRIMARY KEY NOT NULL,
            actor_principal_id  TEXT NOT NULL,
            action              TEXT NOT NULL,
            details             TEXT NOT NULL DEFAULT '{}',
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_created
            ON audit_entries (created_at);",
    )
}
