use std::sync::Mutex;

use chrono::Utc;
use relaygate_core::ids::{PrincipalId, ThreadId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{LedgerError, Result};
use crate::types::Thread;

const SELECT_COLS: &str = "id, frontend, external_id, agent_id, created_at, updated_at";

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: ThreadId::from(row.get::<_, String>(0)?),
        frontend: row.get(1)?,
        external_id: row.get(2)?,
        agent_id: PrincipalId::from(row.get::<_, String>(3)?),
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Inserts a new thread with a specific (or fresh) id. Fails with
/// `LedgerError::AlreadyExists` on a (frontend, external_id) conflict — per
/// §4.1's "`CreateThread` fails with a distinct duplicate error when
/// (frontend, external_id) conflicts." Callers re-read under the unique key
/// themselves; this function does no retry of its own.
pub fn create(
    conn: &Mutex<Connection>,
    id: Option<&ThreadId>,
    frontend: &str,
    external_id: &str,
    agent_id: &PrincipalId,
) -> Result<Thread> {
    let conn = conn.lock().unwrap();

    let new_id = id.cloned().unwrap_or_else(ThreadId::new);
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO threads (id, frontend, external_id, agent_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![new_id.as_str(), frontend, external_id, agent_id.as_str(), now],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref se, _)
            if se.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            LedgerError::AlreadyExists(format!("thread ({frontend}, {external_id}) or id {new_id}"))
        }
        other => LedgerError::Database(other),
    })?;

    Ok(Thread {
        id: new_id,
        frontend: frontend.to_string(),
        external_id: external_id.to_string(),
        agent_id: agent_id.clone(),
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn get_by_id(conn: &Mutex<Connection>, id: &ThreadId) -> Result<Thread> {
    let conn = conn.lock().unwrap();
    conn.query_row(
        &format!("SELECT {SELECT_COLS} FROM threads WHERE id = ?1"),
        params![id.as_str()],
        row_to_thread,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("thread {id}")))
}

pub fn get_by_frontend_external(
    conn: &Mutex<Connection>,
    frontend: &str,
    external_id: &str,
) -> Result<Option<Thread>> {
    let conn = conn.lock().unwrap();
    conn.query_row(
        &format!("SELECT {SELECT_COLS} FROM threads WHERE frontend = ?1 AND external_id = ?2"),
        params![frontend, external_id],
        row_to_thread,
    )
    .optional()
    .map_err(Into::into)
}
