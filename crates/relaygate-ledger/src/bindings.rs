use std::sync::Mutex;

use chrono::Utc;
use relaygate_core::ids::{BindingId, PrincipalId};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{LedgerError, Result};
use crate::types::Binding;

const SELECT_COLS: &str =
    "id, frontend, channel_id, agent_principal_id, agent_working_dir, created_at, creator_principal_id";

fn row_to_binding(row: &rusqlite::Row<'_>) -> rusqlite::Result<Binding> {
    Ok(Binding {
        id: BindingId::from(row.get::<_, String>(0)?),
        frontend: row.get(1)?,
        channel_id: row.get(2)?,
        agent_principal_id: PrincipalId::from(row.get::<_, String>(3)?),
        agent_working_dir: row.get(4)?,
        created_at: row.get(5)?,
        creator_principal_id: PrincipalId::from(row.get::<_, String>(6)?),
    })
}

/// Create or replace the binding for (frontend, channel_id), per §4.6.
pub fn upsert(
    conn: &Mutex<Connection>,
    frontend: &str,
    channel_id: &str,
    agent_principal_id: &PrincipalId,
    agent_working_dir: Option<&str>,
    creator_principal_id: &PrincipalId,
) -> Result<Binding> {
    let conn = conn.lock().unwrap();
    let id = BindingId::new();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO bindings
            (id, frontend, channel_id, agent_principal_id, agent_working_dir, created_at, creator_principal_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(frontend, channel_id) DO UPDATE SET
            agent_principal_id = excluded.agent_principal_id,
            agent_working_dir = excluded.agent_working_dir,
            created_at = excluded.created_at,
            creator_principal_id = excluded.creator_principal_id",
        params![
            id.as_str(),
            frontend,
            channel_id,
            agent_principal_id.as_str(),
            agent_working_dir,
            now,
            creator_principal_id.as_str(),
        ],
    )?;

    conn.query_row(
        &format!("SELECT {SELECT_COLS} FROM bindings WHERE frontend = ?1 AND channel_id = ?2"),
        params![frontend, channel_id],
        row_to_binding,
    )
    .map_err(Into::into)
}

pub fn get_by_channel(conn: &Mutex<Connection>, frontend: &str, channel_id: &str) -> Result<Option<Binding>> {
    let conn = conn.lock().unwrap();
    let binding = conn
        .query_row(
            &format!("SELECT {SELECT_COLS} FROM bindings WHERE frontend = ?1 AND channel_id = ?2"),
            params![frontend, channel_id],
            row_to_binding,
        )
        .optional()?;
    Ok(binding)
}

pub fn list(conn: &Mutex<Connection>) -> Result<Vec<Binding>> {
    let conn = conn.lock().unwrap();
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLS} FROM bindings ORDER BY created_at"))?;
    let rows = stmt
        .query_map([], row_to_binding)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn delete(conn: &Mutex<Connection>, frontend: &str, channel_id: &str) -> Result<()> {
    let conn = conn.lock().unwrap();
    let deleted = conn.execute(
        "DELETE FROM bindings WHERE frontend = ?1 AND channel_id = ?2",
        params![frontend, channel_id],
    )?;
    if deleted == 0 {
        return Err(LedgerError::NotFound(format!("binding {frontend}/{channel_id}")));
    }
    Ok(())
}
