use std::sync::Mutex;

use chrono::Utc;
use relaygate_core::ids::PrincipalId;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::types::AuditEntry;

pub fn append(conn: &Mutex<Connection>, actor_principal_id: &PrincipalId, action: &str, details: &str) -> Result<AuditEntry> {
    let conn = conn.lock().unwrap();
    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO audit_entries (id, actor_principal_id, action, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, actor_principal_id.as_str(), action, details, created_at],
    )?;
    Ok(AuditEntry {
        id,
        actor_principal_id: actor_principal_id.clone(),
        action: action.to_string(),
        details: details.to_string(),
        created_at,
    })
}

pub fn list(conn: &Mutex<Connection>, limit: i64) -> Result<Vec<AuditEntry>> {
    let conn = conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT id, actor_principal_id, action, details, created_at
         FROM audit_entries ORDER BY created_at DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                actor_principal_id: PrincipalId::from(row.get::<_, String>(1)?),
                action: row.get(2)?,
                details: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
