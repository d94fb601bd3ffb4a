use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use relaygate_core::ids::{PrincipalId, PrincipalKind, PrincipalStatus};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{LedgerError, Result};
use crate::types::Principal;

const SELECT_COLS: &str = "id, kind, fingerprint, display_name, status, created_at";

fn row_to_principal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Principal> {
    let kind_str: String = row.get(1)?;
    let status_str: String = row.get(4)?;
    Ok(Principal {
        id: PrincipalId::from(row.get::<_, String>(0)?),
        kind: PrincipalKind::from_str(&kind_str).unwrap_or(PrincipalKind::Client),
        fingerprint: row.get(2)?,
        display_name: row.get(3)?,
        status: PrincipalStatus::from_str(&status_str).unwrap_or(PrincipalStatus::Pending),
        created_at: row.get(5)?,
    })
}

pub fn create(
    conn: &Mutex<Connection>,
    kind: PrincipalKind,
    fingerprint: Option<&str>,
    display_name: &str,
    status: PrincipalStatus,
) -> Result<Principal> {
    let id = PrincipalId::new();
    let created_at = Utc::now().to_rfc3339();
    let conn = conn.lock().unwrap();
    conn.execute(
        "INSERT INTO principals (id, kind, fingerprint, display_name, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.as_str(),
            kind.to_string(),
            fingerprint,
            display_name,
            status.to_string(),
            created_at,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref se, _)
            if se.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            LedgerError::AlreadyExists(format!("fingerprint already registered: {fingerprint:?}"))
        }
        other => LedgerError::Database(other),
    })?;

    Ok(Principal {
        id,
        kind,
        fingerprint: fingerprint.map(String::from),
        display_name: display_name.to_string(),
        status,
        created_at,
    })
}

pub fn get_by_id(conn: &Mutex<Connection>, id: &PrincipalId) -> Result<Principal> {
    let conn = conn.lock().unwrap();
    conn.query_row(
        &format!("SELECT {SELECT_COLS} FROM principals WHERE id = ?1"),
        params![id.as_str()],
        row_to_principal,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("principal {id}")))
}

pub fn get_by_fingerprint(conn: &Mutex<Connection>, fingerprint: &str) -> Result<Option<Principal>> {
    let conn = conn.lock().unwrap();
    let principal = conn
        .query_row(
            &format!("SELECT {SELECT_COLS} FROM principals WHERE fingerprint = ?1"),
            params![fingerprint],
            row_to_principal,
        )
        .optional()?;
    Ok(principal)
}

pub fn list(conn: &Mutex<Connection>) -> Result<Vec<Principal>> {
    let conn = conn.lock().unwrap();
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLS} FROM principals ORDER BY created_at"))?;
    let rows = stmt
        .query_map([], row_to_principal)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn set_status(conn: &Mutex<Connection>, id: &PrincipalId, status: PrincipalStatus) -> Result<()> {
    let conn = conn.lock().unwrap();
    let updated = conn.execute(
        "UPDATE principals SET status = ?1 WHERE id = ?2",
        params![status.to_string(), id.as_str()],
    )?;
    if updated == 0 {
        return Err(LedgerError::NotFound(format!("principal {id}")));
    }
    Ok(())
}

pub fn delete(conn: &Mutex<Connection>, id: &PrincipalId) -> Result<()> {
    let conn = conn.lock().unwrap();
    let deleted = conn.execute("DELETE FROM principals WHERE id = ?1", params![id.as_str()])?;
    if deleted == 0 {
        return Err(LedgerError::NotFound(format!("principal {id}")));
    }
    Ok(())
}
