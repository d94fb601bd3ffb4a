use std::str::FromStr;
use std::sync::Mutex;

use relaygate_core::ids::{PrincipalKind, RoleName};
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::types::Role;

/// Idempotent add — `INSERT OR IGNORE` matches the many-to-many, idempotent
/// semantics of §3 "Role".
pub fn add(conn: &Mutex<Connection>, subject_kind: PrincipalKind, subject_id: &str, role_name: RoleName) -> Result<()> {
    let conn = conn.lock().unwrap();
    conn.execute(
        "INSERT OR IGNORE INTO roles (subject_kind, subject_id, role_name) VALUES (?1, ?2, ?3)",
        params![subject_kind.to_string(), subject_id, role_name.to_string()],
    )?;
    Ok(())
}

pub fn remove(conn: &Mutex<Connection>, subject_kind: PrincipalKind, subject_id: &str, role_name: RoleName) -> Result<()> {
    let conn = conn.lock().unwrap();
    conn.execute(
        "DELETE FROM roles WHERE subject_kind = ?1 AND subject_id = ?2 AND role_name = ?3",
        params![subject_kind.to_string(), subject_id, role_name.to_string()],
    )?;
    Ok(())
}

pub fn list(conn: &Mutex<Connection>, subject_kind: PrincipalKind, subject_id: &str) -> Result<Vec<Role>> {
    let conn = conn.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT subject_kind, subject_id, role_name FROM roles WHERE subject_kind = ?1 AND subject_id = ?2",
    )?;
    let rows = stmt
        .query_map(params![subject_kind.to_string(), subject_id], |row| {
            let kind_str: String = row.get(0)?;
            let role_str: String = row.get(2)?;
            Ok(Role {
                subject_kind: PrincipalKind::from_str(&kind_str).unwrap_or(PrincipalKind::Client),
                subject_id: row.get(1)?,
                role_name: RoleName::from_str(&role_str).unwrap_or(RoleName::Member),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn has(conn: &Mutex<Connection>, subject_kind: PrincipalKind, subject_id: &str, role_name: RoleName) -> Result<bool> {
    let conn = conn.lock().unwrap();
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM roles WHERE subject_kind = ?1 AND subject_id = ?2 AND role_name = ?3",
        params![subject_kind.to_string(), subject_id, role_name.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
