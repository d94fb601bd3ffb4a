use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::types::TokenUsage;

/// Save a token-usage record, keyed by an agent-reported request id. See
/// §3 "Token-Usage Record".
pub fn save(conn: &Mutex<Connection>, request_id: &str, input_tokens: i64, output_tokens: i64) -> Result<TokenUsage> {
    let conn = conn.lock().unwrap();
    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO token_usage (id, request_id, input_tokens, output_tokens, message_event_id, created_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
        params![id, request_id, input_tokens, output_tokens, created_at],
    )?;
    Ok(TokenUsage {
        id,
        request_id: request_id.to_string(),
        input_tokens,
        output_tokens,
        message_event_id: None,
        created_at,
    })
}

/// Link a previously saved usage record to its request's final message
/// event, once the `done` event produces that event id (§4.5).
pub fn link_to_message(conn: &Mutex<Connection>, request_id: &str, message_event_id: &str) -> Result<()> {
    let conn = conn.lock().unwrap();
    conn.execute(
        "UPDATE token_usage SET message_event_id = ?1 WHERE request_id = ?2",
        params![message_event_id, request_id],
    )?;
    Ok(())
}
