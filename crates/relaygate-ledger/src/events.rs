use std::str::FromStr;
use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use relaygate_core::ids::ThreadId;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{clamp_limit, EventDirection, EventType, LedgerEvent, NewEvent, Page};

const SELECT_COLS: &str =
    "id, conversation_key, thread_id, direction, author, timestamp, event_type, text, raw_ref";

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEvent> {
    let direction_str: String = row.get(3)?;
    let type_str: String = row.get(6)?;
    Ok(LedgerEvent {
        id: row.get(0)?,
        conversation_key: row.get(1)?,
        thread_id: row.get::<_, Option<String>>(2)?.map(ThreadId::from),
        direction: EventDirection::from_str(&direction_str).unwrap_or(EventDirection::InboundToAgent),
        author: row.get(4)?,
        timestamp: row.get(5)?,
        event_type: EventType::from_str(&type_str).unwrap_or(EventType::System),
        text: row.get(7)?,
        raw_ref: row.get(8)?,
    })
}

/// Append an event to the ledger. Timestamps are monotone per conversation
/// at write time (§3 "Ledger Event"); callers hold the single connection
/// lock for the duration, so ties are broken by `id` order alone.
pub fn append(conn: &Mutex<Connection>, event: NewEvent) -> Result<LedgerEvent> {
    let conn = conn.lock().unwrap();
    let id = Uuid::new_v4().to_string();
    let timestamp = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO ledger_events
            (id, conversation_key, thread_id, direction, author, timestamp, event_type, text, raw_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            event.conversation_key,
            event.thread_id.as_ref().map(|t| t.as_str()),
            event.direction.to_string(),
            event.author,
            timestamp,
            event.event_type.to_string(),
            event.text,
            event.raw_ref,
        ],
    )?;

    Ok(LedgerEvent {
        id,
        conversation_key: event.conversation_key,
        thread_id: event.thread_id,
        direction: event.direction,
        author: event.author,
        timestamp,
        event_type: event.event_type,
        text: event.text,
        raw_ref: event.raw_ref,
    })
}

/// Decode an opaque `(timestamp, id)` cursor. A malformed cursor falls back
/// to the zero time so pagination degrades to "start from the beginning"
/// rather than erroring the read.
fn decode_cursor(cursor: &str) -> (String, String) {
    let decoded = BASE64
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    match decoded.and_then(|s| s.split_once('|').map(|(ts, id)| (ts.to_string(), id.to_string()))) {
        Some(pair) => pair,
        None => ("0000-00-00T00:00:00Z".to_string(), String::new()),
    }
}

fn encode_cursor(timestamp: &str, id: &str) -> String {
    BASE64.encode(format!("{timestamp}|{id}"))
}

fn paginate(
    conn: &Mutex<Connection>,
    where_clause: &str,
    key: &str,
    cursor: Option<&str>,
    limit: Option<i64>,
) -> Result<Page<LedgerEvent>> {
    let limit = clamp_limit(limit);
    let (after_ts, after_id) = cursor.map(decode_cursor).unwrap_or_default();

    let conn = conn.lock().unwrap();
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLS} FROM ledger_events
         WHERE {where_clause} = ?1 AND (timestamp, id) > (?2, ?3)
         ORDER BY timestamp, id
         LIMIT ?4"
    ))?;
    let mut items = stmt
        .query_map(params![key, after_ts, after_id, limit + 1], row_to_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let has_more = items.len() as i64 > limit;
    if has_more {
        items.truncate(limit as usize);
    }
    let next_cursor = items
        .last()
        .map(|e| encode_cursor(&e.timestamp, &e.id))
        .filter(|_| has_more);

    Ok(Page {
        items,
        has_more,
        next_cursor,
    })
}

pub fn list_by_conversation(
    conn: &Mutex<Connection>,
    conversation_key: &str,
    cursor: Option<&str>,
    limit: Option<i64>,
) -> Result<Page<LedgerEvent>> {
    paginate(conn, "conversation_key", conversation_key, cursor, limit)
}

pub fn list_by_thread(
    conn: &Mutex<Connection>,
    thread_id: &ThreadId,
    cursor: Option<&str>,
    limit: Option<i64>,
) -> Result<Page<LedgerEvent>> {
    paginate(conn, "thread_id", thread_id.as_str(), cursor, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_cursor_falls_back_to_zero_time() {
        let (ts, id) = decode_cursor("not-base64-!!!");
        assert_eq!(ts, "0000-00-00T00:00:00Z");
        assert_eq!(id, "");
    }

    #[test]
    fn cursor_round_trips() {
        let encoded = encode_cursor("2024-01-01T00:00:00Z", "abc");
        let (ts, id) = decode_cursor(&encoded);
        assert_eq!(ts, "2024-01-01T00:00:00Z");
        assert_eq!(id, "abc");
    }
}
