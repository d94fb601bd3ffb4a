use std::sync::Mutex;

use relaygate_core::ids::{BindingId, PrincipalId, PrincipalKind, PrincipalStatus, RoleName, ThreadId};
use rusqlite::Connection;

use crate::error::Result;
use crate::types::{AuditEntry, Binding, LedgerEvent, NewEvent, Page, Principal, Role, Thread, TokenUsage};
use crate::{audit, bindings, events, principals, roles, schema, threads, usage};

/// Single SQL-backed store exposing every ledger operation. Wraps one
/// connection behind a mutex, the same discipline each per-subsystem
/// manager uses.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // -- principals --

    pub fn create_principal(
        &self,
        kind: PrincipalKind,
        fingerprint: Option<&str>,
        display_name: &str,
        status: PrincipalStatus,
    ) -> Result<Principal> {
        principals::create(&self.conn, kind, fingerprint, display_name, status)
    }

    pub fn get_principal(&self, id: &PrincipalId) -> Result<Principal> {
        principals::get_by_id(&self.conn, id)
    }

    pub fn get_principal_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Principal>> {
        principals::get_by_fingerprint(&self.conn, fingerprint)
    }

    pub fn list_principals(&self) -> Result<Vec<Principal>> {
        principals::list(&self.conn)
    }

    pub fn set_principal_status(&self, id: &PrincipalId, status: PrincipalStatus) -> Result<()> {
        principals::set_status(&self.conn, id, status)
    }

    pub fn delete_principal(&self, id: &PrincipalId) -> Result<()> {
        principals::delete(&self.conn, id)
    }

    // -- roles --

    pub fn add_role(&self, subject_kind: PrincipalKind, subject_id: &str, role_name: RoleName) -> Result<()> {
        roles::add(&self.conn, subject_kind, subject_id, role_name)
    }

    pub fn remove_role(&self, subject_kind: PrincipalKind, subject_id: &str, role_name: RoleName) -> Result<()> {
        roles::remove(&self.conn, subject_kind, subject_id, role_name)
    }

    pub fn list_roles(&self, subject_kind: PrincipalKind, subject_id: &str) -> Result<Vec<Role>> {
        roles::list(&self.conn, subject_kind, subject_id)
    }

    pub fn has_role(&self, subject_kind: PrincipalKind, subject_id: &str, role_name: RoleName) -> Result<bool> {
        roles::has(&self.conn, subject_kind, subject_id, role_name)
    }

    // -- threads --

    /// Inserts a new thread; surfaces `LedgerError::AlreadyExists` on a
    /// (frontend, external_id) conflict instead of retrying internally —
    /// callers re-read under the unique key themselves (§4.1, §4.5).
    pub fn create_thread(
        &self,
        id: Option<&ThreadId>,
        frontend: &str,
        external_id: &str,
        agent_id: &PrincipalId,
    ) -> Result<Thread> {
        threads::create(&self.conn, id, frontend, external_id, agent_id)
    }

    pub fn get_thread(&self, id: &ThreadId) -> Result<Thread> {
        threads::get_by_id(&self.conn, id)
    }

    pub fn get_thread_by_external(&self, frontend: &str, external_id: &str) -> Result<Option<Thread>> {
        threads::get_by_frontend_external(&self.conn, frontend, external_id)
    }

    // -- bindings --

    pub fn upsert_binding(
        &self,
        frontend: &str,
        channel_id: &str,
        agent_principal_id: &PrincipalId,
        agent_working_dir: Option<&str>,
        creator_principal_id: &PrincipalId,
    ) -> Result<Binding> {
        bindings::upsert(
            &self.conn,
            frontend,
            channel_id,
            agent_principal_id,
            agent_working_dir,
            creator_principal_id,
        )
    }

    pub fn get_binding(&self, frontend: &str, channel_id: &str) -> Result<Option<Binding>> {
        bindings::get_by_channel(&self.conn, frontend, channel_id)
    }

    pub fn list_bindings(&self) -> Result<Vec<Binding>> {
        bindings::list(&self.conn)
    }

    pub fn delete_binding(&self, frontend: &str, channel_id: &str) -> Result<()> {
        bindings::delete(&self.conn, frontend, channel_id)
    }

    pub fn delete_binding_by_id(&self, id: &BindingId) -> Result<()> {
        for binding in bindings::list(&self.conn)? {
            if &binding.id == id {
                return bindings::delete(&self.conn, &binding.frontend, &binding.channel_id);
            }
        }
        Err(crate::error::LedgerError::NotFound(format!("binding {id}")))
    }

    // -- events --

    pub fn append_event(&self, event: NewEvent) -> Result<LedgerEvent> {
        events::append(&self.conn, event)
    }

    pub fn list_events_by_conversation(
        &self,
        conversation_key: &str,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<LedgerEvent>> {
        events::list_by_conversation(&self.conn, conversation_key, cursor, limit)
    }

    pub fn list_events_by_thread(
        &self,
        thread_id: &ThreadId,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Page<LedgerEvent>> {
        events::list_by_thread(&self.conn, thread_id, cursor, limit)
    }

    // -- token usage --

    pub fn save_usage(&self, request_id: &str, input_tokens: i64, output_tokens: i64) -> Result<TokenUsage> {
        usage::save(&self.conn, request_id, input_tokens, output_tokens)
    }

    pub fn link_usage_to_message(&self, request_id: &str, message_event_id: &str) -> Result<()> {
        usage::link_to_message(&self.conn, request_id, message_event_id)
    }

    // -- audit --

    pub fn append_audit(&self, actor_principal_id: &PrincipalId, action: &str, details: &str) -> Result<AuditEntry> {
        audit::append(&self.conn, actor_principal_id, action, details)
    }

    pub fn list_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        audit::list(&self.conn, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventDirection, EventType};

    #[test]
    fn duplicate_fingerprint_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        store
            .create_principal(PrincipalKind::Agent, Some("fp1"), "agent-a", PrincipalStatus::Pending)
            .unwrap();
        let result = store.create_principal(PrincipalKind::Agent, Some("fp1"), "agent-b", PrincipalStatus::Pending);
        assert!(result.is_err());
    }

    #[test]
    fn create_thread_surfaces_distinct_duplicate_error() {
        let store = Store::open_in_memory().unwrap();
        let agent = PrincipalId::new();
        let t1 = store.create_thread(None, "slack", "chan-1", &agent).unwrap();

        let result = store.create_thread(None, "slack", "chan-1", &agent);
        assert!(matches!(result, Err(crate::error::LedgerError::AlreadyExists(_))));

        // Caller-side recovery: re-read under the unique key.
        let reread = store.get_thread_by_external("slack", "chan-1").unwrap().unwrap();
        assert_eq!(reread.id, t1.id);
    }

    #[test]
    fn get_thread_by_external_returns_none_when_absent() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_thread_by_external("slack", "nope").unwrap().is_none());
    }

    #[test]
    fn binding_upsert_replaces_existing() {
        let store = Store::open_in_memory().unwrap();
        let agent1 = PrincipalId::new();
        let agent2 = PrincipalId::new();
        let creator = PrincipalId::new();
        store.upsert_binding("slack", "chan-1", &agent1, None, &creator).unwrap();
        let replaced = store.upsert_binding("slack", "chan-1", &agent2, None, &creator).unwrap();
        assert_eq!(replaced.agent_principal_id, agent2);
        assert_eq!(store.list_bindings().unwrap().len(), 1);
    }

    #[test]
    fn event_pagination_respects_limit_and_cursor() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .append_event(NewEvent {
                    conversation_key: "agent-1".into(),
                    thread_id: None,
                    direction: EventDirection::InboundToAgent,
                    author: "alice".into(),
                    event_type: EventType::Message,
                    text: Some(format!("msg {i}")),
                    raw_ref: None,
                })
                .unwrap();
        }

        let page1 = store.list_events_by_conversation("agent-1", None, Some(2)).unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.has_more);

        let page2 = store
            .list_events_by_conversation("agent-1", page1.next_cursor.as_deref(), Some(2))
            .unwrap();
        assert_eq!(page2.items.len(), 2);
        assert_ne!(page1.items[0].id, page2.items[0].id);
    }
}
