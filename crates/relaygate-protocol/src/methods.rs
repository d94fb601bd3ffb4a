// Well-known client RPC method names, per §6 "Client RPCs".

// conversation
pub const CONVERSATION_SEND: &str = "conversation.send";
pub const CONVERSATION_STREAM: &str = "conversation.stream_events";

// identity
pub const ME_GET: &str = "me.get";

// admin: principals
pub const ADMIN_PRINCIPALS_LIST: &str = "admin.principals.list";
pub const ADMIN_PRINCIPALS_CREATE: &str = "admin.principals.create";
pub const ADMIN_PRINCIPALS_DELETE: &str = "admin.principals.delete";
pub const ADMIN_ROLES_ADD: &str = "admin.roles.add";
pub const ADMIN_ROLES_REMOVE: &str = "admin.roles.remove";

// admin: bindings
pub const ADMIN_BINDINGS_LIST: &str = "admin.bindings.list";
pub const ADMIN_BINDINGS_CREATE: &str = "admin.bindings.create";
pub const ADMIN_BINDINGS_DELETE: &str = "admin.bindings.delete";

// admin: tokens
pub const ADMIN_TOKENS_CREATE: &str = "admin.tokens.create";
pub const ADMIN_TOKENS_REVOKE: &str = "admin.tokens.revoke";

// admin: audit
pub const ADMIN_AUDIT_LIST: &str = "admin.audit.list";

// handshake
pub const CONNECT: &str = "connect";
