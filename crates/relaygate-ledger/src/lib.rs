pub mod audit;
pub mod bindings;
pub mod error;
pub mod events;
pub mod principals;
pub mod roles;
pub mod schema;
pub mod store;
pub mod threads;
pub mod types;
pub mod usage;

pub use error::LedgerError;
pub use store::Store;
pub use types::{
    AuditEntry, Binding, EventDirection, EventType, LedgerEvent, NewEvent, Page, Principal, Role,
    Thread, TokenUsage,
};
