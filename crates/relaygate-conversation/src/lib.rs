pub mod error;
pub mod service;

pub use error::ConversationError;
pub use service::{ConversationEvent, ConversationService, SendRequest};
