pub mod agent;
pub mod auth;
pub mod frames;
pub mod methods;
pub mod pack;

pub use agent::{
    Heartbeat, MessageResponse, RawReplyEvent, Register, SendMessage, Shutdown, TranslatedEvent,
    TranslatedKind, Welcome,
};
pub use auth::{AuthMetadata, BearerAuth, Claims, SshAuth};
pub use frames::{ErrorShape, EventFrame, InboundFrame, ReqFrame, ResFrame};
pub use pack::{ExecuteTool, Manifest, ToolDef, ToolResult};
