pub mod registry;

pub use registry::{AgentConnection, AgentRegistry, DispatchRequest, OutboundFrame, RegistryError};
