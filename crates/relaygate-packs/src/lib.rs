pub mod builtin;
pub mod registry;
pub mod router;

pub use builtin::BuiltinPack;
pub use registry::{PackConnection, PackRegistry, RegistryError};
pub use router::{ToolCallError, ToolRouter};
