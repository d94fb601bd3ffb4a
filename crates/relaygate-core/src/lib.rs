pub mod config;
pub mod error;
pub mod ids;

pub use error::{ErrorKind, RelaygateError, Result};
