use relaygate_core::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            AuthError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            AuthError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<relaygate_ledger::LedgerError> for AuthError {
    fn from(err: relaygate_ledger::LedgerError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
