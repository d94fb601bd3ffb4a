use thiserror::Error;

/// The error taxonomy every crate's error enum maps into, so the gateway
/// can translate failures into wire error codes without re-deriving the
/// classification at the HTTP/WS boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    PermissionDenied,
    NotFound,
    InvalidArgument,
    AlreadyExists,
    Unavailable,
    DeadlineExceeded,
    Internal,
}

impl ErrorKind {
    /// Short code string sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum RelaygateError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelaygateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelaygateError::Config(_) => ErrorKind::Internal,
            RelaygateError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            RelaygateError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            RelaygateError::NotFound(_) => ErrorKind::NotFound,
            RelaygateError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RelaygateError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            RelaygateError::Unavailable(_) => ErrorKind::Unavailable,
            RelaygateError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            RelaygateError::Internal(_) => ErrorKind::Internal,
            RelaygateError::Database(_) => ErrorKind::Internal,
            RelaygateError::Serialization(_) => ErrorKind::InvalidArgument,
            RelaygateError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        RelaygateError::NotFound(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RelaygateError::InvalidArgument(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        RelaygateError::AlreadyExists(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        RelaygateError::PermissionDenied(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        RelaygateError::Unauthenticated(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        RelaygateError::Unavailable(msg.into())
    }

    pub fn deadline_exceeded(msg: impl Into<String>) -> Self {
        RelaygateError::DeadlineExceeded(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        RelaygateError::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RelaygateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_expected_code() {
        assert_eq!(RelaygateError::not_found("x").kind().code(), "not_found");
        assert_eq!(
            RelaygateError::permission_denied("x").kind().code(),
            "permission_denied"
        );
    }
}
