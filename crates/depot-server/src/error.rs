//! Service-level error taxonomy, mapped onto the wire [`ErrorKind`]s.

use depot_gate::GateError;
use depot_proto::{ErrorKind, Reply};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed client input: empty filename, protocol-sequence violation.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("file {0} not found")]
    NotFound(String),

    /// An admission gate is saturated; retriable at the caller's discretion.
    #[error("{0}")]
    ResourceExhausted(String),

    /// Local I/O failure. Never retried by the service.
    #[error("{0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Internal(format!("{}: {}", context, err))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Terminal error frame for the peer.
    pub fn into_reply(self) -> Reply {
        Reply::Error {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<GateError> for ServiceError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Exhausted(_) => Self::ResourceExhausted(err.to_string()),
            GateError::Cancelled(_) => Self::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_errors_map_to_distinct_kinds() {
        let exhausted: ServiceError = GateError::Exhausted("upload/download").into();
        assert_eq!(exhausted.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(exhausted.to_string(), "upload/download limit exceeded");

        let cancelled: ServiceError = GateError::Cancelled("list").into();
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn reply_carries_kind_and_message() {
        let reply = ServiceError::NotFound("ghost.bin".to_string()).into_reply();
        match reply {
            Reply::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::NotFound);
                assert_eq!(message, "file ghost.bin not found");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
