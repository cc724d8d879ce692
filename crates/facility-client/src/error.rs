//! Client error types.

use std::time::Duration;

use facility_protocol::WireError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A datagram could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The server answered with an error status.
    #[error("server error: {message}")]
    Protocol { message: String },

    /// No datagram arrived within any attempt.
    #[error("no response after {attempts} attempts ({timeout:?} each)")]
    Timeout { attempts: u32, timeout: Duration },

    /// Monitor registration was refused or never answered.
    #[error("monitor registration failed: {0}")]
    Registration(#[source] Box<ClientError>),

    /// Socket error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration or usage error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A worker task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if the server rejected the request.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_attempts() {
        let err = ClientError::Timeout {
            attempts: 3,
            timeout: Duration::from_secs(3),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "no response after 3 attempts (3s each)");
    }

    #[test]
    fn registration_wraps_cause() {
        let err = ClientError::Registration(Box::new(ClientError::Protocol {
            message: "Facility not found".into(),
        }));
        assert_eq!(
            err.to_string(),
            "monitor registration failed: server error: Facility not found"
        );
        assert!(!err.is_protocol());
    }
}
