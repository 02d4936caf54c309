//! Error types for clrbridge-client.

use thiserror::Error;

/// Main error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Could not establish a connection within the configured retry bound.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stream corruption: wrong magic, unknown tag, malformed payload.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Short read or short write at the buffered I/O layer.
    #[error("Stream terminated: {0}")]
    StreamTerminated(String),

    /// Value outside the encodable set, or an unsupported array kind.
    #[error("Marshal error: {0}")]
    Marshal(String),

    /// Exception raised by the remote side; the connection stays healthy.
    #[error("Remote exception: {0}")]
    Remote(String),

    /// A well-formed response of a kind the verb cannot use.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// API misuse detected before anything was sent.
    #[error("Usage error: {0}")]
    Usage(String),

    /// Invalid configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Whether this error leaves the connection in an unknown state.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            BridgeError::Connection(_)
                | BridgeError::Framing(_)
                | BridgeError::StreamTerminated(_)
                | BridgeError::Io(_)
        )
    }
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_cause() {
        let err = BridgeError::Remote("boom".into());
        assert_eq!(err.to_string(), "Remote exception: boom");

        let err = BridgeError::Framing("unknown message type: 200".into());
        assert!(err.to_string().contains("unknown message type: 200"));
    }

    #[test]
    fn test_connection_fault_classification() {
        assert!(BridgeError::Framing("x".into()).is_connection_fault());
        assert!(BridgeError::StreamTerminated("x".into()).is_connection_fault());
        assert!(BridgeError::Io(std::io::Error::other("x")).is_connection_fault());

        assert!(!BridgeError::Remote("x".into()).is_connection_fault());
        assert!(!BridgeError::Marshal("x".into()).is_connection_fault());
        assert!(!BridgeError::Usage("x".into()).is_connection_fault());
    }
}
