//! Error types for the device link service.
//!
//! Errors propagate with `?` everywhere except the publish path, which
//! absorbs failures into a monotonically increasing counter (see
//! [`crate::transport::mqtt::Publisher`]).

use thiserror::Error;

/// Main error type for device link operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Connect retries exhausted after {attempts} failed attempts")]
    ConnectRetriesExhausted { attempts: u32 },
}

/// Result type for device link operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[test]
    fn test_error_display() {
        let error = ServiceError::ConnectRetriesExhausted { attempts: 10 };
        assert_eq!(
            error.to_string(),
            "Connect retries exhausted after 10 failed attempts"
        );
    }

    #[test]
    fn test_transport_error_conversion() {
        let error: ServiceError = TransportError::NotConnected.into();
        assert!(matches!(error, ServiceError::Transport(_)));
        assert!(error.to_string().contains("Not connected"));
    }
}
