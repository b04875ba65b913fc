use crate::domain::ItemId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HlaviError>;

#[derive(Debug, Error)]
pub enum HlaviError {
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Invalid {field}: {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Ordering invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid session transition for {session} from {from} to {to}")]
    InvalidSessionTransition {
        session: String,
        from: String,
        to: String,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl HlaviError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the whole operation can be retried from scratch.
    ///
    /// Only lock and timeout contention qualifies: nothing was written.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(HlaviError::ConcurrencyConflict("lock".to_string()).is_retryable());
        assert!(!HlaviError::StoreUnavailable("down".to_string()).is_retryable());
        assert!(!HlaviError::ItemNotFound(ItemId::new()).is_retryable());
        assert!(!HlaviError::invalid("title", "empty").is_retryable());
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = HlaviError::invalid("position", "must not be negative");
        assert_eq!(err.to_string(), "Invalid position: must not be negative");
    }
}
