//! Error types for the exchange

use thiserror::Error;

use crate::AppId;

/// Core exchange errors
///
/// Expected outcomes (no inventory, unknown click target, lost
/// optimistic race) are values, not errors. Only what a caller has to
/// react to ends up here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdexError {
    // Account errors
    #[error("Unknown account: {0}")]
    UnknownAccount(AppId),

    #[error("Invalid application id: {0:?}")]
    InvalidAppId(String),

    #[error("Account already registered: {0}")]
    DuplicateAccount(AppId),

    // Settlement errors
    #[error("Settlement conflict persisted after {attempts} attempts")]
    TransientConflict { attempts: u32 },

    // Store errors
    #[error("Account store unavailable: {0}")]
    StoreUnavailable(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdexError {
    /// Whether the caller may reasonably retry the request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdexError::TransientConflict { .. } | AdexError::StoreUnavailable(_)
        )
    }
}

/// Result type for exchange operations
pub type AdexResult<T> = Result<T, AdexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AdexError::TransientConflict { attempts: 5 }.is_retryable());
        assert!(AdexError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!AdexError::UnknownAccount(AppId::new("x")).is_retryable());
        assert!(!AdexError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = AdexError::TransientConflict { attempts: 3 };
        assert_eq!(err.to_string(), "Settlement conflict persisted after 3 attempts");

        let err = AdexError::DuplicateAccount(AppId::new("app-1"));
        assert_eq!(err.to_string(), "Account already registered: app-1");
    }
}
