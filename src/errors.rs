//! Core error taxonomy
//!
//! Every fallible operation in the wagering core returns [`GameResult`].
//! HTTP status mapping for these variants lives in `api::errors`.

use thiserror::Error;

/// Errors surfaced by the wagering core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GameError {
    /// Bad config, bet, buy-in, or player count. Rejected synchronously,
    /// before the request touches any session state.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown session, link, bet, or ticket id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Join attempt on a session already at target capacity.
    #[error("session {0} is already full")]
    AlreadyFull(String),

    /// Mutation attempt on a session or ticket in a terminal state.
    #[error("already settled: {0}")]
    AlreadySettled(String),

    /// Invoice creation or payout failed at the provider. The caller sees
    /// the failure; session state is left as it was.
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    /// Payment confirmation for a hash that was already processed. The
    /// callback surface acknowledges these instead of erroring back at
    /// the provider.
    #[error("duplicate payment callback for {0}")]
    DuplicateCallback(String),
}

impl GameError {
    /// Shorthand for a [`GameError::Validation`] with a formatted message.
    pub fn validation(msg: impl Into<String>) -> Self {
        GameError::Validation(msg.into())
    }

    /// Shorthand for [`GameError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GameError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors a payment-callback handler should swallow rather
    /// than report upstream.
    pub fn is_duplicate_callback(&self) -> bool {
        matches!(self, GameError::DuplicateCallback(_))
    }
}

/// Convenience alias used throughout the crate.
pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GameError::not_found("session", "abc123");
        assert_eq!(err.to_string(), "session not found: abc123");

        let err = GameError::AlreadyFull("s1".to_string());
        assert!(err.to_string().contains("already full"));
    }

    #[test]
    fn test_duplicate_detection() {
        assert!(GameError::DuplicateCallback("hash".into()).is_duplicate_callback());
        assert!(!GameError::validation("nope").is_duplicate_callback());
    }
}
