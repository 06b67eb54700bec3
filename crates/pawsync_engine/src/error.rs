//! Error types for the engine.

use crate::gateway::GatewayError;
use pawsync_model::{BookingStatus, ModelError};
use pawsync_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The remote service could not be reached.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A hold or booking already covers the slot.
    #[error("slot unavailable: {0}")]
    SlotUnavailable(String),

    /// The acting user may not perform this change.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The backend does not accept this write method.
    #[error("write unsupported: {0}")]
    WriteUnsupported(String),

    /// Required input is missing or malformed.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested status change is not a legal edge.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Sync failed and there is no cached snapshot to show.
    #[error("sync failed with no cached snapshot: {cause}")]
    NoSnapshot {
        /// Failure that triggered the fallback.
        cause: String,
    },

    /// A newer request replaced this one before it completed.
    #[error("request {token} superseded by a newer request")]
    Superseded {
        /// Token of the discarded request.
        token: u64,
    },

    /// The invite token has expired.
    #[error("invite expired")]
    InviteExpired,

    /// The remote service rejected the request.
    #[error("remote error {status}: {message}")]
    Remote {
        /// HTTP status.
        status: u16,
        /// Server message.
        message: String,
    },

    /// Local cache failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),
}

impl EngineError {
    /// Creates an invalid-transition error for booking statuses.
    pub fn booking_transition(from: BookingStatus, to: BookingStatus) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns true if the engine established a local fallback for this
    /// failure (cached data or a buffered entity).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::NetworkUnavailable(_) | EngineError::WriteUnsupported(_)
        )
    }

    /// Returns true if the failure is a user-facing rejection that must not
    /// be retried automatically.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::SlotUnavailable(_)
                | EngineError::NotAuthorized(_)
                | EngineError::ValidationFailed(_)
                | EngineError::InvalidTransition { .. }
                | EngineError::NotFound(_)
                | EngineError::InviteExpired
        )
    }
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Network(message) => EngineError::NetworkUnavailable(message),
            GatewayError::Decode(message) => EngineError::Codec(message),
            GatewayError::Status { status, message } => match status {
                400 | 422 => EngineError::ValidationFailed(message),
                403 => EngineError::NotAuthorized(message),
                404 => EngineError::NotFound(message),
                405 => EngineError::WriteUnsupported(message),
                409 => EngineError::SlotUnavailable(message),
                410 => EngineError::InviteExpired,
                _ => EngineError::Remote { status, message },
            },
        }
    }
}

impl From<ModelError> for EngineError {
    fn from(err: ModelError) -> Self {
        EngineError::ValidationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> EngineError {
        GatewayError::Status {
            status,
            message: "nope".into(),
        }
        .into()
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(status(405), EngineError::WriteUnsupported(_)));
        assert!(matches!(status(409), EngineError::SlotUnavailable(_)));
        assert!(matches!(status(403), EngineError::NotAuthorized(_)));
        assert!(matches!(status(404), EngineError::NotFound(_)));
        assert!(matches!(status(422), EngineError::ValidationFailed(_)));
        assert!(matches!(status(410), EngineError::InviteExpired));
        assert!(matches!(
            status(500),
            EngineError::Remote { status: 500, .. }
        ));
        assert!(matches!(
            EngineError::from(GatewayError::Network("down".into())),
            EngineError::NetworkUnavailable(_)
        ));
    }

    #[test]
    fn recoverable_errors() {
        assert!(EngineError::NetworkUnavailable("down".into()).is_recoverable());
        assert!(EngineError::WriteUnsupported("405".into()).is_recoverable());
        assert!(!EngineError::SlotUnavailable("p1".into()).is_recoverable());
        assert!(EngineError::NotAuthorized("user_3".into()).is_rejection());
        assert!(!EngineError::Superseded { token: 1 }.is_rejection());
    }

    #[test]
    fn error_display() {
        let err = EngineError::booking_transition(
            BookingStatus::CancelledByOwner,
            BookingStatus::ProviderConfirmed,
        );
        assert_eq!(
            err.to_string(),
            "invalid transition from cancelled_by_owner to provider_confirmed"
        );
    }
}
