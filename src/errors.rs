//! Typed error hierarchy for slotboard.
//!
//! - `BoardError`: board core failures surfaced to UI callers
//! - `ApiError`: failures reported by (or on the way to) the booking backend
//! - `TransportError` / `ChannelDecodeError`: live-update channel failures
//! - `DragError`: illegal drag gestures
//! - `BackendError`: reference backend handler failures

use slotboard_common::{AppointmentId, AppointmentStatus};
use thiserror::Error;

/// Errors from the board core.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Appointment {id} not found")]
    NotFound { id: AppointmentId },

    /// The backend refused a status change. The store has already been
    /// rolled back when this is returned.
    #[error("Moving appointment {id} from {from} to {to} was rejected: {reason}")]
    TransitionRejected {
        id: AppointmentId,
        from: AppointmentStatus,
        to: AppointmentStatus,
        #[source]
        reason: ApiError,
    },

    #[error("Refreshing appointments failed: {0}")]
    RefreshFailed(#[source] ApiError),

    #[error("Editing appointment {id} failed: {source}")]
    EditFailed {
        id: AppointmentId,
        #[source]
        source: ApiError,
    },

    #[error("Booking failed: {0}")]
    BookingFailed(#[source] ApiError),
}

impl BoardError {
    /// Whether the caller should show this to the user. Only rejected
    /// transitions are escalated; everything else is recoverable and silent.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, BoardError::TransitionRejected { .. })
    }
}

/// Failure of a backend request, classified by reason code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response ({status}): {message}")]
    Unexpected { status: u16, message: String },
}

impl ApiError {
    /// Stable reason code for logs and UI lookup tables.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::PermissionDenied(_) => "permission_denied",
            ApiError::Conflict(_) => "conflict",
            ApiError::Validation(_) => "validation",
            ApiError::NotFound(_) => "not_found",
            ApiError::Transport(_) => "transport",
            ApiError::Unexpected { .. } => "unexpected",
        }
    }

    /// Map an HTTP status and error body to a reason.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ApiError::PermissionDenied(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            400 | 422 => ApiError::Validation(message),
            _ => ApiError::Unexpected { status, message },
        }
    }
}

/// Live-update transport failures. Never fatal to the board.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Connection lost: {0}")]
    Lost(String),

    #[error("Send failed: {0}")]
    Send(String),
}

/// A push frame that could not be decoded. Logged and dropped.
#[derive(Debug, Error)]
#[error("Undecodable live-update frame ({len} bytes): {source}")]
pub struct ChannelDecodeError {
    pub len: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Gesture errors from the drag/drop layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragError {
    #[error("Appointment {active} is already being dragged")]
    AlreadyDragging { active: AppointmentId },

    #[error("Appointment {id} is not on the board")]
    UnknownAppointment { id: AppointmentId },
}

/// Errors from the reference backend's handlers.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Appointment {id} not found")]
    AppointmentNotFound { id: i64 },

    #[error("Service {id} not found")]
    ServiceNotFound { id: i64 },

    #[error("Invalid status '{0}'")]
    InvalidStatus(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_from_status_classifies_reasons() {
        assert!(matches!(
            ApiError::from_status(403, "no".into()),
            ApiError::PermissionDenied(_)
        ));
        assert!(matches!(
            ApiError::from_status(409, "stale".into()),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_status(422, "bad".into()),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from_status(404, "gone".into()),
            ApiError::NotFound(_)
        ));
        assert_eq!(
            ApiError::from_status(503, "down".into()),
            ApiError::Unexpected {
                status: 503,
                message: "down".into()
            }
        );
    }

    #[test]
    fn api_error_codes_are_stable() {
        assert_eq!(ApiError::Conflict(String::new()).code(), "conflict");
        assert_eq!(ApiError::Transport(String::new()).code(), "transport");
        assert_eq!(
            ApiError::Unexpected {
                status: 500,
                message: String::new()
            }
            .code(),
            "unexpected"
        );
    }

    #[test]
    fn only_rejected_transitions_are_user_visible() {
        let rejected = BoardError::TransitionRejected {
            id: 1,
            from: AppointmentStatus::New,
            to: AppointmentStatus::Confirmed,
            reason: ApiError::PermissionDenied("staff only".into()),
        };
        assert!(rejected.is_user_visible());
        assert!(rejected.to_string().contains("new"));
        assert!(rejected.to_string().contains("confirmed"));

        assert!(!BoardError::NotFound { id: 1 }.is_user_visible());
        assert!(!BoardError::RefreshFailed(ApiError::Transport("x".into())).is_user_visible());
    }

    #[test]
    fn transition_rejected_exposes_reason_as_source() {
        use std::error::Error as _;
        let err = BoardError::TransitionRejected {
            id: 4,
            from: AppointmentStatus::Done,
            to: AppointmentStatus::New,
            reason: ApiError::Conflict("changed elsewhere".into()),
        };
        let source = err.source().expect("reason is the source");
        assert!(source.to_string().contains("changed elsewhere"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardError::NotFound { id: 1 });
        assert_std_error(&ApiError::Transport("x".into()));
        assert_std_error(&TransportError::Lost("eof".into()));
        assert_std_error(&DragError::AlreadyDragging { active: 2 });
        assert_std_error(&BackendError::ServiceNotFound { id: 3 });
    }
}
