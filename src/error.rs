use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::issue::IssueStatus;
use crate::models::status::DeliveryStatus;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("no tracking session for delivery {0}")]
    UnknownDelivery(Uuid),

    #[error("tracking session for delivery {0} is already active")]
    SessionAlreadyActive(Uuid),

    #[error("tracking session for delivery {0} has ended")]
    SessionInactive(Uuid),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("stale position timestamp {submitted}, last accepted {last}")]
    StaleTimestamp {
        submitted: chrono::DateTime<chrono::Utc>,
        last: chrono::DateTime<chrono::Utc>,
    },

    #[error("invalid confirmation code: {0}")]
    InvalidConfirmationCode(String),

    #[error("checkpoint {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("unknown checkpoint {0}")]
    UnknownCheckpoint(Uuid),

    #[error("unknown issue {0}")]
    UnknownIssue(Uuid),

    #[error("issue {id} cannot {action} while {status:?}")]
    InvalidIssueTransition {
        id: Uuid,
        status: IssueStatus,
        action: &'static str,
    },

    #[error("eta unavailable: {0}")]
    EtaUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TrackingError {
    /// Stable machine-readable code for the error.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingError::UnknownDelivery(_) => "unknown_delivery",
            TrackingError::SessionAlreadyActive(_) => "session_already_active",
            TrackingError::SessionInactive(_) => "session_inactive",
            TrackingError::InvalidTransition { .. } => "invalid_transition",
            TrackingError::StaleTimestamp { .. } => "stale_timestamp",
            TrackingError::InvalidConfirmationCode(_) => "invalid_confirmation_code",
            TrackingError::AlreadyCompleted(_) => "already_completed",
            TrackingError::UnknownCheckpoint(_) => "unknown_checkpoint",
            TrackingError::UnknownIssue(_) => "unknown_issue",
            TrackingError::InvalidIssueTransition { .. } => "invalid_issue_transition",
            TrackingError::EtaUnavailable(_) => "eta_unavailable",
            TrackingError::NotFound(_) => "not_found",
            TrackingError::InvalidInput(_) => "invalid_input",
            TrackingError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TrackingError::UnknownDelivery(_)
            | TrackingError::UnknownCheckpoint(_)
            | TrackingError::UnknownIssue(_)
            | TrackingError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TrackingError::SessionAlreadyActive(_)
            | TrackingError::SessionInactive(_)
            | TrackingError::InvalidTransition { .. }
            | TrackingError::StaleTimestamp { .. }
            | TrackingError::AlreadyCompleted(_)
            | TrackingError::InvalidIssueTransition { .. } => StatusCode::CONFLICT,
            TrackingError::InvalidConfirmationCode(_) | TrackingError::EtaUnavailable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            TrackingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TrackingError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (self.status_code(), body).into_response()
    }
}

impl From<TrackingError> for tonic::Status {
    fn from(err: TrackingError) -> Self {
        let message = err.to_string();
        if let TrackingError::InvalidConfirmationCode(_) = err {
            return tonic::Status::permission_denied(message);
        }
        match err.status_code() {
            StatusCode::NOT_FOUND => tonic::Status::not_found(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                tonic::Status::invalid_argument(message)
            }
            StatusCode::CONFLICT => tonic::Status::failed_precondition(message),
            _ => tonic::Status::internal(message),
        }
    }
}
