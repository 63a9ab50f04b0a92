//! Error taxonomy for upstream calls and the service facade.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::model::{EntityId, ResourceKind};

/// Failure reported by the upstream collaborator
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connection could not be established or broke mid-request
    #[error("upstream transport failure: {0}")]
    Transport(String),

    #[error("upstream request timed out")]
    Timeout,

    /// Upstream reports the target entity does not exist
    #[error("{resource} not found upstream")]
    NotFound { resource: ResourceKind },

    /// Any other non-success HTTP status
    #[error("upstream responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed upstream response: {0}")]
    Decode(String),

    /// The detached task running the call panicked or was torn down
    #[error("upstream call aborted: {0}")]
    Aborted(String),
}

impl UpstreamError {
    /// Whether this failure counts toward opening the circuit.
    pub fn is_trip_worthy(&self) -> bool {
        match self {
            UpstreamError::Transport(_) | UpstreamError::Timeout | UpstreamError::Decode(_) => true,
            UpstreamError::Status { status, .. } => *status >= 500 || *status == 429,
            UpstreamError::NotFound { .. } | UpstreamError::Aborted(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// Errors surfaced by the service facade to outer layers
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Breaker denied or upstream failed, and nothing usable was cached
    #[error("{}", fallback_message(*resource, *id))]
    FallbackUnavailable {
        resource: ResourceKind,
        id: Option<EntityId>,
    },

    #[error("{resource} not found")]
    NotFound { resource: ResourceKind },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

fn fallback_message(resource: ResourceKind, id: Option<EntityId>) -> String {
    match id {
        Some(id) => format!(
            "No cached {} available for {} ID: {} and service is currently unavailable.",
            resource, resource, id
        ),
        None => format!(
            "No cached {}s available and service is currently unavailable.",
            resource
        ),
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::FallbackUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            ServiceError::FallbackUnavailable { .. } => {
                "Service is currently unavailable. Please contact support."
            }
            ServiceError::NotFound { .. } => "The requested resource does not exist.",
            ServiceError::Upstream(_) => "An unexpected error occurred. Please try again later.",
        }
    }
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub details: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            timestamp: chrono::Utc::now(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.public_message().to_string(),
            details: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
