use crate::models::change::ChangeRecord;
use crate::utils::logger::log_error;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, HttpResponseBuilder, ResponseError};
use serde_json::json;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum FlowHistoryError {
    // 400s
    BadRequest(String),
    NotFound(String),
    PreconditionFailed(String),
    VersionConflict {
        workflow_id: String,
        provided: i64,
        current: i64,
    },
    QueueBusy(String),
    // 500
    DiffComputationError(String),
    MutationFailure {
        change: Box<ChangeRecord>,
        inner: Box<FlowHistoryError>,
    },
    RevertAborted(String),
    BackendError {
        status: u16,
        body: String,
    },
    RequestError(reqwest::Error),
    SerdeError(serde_json::Error),
    ConfigError(String),
    InternalServerError(String),
}

impl FlowHistoryError {
    /// Conflicts are never retried; the operator has to reload the versions first.
    pub fn is_version_conflict(&self) -> bool {
        match self {
            FlowHistoryError::VersionConflict { .. } => true,
            FlowHistoryError::MutationFailure { inner, .. } => inner.is_version_conflict(),
            _ => false,
        }
    }

    pub fn failed_change(&self) -> Option<&ChangeRecord> {
        match self {
            FlowHistoryError::MutationFailure { change, .. } => Some(change),
            _ => None,
        }
    }
}

impl fmt::Display for FlowHistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowHistoryError::BadRequest(e) => write!(f, "Bad Request: {}", e),
            FlowHistoryError::NotFound(e) => write!(f, "Not Found: {}", e),
            FlowHistoryError::PreconditionFailed(e) => write!(f, "Precondition Failed: {}", e),
            FlowHistoryError::VersionConflict {
                workflow_id,
                provided,
                current,
            } => write!(
                f,
                "Version Conflict: workflow {} is at version {} but the write was based on version {}",
                workflow_id, current, provided
            ),
            FlowHistoryError::QueueBusy(key) => write!(f, "Queue Busy: revert {} is already running", key),
            FlowHistoryError::DiffComputationError(e) => write!(f, "Diff Computation Error: {}", e),
            FlowHistoryError::MutationFailure { change, inner } => write!(
                f,
                "Failed to revert {} '{}': {}",
                change.object_type, change.display_name, inner
            ),
            FlowHistoryError::RevertAborted(key) => write!(f, "Revert {} aborted", key),
            FlowHistoryError::BackendError { status, body } => write!(f, "Backend Error ({}): {}", status, body),
            FlowHistoryError::RequestError(e) => write!(f, "Request Error: \n{}", e),
            FlowHistoryError::SerdeError(e) => write!(f, "Serde Error: \n{}", e),
            FlowHistoryError::ConfigError(e) => write!(f, "Config Error: {}", e),
            FlowHistoryError::InternalServerError(e) => write!(f, "InternalServerError: \n{}", e),
        }
    }
}

impl Error for FlowHistoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FlowHistoryError::MutationFailure { inner, .. } => Some(inner.as_ref()),
            FlowHistoryError::RequestError(e) => Some(e),
            FlowHistoryError::SerdeError(e) => Some(e),
            _ => None,
        }
    }
}

impl ResponseError for FlowHistoryError {
    fn error_response(&self) -> HttpResponse {
        match self {
            FlowHistoryError::BadRequest(e) => HttpResponse::BadRequest().json(json!({
                "status": 400,
                "message": e
            })),
            FlowHistoryError::NotFound(e) => HttpResponse::NotFound().json(json!({
                "status": 404,
                "message": e
            })),
            FlowHistoryError::VersionConflict { current, .. } => HttpResponse::Conflict().json(json!({
                "status": 409,
                "message": self.to_string(),
                "currentVersion": current
            })),
            FlowHistoryError::PreconditionFailed(e) => HttpResponse::PreconditionFailed().json(json!({
                "status": 412,
                "message": e
            })),
            FlowHistoryError::QueueBusy(_) => HttpResponseBuilder::new(StatusCode::LOCKED).json(json!({
                "status": 423,
                "message": self.to_string()
            })),
            FlowHistoryError::MutationFailure { inner, change } if inner.is_version_conflict() => {
                HttpResponse::Conflict().json(json!({
                    "status": 409,
                    "message": self.to_string(),
                    "change": change
                }))
            }
            _ => {
                log_error(format!("Internal Server Error: {}", self));

                HttpResponse::InternalServerError().json(json!({
                    "status": 500,
                    "message": self.to_string()
                }))
            }
        }
    }
}

impl From<reqwest::Error> for FlowHistoryError {
    fn from(e: reqwest::Error) -> Self {
        FlowHistoryError::RequestError(e)
    }
}

impl From<serde_json::Error> for FlowHistoryError {
    fn from(e: serde_json::Error) -> Self {
        FlowHistoryError::SerdeError(e)
    }
}

impl From<toml::de::Error> for FlowHistoryError {
    fn from(e: toml::de::Error) -> Self {
        FlowHistoryError::ConfigError(e.to_string())
    }
}

impl From<anyhow::Error> for FlowHistoryError {
    fn from(e: anyhow::Error) -> Self {
        FlowHistoryError::ConfigError(format!("{:#}", e))
    }
}
