//! Error taxonomy shared by the store, admission and runner crates.

use http::StatusCode;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use serde::{Deserialize, Serialize};

/// Errors returned by core operations. Payloads are human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum KappError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not implemented: {0}")]
    Unimplemented(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type KappResult<T> = Result<T, KappError>;

impl KappError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Self::Unimplemented(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Cancelled(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Kubernetes `StatusReason` string for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::Conflict(_) => "Conflict",
            Self::InvalidArgument(_) => "BadRequest",
            Self::Unimplemented(_) => "MethodNotAllowed",
            Self::Cancelled(_) => "Timeout",
            Self::Internal(_) => "InternalError",
        }
    }

    pub fn to_status(&self) -> Status {
        status_body(self.status_code(), self.reason(), &self.to_string())
    }
}

/// Build a `Failure` status object as returned by the Kubernetes API.
pub fn status_body(code: StatusCode, reason: &str, message: &str) -> Status {
    Status {
        status: Some("Failure".to_string()),
        code: Some(i32::from(code.as_u16())),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        ..Status::default()
    }
}
