//! Domain error types for the cutover engine.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use crate::models::{ChecklistGate, CutoverStatus};

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request conflicts with existing state (overlapping windows, live registrations)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A state transition was rejected
    #[error(transparent)]
    Advance(#[from] AdvanceError),

    /// Drift detection could not complete
    #[error(transparent)]
    Drift(#[from] DriftError),
}

/// Rejections produced by the cutover state machine.
///
/// Every variant names the precondition that failed so an operator can remediate.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdvanceError {
    #[error(
        "ChecklistIncomplete: table '{table}' cannot become ready, unsatisfied gates: {}",
        .missing.iter().map(|g| g.as_str()).collect::<Vec<_>>().join(", ")
    )]
    ChecklistIncomplete {
        table: String,
        missing: Vec<ChecklistGate>,
    },

    #[error("ValidationFailed: table '{table}': {reason}")]
    ValidationFailed { table: String, reason: String },

    #[error("NoActiveFreezeWindow: table '{table}' has no active freeze window covering it")]
    NoActiveFreezeWindow { table: String },

    #[error(
        "ConcurrentTransitionError: table '{table}' changed while leaving '{expected}' (version {version}); re-fetch and retry"
    )]
    ConcurrentTransition {
        table: String,
        expected: CutoverStatus,
        version: i32,
    },

    #[error("TerminalState: table '{table}' is '{status}'; register a new attempt to retry")]
    TerminalState { table: String, status: CutoverStatus },

    #[error("InvalidTransition: table '{table}' cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        table: String,
        from: CutoverStatus,
        to: CutoverStatus,
    },
}

impl AdvanceError {
    /// Stable machine-readable code for API responses and audit entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChecklistIncomplete { .. } => "CHECKLIST_INCOMPLETE",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::NoActiveFreezeWindow { .. } => "NO_ACTIVE_FREEZE_WINDOW",
            Self::ConcurrentTransition { .. } => "CONCURRENT_TRANSITION",
            Self::TerminalState { .. } => "TERMINAL_STATE",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }
}

/// Failures while measuring drift between the two stores.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriftError {
    /// A store could not be reached. Never reported as drift.
    #[error("SourceUnavailable: {store} store unreachable while checking '{table}': {message}")]
    SourceUnavailable {
        store: String,
        table: String,
        message: String,
    },

    /// The detector did not return within the job timeout.
    #[error("Timeout: drift detection for '{table}' exceeded {seconds}s")]
    Timeout { table: String, seconds: u64 },

    /// The store answered but the query itself failed.
    #[error("Query failed on {store} store for '{table}': {message}")]
    Query {
        store: String,
        table: String,
        message: String,
    },
}

impl DriftError {
    /// Transient errors are retried with backoff; the rest raise an alert immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::Timeout { .. })
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_code, response_message) = match self {
            AppError::Database(err_str) => {
                tracing::error!("Database error: {}", err_str);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AppError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", self.to_string())
            }
            AppError::Unauthorized(_) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string())
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", self.to_string()),
            AppError::Advance(err) => {
                let status = match err {
                    AdvanceError::ConcurrentTransition { .. } => StatusCode::CONFLICT,
                    _ => StatusCode::UNPROCESSABLE_ENTITY,
                };
                (status, err.code(), err.to_string())
            }
            AppError::Drift(err) => {
                let status = if err.is_transient() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, "DRIFT_DETECTION_FAILED", err.to_string())
            }
        };

        HttpResponse::build(status).json(ErrorResponse {
            error: error_code.to_string(),
            message: response_message,
        })
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Invalid UUID: {}", err))
    }
}
