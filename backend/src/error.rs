use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::models::booking::{Rejection, RejectionCode};

/// Postgres `lock_not_available`, raised when `lock_timeout` expires.
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Retryable: the decision scope could not be entered in time.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ServiceUnavailable(_) => true,
            AppError::Database(e) => is_transient(e),
            _ => false,
        }
    }
}

fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(PG_LOCK_NOT_AVAILABLE),
        _ => false,
    }
}

/// Flattens field errors into `field: message; field: message`.
pub fn describe_validation_errors(e: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = e
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let msgs: Vec<&str> = errors
                .iter()
                .filter_map(|err| err.message.as_ref().map(|m| m.as_ref()))
                .collect();
            if msgs.is_empty() {
                let codes: Vec<&str> = errors.iter().map(|err| err.code.as_ref()).collect();
                format!("{}: {}", field, codes.join(", "))
            } else {
                format!("{}: {}", field, msgs.join(", "))
            }
        })
        .collect();

    for (field, kind) in e.errors() {
        if let validator::ValidationErrorsKind::Struct(nested) = kind {
            messages.push(format!("{}.{}", field, describe_validation_errors(nested)));
        }
    }

    messages.sort();
    messages.join("; ")
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                describe_validation_errors(e),
            ),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::Database(e) => {
                if is_transient(e) {
                    tracing::warn!("Transient database error: {:?}", e);
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({
                            "error": "Booking store is busy, please retry",
                            "code": "SERVICE_UNAVAILABLE",
                        })),
                    )
                        .into_response();
                }
                if let sqlx::Error::Database(ref db_err) = e {
                    if let Some(code) = db_err.code() {
                        match code.as_ref() {
                            "23505" => {
                                // unique_violation
                                tracing::warn!("Unique constraint violation: {}", db_err.message());
                                return (
                                    StatusCode::CONFLICT,
                                    Json(json!({
                                        "error": "A record with that value already exists",
                                        "code": "CONFLICT",
                                    })),
                                )
                                    .into_response();
                            }
                            "23503" => {
                                // foreign_key_violation
                                tracing::warn!("Foreign key violation: {}", db_err.message());
                                return (
                                    StatusCode::CONFLICT,
                                    Json(json!({
                                        "error": "Referenced record does not exist",
                                        "code": "CONFLICT",
                                    })),
                                )
                                    .into_response();
                            }
                            _ => {}
                        }
                    }
                }
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Database error".into(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal server error".into(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code {
            RejectionCode::SlotFull | RejectionCode::VehicleAlreadyBooked => StatusCode::CONFLICT,
            RejectionCode::InvalidDate
            | RejectionCode::InvalidSlot
            | RejectionCode::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(self)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
