use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::channel::ProviderError;
use crate::queue::QueueBackendError;
use crate::redis::PoolError;
use crate::template::TemplateError;
use crate::webhook::TransportError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueBackendError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Template setup failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Redis setup failed: {0}")]
    Redis(#[from] PoolError),

    #[error("Webhook transport setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let log_message = self.to_string();
        let (status, code, public_message) = match &self {
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Configuration error",
            ),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", "Not found"),
            AppError::Queue(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_UNAVAILABLE",
                "Job queue temporarily unavailable",
            ),
            AppError::Provider(_)
            | AppError::Template(_)
            | AppError::Redis(_)
            | AppError::Transport(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STARTUP_ERROR",
                "Service misconfigured",
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "Request failed"
        );

        let message = if is_production() {
            public_message.to_string()
        } else {
            log_message
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
