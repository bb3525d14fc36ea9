use axum::{
    extract::multipart::MultipartError,
    extract::multipart::MultipartRejection,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}; check your environment or .env file")]
    MissingSecret(&'static str),

    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the HTTP handlers. Every variant renders as
/// `{"error": "..."}` with a matching status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unprocessable(String),

    /// Extractor rejections (bad JSON, oversized or malformed multipart bodies).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("{context}: {error}")]
    Llm {
        context: &'static str,
        #[source]
        error: LlmError,
    },

    #[error("{context}: {error:#}")]
    Internal {
        context: &'static str,
        error: anyhow::Error,
    },
}

impl AppError {
    /// Wrap an adapter error, keeping LLM failures distinguishable so they map to 502.
    pub fn internal(context: &'static str, err: anyhow::Error) -> Self {
        match err.downcast::<LlmError>() {
            Ok(error) => Self::Llm { context, error },
            Err(error) => Self::Internal { context, error },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Rejected { status, .. } => *status,
            Self::Llm { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::Rejected {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_errors_map_to_bad_gateway() {
        let err = anyhow::Error::new(LlmError::EmptyResponse);
        let app_err = AppError::internal("Error answering question", err);
        assert_eq!(app_err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_other_errors_map_to_internal() {
        let err = anyhow::anyhow!("disk full");
        let app_err = AppError::internal("Error processing PDF", err);
        assert_eq!(app_err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app_err.to_string(), "Error processing PDF: disk full");
    }
}
