use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("restaurant throttled: {0}")]
    ThrottleExceeded(String),

    /// Internal only: a requested pairing has no route. Recovered by the
    /// engine (the order stays PENDING, the bot waits) and never surfaced
    /// over HTTP.
    #[error("no path between nodes {from} and {to}")]
    PathUnreachable { from: i64, to: i64 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::IllegalTransition(_) => StatusCode::CONFLICT,
            AppError::ThrottleExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::PathUnreachable { .. } | AppError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal failures get an opaque body; the detail goes to the log.
        let detail = match &self {
            AppError::Store(e) => {
                tracing::error!(error = ?e, "store failure surfaced as 500");
                "An unexpected error occurred. Please try again.".to_string()
            }
            AppError::PathUnreachable { .. } => {
                tracing::error!(error = %self, "unreachable path escaped the engine");
                "An unexpected error occurred. Please try again.".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": status.canonical_reason().unwrap_or("Error"),
            "detail": detail,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(
            AppError::NotFound("order".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidInput("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::IllegalTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::ThrottleExceeded("x".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::PathUnreachable { from: 1, to: 2 }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
