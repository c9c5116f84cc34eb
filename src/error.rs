use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AppError {
    /// Upstream had no usable data for the requested symbol or range.
    #[error("{0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `detail` field of the error body.
    pub fn detail(&self) -> String {
        match self {
            AppError::NotFound(msg) => msg.clone(),
            other => format!("An unexpected error occurred: {other}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let detail = self.detail();
        if status == StatusCode::NOT_FOUND {
            warn!(status = status.as_u16(), "{detail}");
        } else {
            error!(status = status.as_u16(), "{detail}");
        }
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
