use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use graphrun_core::error::GraphrunError;

/// Body of every run and control response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlResponse {
    Success { message: String },
    Error { message: String, exception: String },
    AlreadyRunning { message: String },
    NoExecutor { message: String },
}

impl ControlResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            message: message.into(),
        }
    }

    /// Map an error onto its response. `message` describes the failed
    /// action and is used for errors without a dedicated response type.
    pub fn from_error(message: &str, err: &GraphrunError) -> Self {
        match err {
            GraphrunError::AlreadyRunning => Self::AlreadyRunning {
                message: err.to_string(),
            },
            GraphrunError::NoActiveRun(_) => Self::NoExecutor {
                message: err.to_string(),
            },
            other => Self::Error {
                message: message.to_string(),
                exception: other.to_string(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Success { .. } => StatusCode::OK,
            Self::NoExecutor { .. } => StatusCode::BAD_REQUEST,
            Self::Error { .. } | Self::AlreadyRunning { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControlResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// `{success, data}` / `{success, error}` answer of the preview endpoints.
pub fn individual_response(result: Result<(), GraphrunError>) -> Json<serde_json::Value> {
    match result {
        Ok(()) => Json(serde_json::json!({ "success": true, "data": null })),
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}
