use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::state::AppState;

/// A single failed field rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Detail of a 500, carried on the response so `expose_error_detail` can
/// decide whether the client gets to see it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::Validation(errors) => (
                status,
                Json(json!({
                    "success": false,
                    "message": "Validation failed",
                    "errors": errors,
                })),
            )
                .into_response(),
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                let mut res = (
                    status,
                    Json(json!({ "success": false, "message": "Server error" })),
                )
                    .into_response();
                res.extensions_mut().insert(ErrorDetail(format!("{e:#}")));
                res
            }
            AppError::Conflict(message)
            | AppError::Unauthorized(message)
            | AppError::NotFound(message)
            | AppError::BadRequest(message) => (
                status,
                Json(json!({ "success": false, "message": message })),
            )
                .into_response(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Outermost response mapper: in development, 500s carry their detail.
pub async fn expose_error_detail(State(state): State<AppState>, mut res: Response) -> Response {
    let Some(ErrorDetail(detail)) = res.extensions_mut().remove::<ErrorDetail>() else {
        return res;
    };
    if state.config.environment.is_production() {
        return res;
    }
    (
        res.status(),
        Json(json!({ "success": false, "message": "Server error", "error": detail })),
    )
        .into_response()
}

/// Turns a handler panic into the generic 500 envelope.
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    AppError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}
