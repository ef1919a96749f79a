use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

// API-wide failure type. Everything serializes as {"status":"Fail","reason":...}
// which is the wire shape every endpoint uses for errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    // Missing or malformed Authorization header
    #[error("Token invalid")]
    Unauthorized,
    // Well-formed header, wrong token
    #[error("Token invalid")]
    Forbidden,
    #[error("Rate Limit Exceeded")]
    RateLimited,
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden | ApiError::RateLimited => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({"status": "Fail", "reason": self.to_string()}));
        (self.status(), body).into_response()
    }
}
