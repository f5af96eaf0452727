use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokendError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for TokendError {
    fn into_response(self) -> Response {
        let status = match &self {
            TokendError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            TokendError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
