// Error types for the HTTP layer. Every error renders as
// `{ "statusCode": <u16>, "message": <string> }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::upload::RequestError;

#[derive(Debug)]
pub enum AppError {
    BadRequest,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    InternalServerError(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest => (StatusCode::BAD_REQUEST, canonical(StatusCode::BAD_REQUEST)),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "You are not allowed to access the requested resource".to_string(),
            ),
            Self::NotFound => (StatusCode::NOT_FOUND, canonical(StatusCode::NOT_FOUND)),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                canonical(StatusCode::METHOD_NOT_ALLOWED),
            ),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                canonical(StatusCode::PAYLOAD_TOO_LARGE),
            ),
            Self::InternalServerError(details) => {
                error!("Request failed: {}", details);
                (StatusCode::INTERNAL_SERVER_ERROR, client_message(&details))
            }
        };

        let body = Json(ErrorBody {
            status_code: status.as_u16(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<RequestError> for AppError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::BodyTooLarge(details) => {
                warn!("Upload rejected: {}", details);
                AppError::PayloadTooLarge
            }
            RequestError::UnusableIdentity(_) => {
                warn!("Upload rejected: {}", err);
                AppError::Forbidden
            }
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

fn canonical(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("Unknown").to_string()
}

/// Drop the leading context of a `context: detail` message and capitalize
/// the detail, e.g. `mkdir static/256: permission denied` becomes
/// `Permission denied`.
pub fn client_message(details: &str) -> String {
    let mut parts = details.split(": ");
    let first = parts.next().unwrap_or_default();
    let detail = parts.next().unwrap_or(first);

    let mut chars = detail.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
