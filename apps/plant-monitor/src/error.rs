use crate::aggregate_log::AggregateLogError;
use crate::pump::PumpError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};

#[derive(Debug)]
enum ErrorBody {
    Text(String),
    Json(JsonValue),
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    body: ErrorBody,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::Text(message.into()),
        }
    }

    pub fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body: ErrorBody::Json(body),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.body {
            ErrorBody::Text(message) => (self.status, message).into_response(),
            ErrorBody::Json(body) => (self.status, Json(body)).into_response(),
        }
    }
}

impl From<AggregateLogError> for AppError {
    fn from(err: AggregateLogError) -> Self {
        tracing::error!(error = %err, "aggregate log error");
        Self::internal(err.to_string())
    }
}

impl From<PumpError> for AppError {
    fn from(err: PumpError) -> Self {
        match err {
            PumpError::InvalidId(_) => Self::bad_request("Invalid pump ID"),
            other => Self::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "status": "error", "message": other.to_string() }),
            ),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
