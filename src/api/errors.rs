use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::error::ExamError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<ExamError> for ApiError {
    fn from(err: ExamError) -> Self {
        match err {
            ExamError::NotFound(entity) => ApiError::NotFound(format!("{entity} not found")),
            ExamError::Conflict(message) => ApiError::Conflict(message),
            ExamError::AlreadySubmitted => {
                ApiError::Conflict("You have already submitted this exam".to_string())
            }
            ExamError::Forbidden(message) => ApiError::Forbidden(message.to_string()),
            ExamError::InvalidWindow => {
                ApiError::UnprocessableEntity("end time must be after start time".to_string())
            }
            ExamError::NotAvailable => {
                ApiError::Conflict("Exam is not available for submission".to_string())
            }
            ExamError::WindowClosed => {
                ApiError::Conflict("Exam is not currently active".to_string())
            }
            ExamError::NothingToPublish => {
                ApiError::Conflict("No results to publish".to_string())
            }
            ExamError::Db(err) => ApiError::internal(err, "Database error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized(message) => {
                let status = StatusCode::UNAUTHORIZED;
                let mut response = (
                    status,
                    Json(ErrorResponse { status: status.as_u16(), detail: message.to_string() }),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ExamError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn domain_failures_map_to_stable_status_codes() {
        assert_eq!(status_of(ExamError::NotFound("Exam")), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ExamError::Conflict("x".to_string())), StatusCode::CONFLICT);
        assert_eq!(status_of(ExamError::AlreadySubmitted), StatusCode::CONFLICT);
        assert_eq!(status_of(ExamError::Forbidden("x")), StatusCode::FORBIDDEN);
        assert_eq!(status_of(ExamError::InvalidWindow), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(ExamError::NotAvailable), StatusCode::CONFLICT);
        assert_eq!(status_of(ExamError::WindowClosed), StatusCode::CONFLICT);
        assert_eq!(status_of(ExamError::NothingToPublish), StatusCode::CONFLICT);
    }
}
