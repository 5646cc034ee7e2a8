use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};

/// Request-level errors surfaced by the API. Every variant maps to one
/// status code and a stable machine-readable `kind`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid upstream response: {0}")]
    UpstreamInvalidResponse(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamInvalidResponse(_) => "upstream_invalid_response",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamInvalidResponse(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(source) => error!(error = %source, "internal error"),
            ApiError::UpstreamUnavailable(detail) | ApiError::UpstreamInvalidResponse(detail) => {
                warn!(detail = %detail, "upstream failure")
            }
            _ => {}
        }
        let body = json!({
            "error": {
                "kind": self.kind(),
                "detail": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

impl From<mongodb::error::Error> for ApiError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return Self::Conflict("duplicate record".to_string());
        }
        Self::Internal(err.into())
    }
}

impl From<mongodb::bson::ser::Error> for ApiError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        Self::Internal(err.into())
    }
}

/// Mongo reports unique-index violations as write error code 11000. A race
/// between two imports of the same game must surface as a conflict, not a 500.
pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) => we.code == 11000,
        ErrorKind::Command(ce) => ce.code == 11000,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_status_codes() {
        let cases = [
            (ApiError::invalid_input("q"), StatusCode::BAD_REQUEST),
            (
                ApiError::Unauthenticated("no cookie".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (ApiError::forbidden("not an owner"), StatusCode::FORBIDDEN),
            (ApiError::not_found("no such game"), StatusCode::NOT_FOUND),
            (ApiError::conflict("already owned"), StatusCode::CONFLICT),
            (
                ApiError::UpstreamUnavailable("bgg".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::UpstreamInvalidResponse("bad xml".into()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "kind {}", err.kind());
        }
    }

    #[test]
    fn internal_error_hides_the_source_detail() {
        let err = ApiError::Internal(anyhow::anyhow!("connection pool exhausted"));
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
