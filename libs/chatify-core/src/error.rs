//! Error→status mapper (C12) and the closed error-kind union (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// The closed set of error kinds that can cross a Chatify component boundary.
#[derive(Debug, thiserror::Error)]
pub enum ChatifyError {
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
    #[error("authentication required")]
    AuthRequired,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },
    #[error("operation timed out")]
    Timeout,
    #[error("event production failed: {0}")]
    EventProductionFailed(#[source] anyhow::Error),
    #[error("transient store error: {0}")]
    TransientStoreError(#[source] anyhow::Error),
    #[error("permanent store error: {0}")]
    PermanentStoreError(#[source] anyhow::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("fatal error: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl ChatifyError {
    /// Maps the error kind to an HTTP status code per the §4.11 table.
    pub fn status(&self) -> StatusCode {
        match self {
            ChatifyError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            ChatifyError::AuthRequired => StatusCode::UNAUTHORIZED,
            ChatifyError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatifyError::Conflict(_) => StatusCode::CONFLICT,
            ChatifyError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ChatifyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ChatifyError::EventProductionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatifyError::TransientStoreError(_)
            | ChatifyError::PermanentStoreError(_)
            | ChatifyError::Cancelled
            | ChatifyError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "Bad Request",
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::NOT_FOUND => "Not Found",
            StatusCode::CONFLICT => "Conflict",
            StatusCode::TOO_MANY_REQUESTS => "Too Many Requests",
            StatusCode::GATEWAY_TIMEOUT => "Gateway Timeout",
            StatusCode::SERVICE_UNAVAILABLE => "Service Unavailable",
            _ => "Internal Server Error",
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ChatifyError::RateLimitExceeded { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Detail string. In production this stays generic for 5xx kinds;
    /// callers running in developer mode may use `Display` on the error
    /// itself to surface the underlying message instead.
    fn detail(&self) -> String {
        match self {
            ChatifyError::EventProductionFailed(_)
            | ChatifyError::TransientStoreError(_)
            | ChatifyError::PermanentStoreError(_)
            | ChatifyError::Fatal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

/// RFC 7807 problem-details body.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: &'static str,
    pub status: u16,
    pub detail: String,
    pub instance: String,
}

impl IntoResponse for ChatifyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let correlation_id = crate::context::current_correlation_id();
        let body = ProblemDetails {
            kind: "about:blank",
            title: self.title(),
            status: status.as_u16(),
            detail: self.detail(),
            instance: correlation_id,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs() {
            if let Ok(header) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, header);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_maps_to_400() {
        let err = ChatifyError::InvalidArgument {
            field: "scopeId",
            reason: "empty".into(),
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.title(), "Bad Request");
    }

    #[test]
    fn rate_limit_maps_to_429_with_retry_after() {
        let err = ChatifyError::RateLimitExceeded {
            retry_after_secs: 3,
        };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.retry_after_secs(), Some(3));
    }

    #[test]
    fn event_production_failed_maps_to_503_and_hides_detail() {
        let err = ChatifyError::EventProductionFailed(anyhow::anyhow!("broker down"));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.detail(), "an internal error occurred");
    }

    #[test]
    fn timeout_maps_to_504() {
        assert_eq!(ChatifyError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
