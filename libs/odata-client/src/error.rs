use std::time::Duration;

use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::retry::parse_retry_after;

/// Request lifecycle errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// The query description did not compile
    #[error(transparent)]
    Compile(#[from] odata_query::Error),

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: StatusCode,
        body: String,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected envelope
    #[error("{0}")]
    InvalidResponse(String),

    #[error("Returned multiple results when only one was expected.")]
    MultipleResults,

    /// The call parameters were rejected before anything was sent
    #[error("{0}")]
    InvalidParams(String),
}

impl ClientError {
    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided delay before the next attempt, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// A 409 whose body mentions a unique constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            ClientError::HttpStatus { status, body, .. } => {
                *status == StatusCode::CONFLICT && body.to_ascii_lowercase().contains("unique")
            }
            _ => false,
        }
    }

    /// Build an `HttpStatus` error from a response, reading `Retry-After`
    /// from its headers.
    #[must_use]
    pub fn from_response(
        status: StatusCode,
        headers: &HeaderMap,
        body: impl Into<String>,
    ) -> Self {
        let retry_after = headers
            .get(http::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        Self::HttpStatus {
            status,
            body: body.into(),
            retry_after,
        }
    }

    pub(crate) fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }
}
