//! Error types for the webhook server.

use hook_parser::ParseError;
use warp::http::StatusCode;

/// Errors raised while serving webhook requests or starting the server.
///
/// The request-level variants each map to exactly one HTTP status via
/// [`HookError::status_code`] and are published on the error channel when a
/// request fails.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    /// The request path is not the configured webhook path
    #[error("Route not found: {path}")]
    RouteNotFound {
        /// The path that was requested
        path: String,
    },

    /// The webhook path was requested with something other than POST
    #[error("Method not allowed: {method}")]
    MethodNotAllowed {
        /// The method that was used
        method: String,
    },

    /// Basic-auth credentials were missing or did not match
    #[error("Unauthorized: request contained invalid credentials")]
    Unauthorized,

    /// The body was not a usable XML notification
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] ParseError),

    /// The client's body stream failed before completing
    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    /// The body grew past the configured limit
    #[error("Payload exceeds the {limit} byte limit")]
    PayloadTooLarge {
        /// Configured maximum body size in bytes
        limit: usize,
    },

    /// The listener could not be bound
    #[error("Failed to bind {address}: {reason}")]
    Bind {
        /// The host:port that was requested
        address: String,
        /// Underlying error description
        reason: String,
    },

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The server task ended abnormally during shutdown
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl HookError {
    /// HTTP status reported to the caller for this error.
    ///
    /// Authentication failures report 403 here; the server swaps in 401 when
    /// configured with [`AuthFailureStatus::Challenge`](crate::AuthFailureStatus).
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::MalformedPayload(_) | Self::BodyRead(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Bind { .. } | Self::Configuration(_) | Self::Shutdown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_map_to_statuses() {
        let cases = [
            (HookError::RouteNotFound { path: "/nope".into() }, 404),
            (HookError::MethodNotAllowed { method: "GET".into() }, 405),
            (HookError::Unauthorized, 403),
            (HookError::MalformedPayload(ParseError::MissingRootElement), 400),
            (HookError::BodyRead("reset".into()), 400),
            (HookError::PayloadTooLarge { limit: 10 }, 413),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code().as_u16(), status, "{error}");
        }
    }

    #[test]
    fn test_parse_error_converts() {
        let error: HookError = ParseError::MissingRootElement.into();
        assert_eq!(error.to_string(), "Malformed payload: Missing root element");
    }
}
