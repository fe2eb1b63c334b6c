//! Error types for the executor's HTTP routes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use omrelay::auth::AuthError;
use omrelay::relay::RelayError;
use omrelay_http::error::ClientError;

/// Errors returned by the executor's HTTP routes.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Webhook authentication or body parsing failed.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// `x-local-token` is missing or wrong.
    #[error("invalid local token")]
    InvalidLocalToken,

    /// The request body is not JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The request body is JSON but not an object.
    #[error("body must be a JSON object")]
    BodyNotObject,

    /// The chain-execution service could not be reached.
    #[error("chain service unavailable: {0}")]
    ChainUnavailable(#[from] ClientError),
}

impl ExecutorError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Relay(RelayError::Auth(AuthError::SecretNotConfigured)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Relay(RelayError::Auth(
                AuthError::MissingSignatureHeaders | AuthError::InvalidSignature,
            ))
            | Self::InvalidLocalToken => StatusCode::UNAUTHORIZED,
            Self::Relay(RelayError::Auth(AuthError::NonUtf8Body) | RelayError::InvalidJson(_))
            | Self::InvalidBody(_)
            | Self::BodyNotObject => StatusCode::BAD_REQUEST,
            Self::ChainUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ExecutorError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ExecutorError::from(RelayError::from(AuthError::SecretNotConfigured)), 500),
            (ExecutorError::from(RelayError::from(AuthError::MissingSignatureHeaders)), 401),
            (ExecutorError::from(RelayError::from(AuthError::InvalidSignature)), 401),
            (ExecutorError::from(RelayError::from(AuthError::NonUtf8Body)), 400),
            (ExecutorError::InvalidLocalToken, 401),
            (ExecutorError::BodyNotObject, 400),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{err}");
        }
    }
}
