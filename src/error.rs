use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error taxonomy for the whole service. Handlers return this and the axum
/// boundary maps each kind to a status code; background workers log the
/// provider kinds and feed them to the retry queue instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    /// Retryable upstream failure (network, 429, 5xx). Never surfaced to
    /// sync callers; the retry queue picks it up.
    #[error("provider error: {0}")]
    ProviderTransient(String),

    /// History cursor rejected by the provider; triggers a full resync.
    #[error("history cursor is no longer valid")]
    StaleCursor,

    /// Non-retryable upstream failure (revoked grant, invalid credentials).
    #[error("provider rejected request: {0}")]
    ProviderFatal(String),

    /// MAC verification, envelope format, or embedding dimension failure.
    #[error("integrity failure: {0}")]
    Integrity(String),

    #[error("ai failure: {0}")]
    Ai(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    /// Transient failures go back to the retry queue; everything else is
    /// terminal for the current sync cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::ProviderTransient(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Ai(_) => StatusCode::BAD_GATEWAY,
            Error::ProviderTransient(_) | Error::ProviderFatal(_) => StatusCode::BAD_GATEWAY,
            Error::StaleCursor
            | Error::Integrity(_)
            | Error::Db(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "statusCode": status.as_u16(), "message": message }))).into_response()
    }
}
