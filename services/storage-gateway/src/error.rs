//! Gateway error taxonomy and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors surfaced by the upload and streaming pipelines.
///
/// Selection and validation errors fail fast, before any provider call or
/// arena work; transfer errors are recorded against the serving account
/// before they propagate here.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Pool(#[from] account_pool::Error),

    #[error(transparent)]
    Provider(#[from] provider::ProviderError),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("range not satisfiable for object of {total} bytes")]
    RangeNotSatisfiable { total: u64 },

    #[error("permission denied")]
    PermissionDenied,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable tag for the JSON error body and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Pool(account_pool::Error::CapacityExhausted { .. }) => "capacity_exhausted",
            Error::Pool(account_pool::Error::NoAccountAvailable(_)) => "no_account_available",
            Error::Pool(account_pool::Error::NotFound(_)) => "account_not_found",
            Error::Provider(provider::ProviderError::NotFound(_)) => "object_not_found",
            Error::Provider(provider::ProviderError::Unavailable(_)) => "provider_unavailable",
            Error::Provider(_) => "upstream_transfer_error",
            Error::Transcode(_) => "transcode_failure",
            Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Error::PermissionDenied => "permission_denied",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Io(_) => "io_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Pool(account_pool::Error::CapacityExhausted { .. }) => {
                StatusCode::INSUFFICIENT_STORAGE
            }
            Error::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Provider(provider::ProviderError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Provider(provider::ProviderError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Provider(_) => StatusCode::BAD_GATEWAY,
            Error::Transcode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });

        let mut response = (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();

        // 416 responses advertise the satisfiable range per RFC 9110
        if let Error::RangeNotSatisfiable { total } = self
            && let Ok(value) = format!("bytes */{total}").parse()
        {
            response
                .headers_mut()
                .insert(axum::http::header::CONTENT_RANGE, value);
        }
        response
    }
}
