use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error as ThisError;

/// Unified error taxonomy for the whole pipeline.
///
/// Client and resolution errors map to 400, upstream trouble to 503,
/// timeouts to 504, everything else to 500.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum AppError {
    // --- client errors ---
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Unsupported parameter: {0}")]
    UnsupportedParameter(String),

    #[error("Empty range: {0}")]
    EmptyRange(String),

    #[error("No data for expression: {0}")]
    EmptyResult(String),

    // --- resolution errors ---
    #[error("Unknown futures root: {0}")]
    UnknownRoot(String),

    #[error("No contract chain covers the requested range: {0}")]
    NoChainForRange(String),

    // --- upstream errors ---
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream pacing violation: {0}")]
    PacingViolation(String),

    #[error("Historical data farm unavailable: {0}")]
    NoDataFarm(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // --- configuration / internal ---
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl AppError {
    /// Stable machine-readable kind string used in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Parse(_) => "ParseError",
            AppError::MalformedToken(_) => "MalformedToken",
            AppError::UnknownSymbol(_) => "UnknownSymbol",
            AppError::UnsupportedParameter(_) => "UnsupportedParameter",
            AppError::EmptyRange(_) => "EmptyRange",
            AppError::EmptyResult(_) => "EmptyResult",
            AppError::UnknownRoot(_) => "UnknownRoot",
            AppError::NoChainForRange(_) => "NoChainForRange",
            AppError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            AppError::PacingViolation(_) => "PacingViolation",
            AppError::NoDataFarm(_) => "NoDataFarm",
            AppError::Timeout(_) => "Timeout",
            AppError::Cancelled(_) => "Cancelled",
            AppError::Config(_) => "Config",
            AppError::Io(_) => "Io",
            AppError::Invariant(_) => "Invariant",
        }
    }

    /// Transient upstream failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamUnavailable(_)
                | AppError::PacingViolation(_)
                | AppError::NoDataFarm(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Parse(_)
            | AppError::MalformedToken(_)
            | AppError::UnknownSymbol(_)
            | AppError::UnsupportedParameter(_)
            | AppError::EmptyRange(_)
            | AppError::EmptyResult(_)
            | AppError::UnknownRoot(_)
            | AppError::NoChainForRange(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable(_)
            | AppError::PacingViolation(_)
            | AppError::NoDataFarm(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) | AppError::Cancelled(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Config(_) | AppError::Io(_) | AppError::Invariant(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }
        let body = json!({
            "detail": {
                "error": {
                    "kind": self.kind(),
                    "message": self.to_string(),
                }
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Io(format!("CSV error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

// Alias for convenience
pub type Error = AppError;
