use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bitcoin::{BlockHash, OutPoint};
use serde_json::json;
use thiserror::Error;

/// Failures raised while answering a query, and by the stores backing it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("malformed reference: {0}")]
    MalformedReference(String),

    #[error("truncated input: {0} bytes after the flag byte is not a whole number of outpoints")]
    TruncatedInput(usize),

    #[error("empty query")]
    EmptyQuery,

    #[error("batch too large: {count} outpoints, at most {max} allowed")]
    BatchTooLarge { count: usize, max: usize },

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("input {0} is not available")]
    InputUnavailable(OutPoint),

    #[error("block does not extend the current tip, parent {0}")]
    OrphanBlock(BlockHash),

    #[error("output value {0} exceeds the money supply")]
    ValueOutOfRange(u64),
}

impl QueryError {
    /// True for failures caused by what the caller sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::MalformedReference(_)
                | QueryError::TruncatedInput(_)
                | QueryError::EmptyQuery
                | QueryError::BatchTooLarge { .. }
                | QueryError::UnsupportedFormat(_)
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::InputUnavailable(_)
            | QueryError::OrphanBlock(_)
            | QueryError::ValueOutOfRange(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QueryError::MalformedReference(_)
            | QueryError::TruncatedInput(_)
            | QueryError::EmptyQuery
            | QueryError::BatchTooLarge { .. }
            | QueryError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn class(&self) -> &'static str {
        match self {
            QueryError::MalformedReference(_) => "malformed reference",
            QueryError::TruncatedInput(_) => "truncated input",
            QueryError::EmptyQuery => "empty query",
            QueryError::BatchTooLarge { .. } => "batch too large",
            QueryError::UnsupportedFormat(_) => "unsupported format",
            QueryError::StorageUnavailable(_) => "storage unavailable",
            QueryError::NotFound(_) => "not found",
            QueryError::InputUnavailable(_)
            | QueryError::OrphanBlock(_)
            | QueryError::ValueOutOfRange(_) => "internal error",
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.class(),
            "message": self.to_string(),
        }));

        (self.status(), body).into_response()
    }
}

/// Error type for RestApi responses.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Bitcoin encode error, {0}")]
    BitcoinEncodeError(#[from] bitcoin::consensus::encode::Error),
    #[error("Incorrect status code {0}")]
    NotOkError(http::StatusCode),
    #[error("Invalid response, {0}")]
    InvalidResponse(String),
    #[cfg(feature = "use-reqwest")]
    #[cfg_attr(docsrs, doc(cfg(feature = "use-reqwest")))]
    #[error("Reqwest error, {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[cfg(not(feature = "use-reqwest"))]
    #[cfg_attr(docsrs, doc(cfg(not(feature = "use-reqwest"))))]
    #[error("Custom error, {0}")]
    CustomError(Box<dyn std::error::Error + Send + Sync>),
}
