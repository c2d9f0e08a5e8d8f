//! Shared error type used across all Conductor crates.
//!
//! Variants map 1:1 onto the error taxonomy: validation and not-found
//! surface as 4xx to HTTP/WS callers, conflict as 409, storage errors are
//! retried once by the caller before being logged or propagated depending
//! on whether the write was analytics (lossy-tolerant) or session state
//! (lossless-tolerant).

/// Stable machine-readable error code, carried alongside the human message
/// on every user-visible failure (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Transient,
    Storage,
    Other,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Transient => "transient",
            ErrorCode::Storage => "storage",
            ErrorCode::Other => "other",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::Validation,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Conflict(_) => ErrorCode::Conflict,
            Error::Unauthorized(_) => ErrorCode::Unauthorized,
            Error::Transient(_) => ErrorCode::Transient,
            Error::Storage(_) => ErrorCode::Storage,
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Other(_) => {
                ErrorCode::Other
            }
        }
    }

    /// Whether a caller should retry once before surfacing this error,
    /// per the storage failure semantics in §7.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
