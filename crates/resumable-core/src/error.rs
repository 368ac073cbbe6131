//! Unified application error types.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. Every upload error is scoped to the
//! request that produced it; none of them is fatal to the process.

use std::fmt;
use thiserror::Error;

/// Error kind categorization used across the whole server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The byte-range descriptor could not be decoded or is inconsistent.
    MalformedRange,
    /// The first chunk carried no usable destination file name.
    MissingFileName,
    /// A first chunk arrived for a session that already acknowledged bytes.
    DuplicateSession,
    /// A continuation chunk referenced a session that does not exist.
    UnknownSession,
    /// The chunk does not start at the session's next expected offset.
    OutOfOrderChunk,
    /// Appending or syncing chunk bytes to the temporary file failed.
    WriteFailure,
    /// Moving a completed upload to its destination failed.
    FinalizationFailure,
    /// Required request headers are missing or invalid, or the method is wrong.
    RequestValidation,
    /// A configuration error occurred.
    Configuration,
    /// An internal server error occurred.
    Internal,
}

impl ErrorKind {
    /// Whether this kind is caused by the server rather than the client.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::WriteFailure | Self::FinalizationFailure | Self::Configuration | Self::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRange => write!(f, "MALFORMED_RANGE"),
            Self::MissingFileName => write!(f, "MISSING_FILE_NAME"),
            Self::DuplicateSession => write!(f, "DUPLICATE_SESSION"),
            Self::UnknownSession => write!(f, "UNKNOWN_SESSION"),
            Self::OutOfOrderChunk => write!(f, "OUT_OF_ORDER_CHUNK"),
            Self::WriteFailure => write!(f, "WRITE_FAILURE"),
            Self::FinalizationFailure => write!(f, "FINALIZATION_FAILURE"),
            Self::RequestValidation => write!(f, "REQUEST_VALIDATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error.
///
/// Crate-specific failures are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls, giving the HTTP layer a single type to
/// translate into responses.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed-range error.
    pub fn malformed_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRange, message)
    }

    /// Create a missing-file-name error.
    pub fn missing_file_name(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingFileName, message)
    }

    /// Create a duplicate-session error.
    pub fn duplicate_session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateSession, message)
    }

    /// Create an unknown-session error.
    pub fn unknown_session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownSession, message)
    }

    /// Create an out-of-order-chunk error.
    pub fn out_of_order(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfOrderChunk, message)
    }

    /// Create a write failure carrying the underlying I/O error.
    pub fn write_failure(message: impl Into<String>, source: std::io::Error) -> Self {
        let message = format!("{}: {source}", message.into());
        Self::with_source(ErrorKind::WriteFailure, message, source)
    }

    /// Create a finalization failure carrying the underlying I/O error.
    pub fn finalization_failure(message: impl Into<String>, source: std::io::Error) -> Self {
        let message = format!("{}: {source}", message.into());
        Self::with_source(ErrorKind::FinalizationFailure, message, source)
    }

    /// Create a request validation error.
    pub fn request_validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestValidation, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Internal, format!("I/O error: {err}"), err)
    }
}
