//! A small, workspace-wide error-code taxonomy.
//!
//! Every fallible module defines its own `thiserror::Error` enum and
//! implements [`CacheError`] so that callers can branch on a stable code
//! without matching every concrete variant.

use std::error::Error;

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ErrorCode {
    Success = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    FailedPrecondition = 9,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
}

impl ErrorCode {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "InvalidArgumentError",
            ErrorCode::NotFound => "NotFoundError",
            ErrorCode::Internal => "InternalError",
            ErrorCode::DataLoss => "DataLossError",
            _ => "CacheError",
        }
    }
}

/// Implemented by every error enum in the workspace so that errors can be
/// boxed as `Box<dyn CacheError>` while still exposing a stable code.
pub trait CacheError: Error + Send + Sync + 'static {
    fn code(&self) -> ErrorCode;
}

impl CacheError for std::convert::Infallible {
    fn code(&self) -> ErrorCode {
        ErrorCode::Unknown
    }
}
