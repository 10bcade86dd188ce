use kinship_shared::CursorError;
use kinship_store::{StoreError, TxError};
use thiserror::Error;

use crate::blobs::BlobError;

/// Errors returned by every manager operation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),
}

/// Transport-independent classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    BadRequest,
    Conflict,
    Internal,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::BadRequest(_) => ErrorKind::BadRequest,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::Internal(_) => ErrorKind::Internal,
            CoreError::Blob(BlobError::TooLarge { .. } | BlobError::Empty) => ErrorKind::BadRequest,
            CoreError::Blob(_) => ErrorKind::Internal,
            CoreError::Store(StoreError::NotFound) => ErrorKind::NotFound,
            CoreError::Store(e) if e.is_unique_violation() => ErrorKind::Conflict,
            CoreError::Store(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub(crate) fn forbidden(why: impl Into<String>) -> Self {
        CoreError::Forbidden(why.into())
    }

    pub(crate) fn bad_request(why: impl Into<String>) -> Self {
        CoreError::BadRequest(why.into())
    }

    pub(crate) fn conflict(why: impl Into<String>) -> Self {
        CoreError::Conflict(why.into())
    }
}

impl TxError for CoreError {
    fn is_transient(&self) -> bool {
        matches!(self, CoreError::Store(e) if e.is_busy())
    }
}

impl From<CursorError> for CoreError {
    fn from(e: CursorError) -> Self {
        CoreError::BadRequest(format!("Invalid cursor: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Rewrite a missing-row store error as a [`CoreError::NotFound`] naming
/// what was looked up.
pub(crate) trait OrNotFound<T> {
    fn or_not_found(self, what: &str) -> Result<T>;
}

impl<T> OrNotFound<T> for std::result::Result<T, StoreError> {
    fn or_not_found(self, what: &str) -> Result<T> {
        self.map_err(|e| match e {
            StoreError::NotFound => CoreError::not_found(what),
            other => CoreError::Store(other),
        })
    }
}

/// Report a uniqueness violation as the business rule it enforces. Any
/// other store error keeps its default mapping.
pub(crate) trait OrDuplicate<T> {
    fn or_duplicate(self, rule: impl FnOnce() -> CoreError) -> Result<T>;
}

impl<T> OrDuplicate<T> for std::result::Result<T, StoreError> {
    fn or_duplicate(self, rule: impl FnOnce() -> CoreError) -> Result<T> {
        self.map_err(|e| if e.is_unique_violation() { rule() } else { e.into() })
    }
}
