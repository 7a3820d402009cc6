//!
//! Error kinds for the content-addressed store.
//!

use std::io;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Key absent, or the `PIdx` file for an expected priority is absent.
    /// Expected in normal operation; never logged as a warning.
    #[error("not found")]
    NotFound,

    /// Filesystem or embedded-store I/O failure. Always surfaced to the
    /// caller, never swallowed.
    #[error("i/o error: {0}")]
    IoError(#[from] io::Error),

    /// Write refused by a back-end size cap or free-space floor.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// An on-disk invariant was violated. `HighDb` attempts local repair
    /// for this kind before surfacing it.
    #[error("corrupt on-disk state: {0}")]
    Corrupt(String),

    /// The embedded back-end detected insufficient resources (disk space,
    /// open file handles, ...) to proceed safely.
    #[error("refused: {0}")]
    Refused(String),
}

impl StoreError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::Corrupt(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}
