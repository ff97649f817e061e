//! The error type produced by storage back-ends.

use std::fmt;
use thiserror::Error;

/// The error type returned by storage back-end methods.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// A list specifying categories of storage back-end errors. The control
/// channel maps these onto FTP reply codes.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Error)]
pub enum ErrorKind {
    /// The file or directory does not exist or may never exist.
    #[error("file or directory not found")]
    PermanentFileNotAvailable,

    /// The file is temporarily unavailable, a retry may succeed.
    #[error("file temporarily unavailable")]
    TransientFileNotAvailable,

    /// The back-end refused the operation.
    #[error("permission denied")]
    PermissionDenied,

    /// The path contains characters or sequences the back-end cannot store.
    #[error("file name not allowed")]
    FileNameNotAllowed,

    /// Ran out of storage space.
    #[error("insufficient storage space")]
    InsufficientStorageSpace,

    /// The file would exceed the storage allocation for this user.
    #[error("exceeded storage allocation")]
    ExceededStorageAllocation,

    /// Catch-all for I/O and other local failures.
    #[error("local error")]
    LocalError,
}

impl Error {
    /// Creates a new error of the given kind caused by `source`.
    pub fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Returns the corresponding `ErrorKind` for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|s| &**s as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::PermanentFileNotAvailable,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::LocalError,
        };
        Error::new(kind, err)
    }
}
