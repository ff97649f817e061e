//! Contains the service provider interface for storage back-ends plus the
//! local filesystem implementation that ships with the crate.

pub(crate) mod error;
pub(crate) mod filesystem;
pub(crate) mod storage_backend;

pub use error::{Error, ErrorKind};
pub use filesystem::Filesystem;
pub use storage_backend::{Fileinfo, Metadata, Permissions, Result, StorageBackend, WriteMode};
