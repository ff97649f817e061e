//! Defines the service provider interface for storage back-end implementors.

use super::error::Error;
use crate::auth::UserDetail;
use async_trait::async_trait;
use std::{
    fmt::{self, Debug, Formatter, Write},
    path::Path,
    result,
    time::SystemTime,
};
use tokio::io::AsyncReadExt;

/// Result type used by traits in this module
pub type Result<T> = result::Result<T, Error>;

/// How [`StorageBackend::put`] should open the destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Create the file, truncating it if it exists (`STOR`).
    Create,
    /// Append to the file, creating it if needed (`APPE`).
    Append,
}

/// Represents the metadata of an FTP file
pub trait Metadata {
    /// Returns the length (size) of the file in bytes.
    fn len(&self) -> u64;

    /// Returns `self.len() == 0`.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the path is a directory.
    fn is_dir(&self) -> bool;

    /// Returns true if the path is a file.
    fn is_file(&self) -> bool;

    /// Returns true if the path is a symbolic link.
    fn is_symlink(&self) -> bool;

    /// Returns the last modified time of the path.
    fn modified(&self) -> Result<SystemTime>;

    /// Returns the `uid` of the file.
    fn uid(&self) -> u32;

    /// Returns the `gid` of the file.
    fn gid(&self) -> u32;

    /// Returns the number of links to the file. The default implementation
    /// always returns `1`
    fn links(&self) -> u64 {
        1
    }

    /// Returns the `permissions` of the file. The default implementation
    /// assumes unix permissions and defaults to "rw-r--r--" (octal 644)
    fn permissions(&self) -> Permissions {
        Permissions(0o644)
    }
}

/// Represents the permission bits of an FTP file. Renders in the
/// `rwxr-xr-x` form used by directory listings.
pub struct Permissions(pub u32);

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Three rwx triplets, user group and other, highest bits first.
        for shift in [6u32, 3, 0].iter() {
            let triplet = (self.0 >> shift) & 0b111;
            f.write_char(if triplet & 0b100 > 0 { 'r' } else { '-' })?;
            f.write_char(if triplet & 0b010 > 0 { 'w' } else { '-' })?;
            f.write_char(if triplet & 0b001 > 0 { 'x' } else { '-' })?;
        }
        Ok(())
    }
}

/// Fileinfo pairs the path of a file with its [`Metadata`].
#[derive(Clone)]
pub struct Fileinfo<P, M>
where
    P: AsRef<Path>,
    M: Metadata,
{
    /// The path to the file
    pub path: P,
    /// The file's metadata
    pub metadata: M,
}

impl<P, M> Fileinfo<P, M>
where
    P: AsRef<Path>,
    M: Metadata,
{
    /// The last component of the path, the way a listing shows it.
    pub fn file_name(&self) -> String {
        self.path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.as_ref().to_string_lossy().to_string())
    }
}

impl<P, M> Debug for Fileinfo<P, M>
where
    P: AsRef<Path>,
    M: Metadata,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Fileinfo").field("path", &self.path.as_ref()).finish()
    }
}

/// The `StorageBackend` trait can be implemented to create custom FTP
/// virtual file systems. Once implemented it needs to be registered with the
/// [`Server`](crate::Server) on construction.
#[async_trait]
pub trait StorageBackend<User: UserDetail>: Send + Sync + Debug {
    /// The concrete type of the _metadata_ used by this storage backend.
    type Metadata: Metadata + Sync + Send;

    /// Implement to set the name of the storage back-end. By default it
    /// returns the type signature.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Returns the `Metadata` for the given file or directory.
    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<Self::Metadata>;

    /// Returns the list of files in the given directory.
    async fn list<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<Vec<Fileinfo<std::path::PathBuf, Self::Metadata>>>
    where
        <Self as StorageBackend<User>>::Metadata: Metadata;

    /// Returns a reader over the content of the given file.
    async fn get<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>>;

    /// Returns the whole content of the given file in one buffer. Back-ends
    /// that have no streaming read form only need to implement this one.
    async fn read_file<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<Vec<u8>> {
        let mut reader = self.get(user, path).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Writes bytes from the given reader to the file at `path`, creating or
    /// appending according to `mode`. Returns the number of bytes written.
    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        user: &User,
        input: R,
        path: P,
        mode: WriteMode,
    ) -> Result<u64>;

    /// Writes a whole in-memory buffer to the file at `path`. Back-ends that
    /// have no streaming write form only need to implement this one.
    async fn write_file<P: AsRef<Path> + Send + Debug>(&self, user: &User, bytes: Vec<u8>, path: P, mode: WriteMode) -> Result<u64> {
        self.put(user, std::io::Cursor::new(bytes), path, mode).await
    }

    /// Deletes the file at the given path.
    async fn del<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()>;

    /// Creates the given directory.
    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()>;

    /// Renames the given file or directory to the given new name.
    async fn rename<P: AsRef<Path> + Send + Debug>(&self, user: &User, from: P, to: P) -> Result<()>;

    /// Deletes the given directory, which must be empty.
    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, user: &User, path: P) -> Result<()>;
}
