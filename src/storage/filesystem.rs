//! A StorageBackend that uses the local filesystem, like a traditional FTP
//! server.

use crate::auth::UserDetail;
use crate::storage::{Error, ErrorKind, Fileinfo, Metadata, Permissions, Result, StorageBackend, WriteMode};
use async_trait::async_trait;
use std::{
    fmt::Debug,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

/// An implementation of the [`StorageBackend`] trait that keeps its files
/// inside a specific root directory on local disk.
#[derive(Debug)]
pub struct Filesystem {
    root: PathBuf,
}

impl Filesystem {
    /// Create a new Filesystem backend with the given root. No operations
    /// can take place outside of the root. For example, when the root is set
    /// to `/srv/ftp` and a client asks for `hello.txt`, the server will send
    /// it `/srv/ftp/hello.txt`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Filesystem { root: root.into() }
    }

    /// Returns the full path on disk for the (server-relative) input path.
    /// `..` components are resolved textually and can never escape the root.
    fn full_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let mut full = self.root.clone();
        for component in path.as_ref().components() {
            match component {
                Component::Normal(p) => full.push(p),
                Component::ParentDir => {
                    if full != self.root {
                        full.pop();
                    }
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        full
    }
}

#[async_trait]
impl<User: UserDetail> StorageBackend<User> for Filesystem {
    type Metadata = std::fs::Metadata;

    fn name(&self) -> &str {
        "filesystem"
    }

    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<Self::Metadata> {
        let full_path = self.full_path(path);
        let meta = tokio::fs::symlink_metadata(full_path).await?;
        Ok(meta)
    }

    async fn list<P>(&self, _user: &User, path: P) -> Result<Vec<Fileinfo<PathBuf, Self::Metadata>>>
    where
        P: AsRef<Path> + Send + Debug,
        <Self as StorageBackend<User>>::Metadata: Metadata,
    {
        let full_path = self.full_path(path);

        let mut rd = tokio::fs::read_dir(full_path).await?;
        let mut fis: Vec<Fileinfo<PathBuf, Self::Metadata>> = vec![];
        while let Some(dir_entry) = rd.next_entry().await? {
            let path = dir_entry.path();
            let metadata = tokio::fs::symlink_metadata(&path).await?;
            fis.push(Fileinfo { path, metadata });
        }

        Ok(fis)
    }

    async fn get<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>> {
        let full_path = self.full_path(path);
        let file = tokio::fs::File::open(full_path).await?;
        Ok(Box::new(file))
    }

    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        _user: &User,
        mut input: R,
        path: P,
        mode: WriteMode,
    ) -> Result<u64> {
        let full_path = self.full_path(path);

        let mut oo = tokio::fs::OpenOptions::new();
        oo.write(true).create(true);
        match mode {
            WriteMode::Create => oo.truncate(true),
            WriteMode::Append => oo.append(true),
        };
        #[cfg(unix)]
        oo.mode(0o644);

        let mut file = oo.open(full_path).await?;
        let bytes_copied = tokio::io::copy(&mut input, &mut file).await?;
        Ok(bytes_copied)
    }

    async fn del<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        tokio::fs::remove_file(self.full_path(path)).await?;
        Ok(())
    }

    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        tokio::fs::create_dir(self.full_path(path)).await?;
        Ok(())
    }

    async fn rename<P: AsRef<Path> + Send + Debug>(&self, _user: &User, from: P, to: P) -> Result<()> {
        let from = self.full_path(from);
        let to = self.full_path(to);

        tokio::fs::symlink_metadata(&from).await.map_err(|_| Error::from(ErrorKind::PermanentFileNotAvailable))?;
        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, _user: &User, path: P) -> Result<()> {
        tokio::fs::remove_dir(self.full_path(path)).await?;
        Ok(())
    }
}

impl Metadata for std::fs::Metadata {
    fn len(&self) -> u64 {
        self.len()
    }

    fn is_dir(&self) -> bool {
        self.is_dir()
    }

    fn is_file(&self) -> bool {
        self.is_file()
    }

    fn is_symlink(&self) -> bool {
        self.file_type().is_symlink()
    }

    fn modified(&self) -> Result<SystemTime> {
        self.modified().map_err(|e| Error::new(ErrorKind::LocalError, e))
    }

    #[cfg(unix)]
    fn uid(&self) -> u32 {
        use std::os::unix::fs::MetadataExt;
        MetadataExt::uid(self)
    }

    #[cfg(not(unix))]
    fn uid(&self) -> u32 {
        0
    }

    #[cfg(unix)]
    fn gid(&self) -> u32 {
        use std::os::unix::fs::MetadataExt;
        MetadataExt::gid(self)
    }

    #[cfg(not(unix))]
    fn gid(&self) -> u32 {
        0
    }

    #[cfg(unix)]
    fn permissions(&self) -> Permissions {
        use std::os::unix::fs::PermissionsExt;
        Permissions(self.permissions().mode() & 0o777)
    }

    #[cfg(not(unix))]
    fn permissions(&self) -> Permissions {
        Permissions(0o644)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DefaultUser;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[tokio::test]
    async fn fs_stat() {
        let root = tempfile::tempdir().unwrap();

        let file = tempfile::NamedTempFile::new_in(root.path()).unwrap();
        let path = file.path().to_owned();
        let meta = file.as_file().metadata().unwrap();

        let fs = Filesystem::new(root.path());
        let filename = path.file_name().unwrap();
        let my_meta = fs.metadata(&DefaultUser {}, filename).await.unwrap();

        assert_eq!(meta.is_dir(), my_meta.is_dir());
        assert_eq!(meta.is_file(), my_meta.is_file());
        assert_eq!(meta.len(), my_meta.len());
        assert_eq!(meta.modified().unwrap(), my_meta.modified().unwrap());
    }

    #[tokio::test]
    async fn fs_list() {
        let root = tempfile::tempdir().unwrap();
        let file = tempfile::NamedTempFile::new_in(root.path()).unwrap();
        let name = file.path().file_name().unwrap().to_str().unwrap().to_string();

        let fs = Filesystem::new(root.path());
        let my_list = fs.list(&DefaultUser {}, "/").await.unwrap();

        assert_eq!(my_list.len(), 1);
        assert_eq!(my_list[0].file_name(), name);
        assert!(my_list[0].metadata.is_file());
    }

    #[tokio::test]
    async fn fs_get() {
        let root = tempfile::tempdir().unwrap();

        let mut file = tempfile::NamedTempFile::new_in(root.path()).unwrap();
        let data = b"Koen was here\n";
        file.write_all(data).unwrap();

        let filename = file.path().file_name().unwrap().to_owned();
        let fs = Filesystem::new(root.path());

        let mut reader = fs.get(&DefaultUser {}, filename).await.unwrap();
        let mut content = Vec::new();
        tokio::io::copy(&mut reader, &mut content).await.unwrap();
        assert_eq!(data.as_ref(), &*content);
    }

    #[tokio::test]
    async fn fs_put_create_then_append() {
        let root = tempfile::tempdir().unwrap();
        let fs = Filesystem::new(root.path());

        fs.put(&DefaultUser {}, b"hallo".as_ref(), "greeting.txt", WriteMode::Create).await.unwrap();
        fs.put(&DefaultUser {}, b" again".as_ref(), "greeting.txt", WriteMode::Append).await.unwrap();

        let written = std::fs::read(root.path().join("greeting.txt")).unwrap();
        assert_eq!(written, b"hallo again");

        // Create mode truncates what the appends built up
        fs.put(&DefaultUser {}, b"fresh".as_ref(), "greeting.txt", WriteMode::Create).await.unwrap();
        let written = std::fs::read(root.path().join("greeting.txt")).unwrap();
        assert_eq!(written, b"fresh");
    }

    #[tokio::test]
    async fn fs_mkd_rmd() {
        let root = tempfile::tempdir().unwrap();
        let fs = Filesystem::new(root.path());

        fs.mkd(&DefaultUser {}, "bla").await.unwrap();
        assert!(std::fs::symlink_metadata(root.path().join("bla")).unwrap().is_dir());

        fs.rmd(&DefaultUser {}, "bla").await.unwrap();
        assert!(std::fs::symlink_metadata(root.path().join("bla")).is_err());
    }

    #[tokio::test]
    async fn fs_rename() {
        let root = tempfile::tempdir().unwrap();
        let file = tempfile::NamedTempFile::new_in(root.path()).unwrap();
        let old_filename = file.path().file_name().unwrap().to_str().unwrap().to_string();

        let fs = Filesystem::new(root.path());
        fs.rename(&DefaultUser {}, &old_filename, &"hello.txt".to_string()).await.unwrap();

        assert!(std::fs::metadata(root.path().join("hello.txt")).unwrap().is_file());
        assert!(std::fs::symlink_metadata(root.path().join(old_filename)).is_err());
    }

    #[tokio::test]
    async fn fs_del_missing_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let fs = Filesystem::new(root.path());

        let err = fs.del(&DefaultUser {}, "nope.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermanentFileNotAvailable);
    }

    #[test]
    fn full_path_cannot_escape_root() {
        let fs = Filesystem::new("/srv/ftp");
        assert_eq!(fs.full_path("/../../etc/passwd"), PathBuf::from("/srv/ftp/etc/passwd"));
        assert_eq!(fs.full_path("a/../../b"), PathBuf::from("/srv/ftp/b"));
        assert_eq!(fs.full_path("/hello.txt"), PathBuf::from("/srv/ftp/hello.txt"));
    }
}
