use std::{
    fmt::{Debug, Display},
    path::{Path, PathBuf},
};

/// Extra information about the user that logged in. Implementations can
/// restrict a user to a sub-tree of the storage back-end and pick the
/// directory a session starts in.
pub trait UserDetail: Send + Sync + Display + Debug {
    /// The root this user is jailed to, as a path inside the storage
    /// back-end. `None` means the back-end root itself.
    fn home(&self) -> Option<&Path> {
        None
    }

    /// The working directory a freshly authenticated session starts in,
    /// relative to [`home`](UserDetail::home).
    fn initial_cwd(&self) -> PathBuf {
        PathBuf::from("/")
    }
}

/// A user created by the [`AnonymousAuthenticator`](crate::auth::AnonymousAuthenticator).
#[derive(Debug, PartialEq, Eq)]
pub struct DefaultUser;

impl UserDetail for DefaultUser {}

impl Display for DefaultUser {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "DefaultUser")
    }
}
