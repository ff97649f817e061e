//! Contains the service provider interface for authentication and the
//! default (anonymous) implementation.

pub(crate) mod anonymous;
pub(crate) mod spi;
pub(crate) mod user;

pub use anonymous::AnonymousAuthenticator;
pub use spi::{AuthenticationError, Authenticator};
pub use user::{DefaultUser, UserDetail};
