//! The service provider interface (SPI) for auth

use async_trait::async_trait;
use thiserror::Error;

/// Asynchronous authenticator interface. Implement this to plug in your own
/// credential check and register it with
/// [`Server::authenticator`](crate::Server::authenticator).
#[async_trait]
pub trait Authenticator<User>: Sync + Send {
    /// Authenticate the given user with the given password.
    async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthenticationError>;
}

/// The error type returned by [`Authenticator::authenticate`].
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The username is not known to the authenticator.
    #[error("unknown user")]
    BadUser,

    /// The username exists but the password does not match.
    #[error("bad password")]
    BadPassword,

    /// The authentication back-end itself failed e.g. a remote credential
    /// store could not be reached.
    #[error("authentication backend error")]
    ImplPropagated(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AuthenticationError {
    /// Wraps an arbitrary back-end error.
    pub fn with_source<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AuthenticationError::ImplPropagated(Box::new(source))
    }
}
