//! Implementation of the [`Authenticator`] trait that allows everybody to log
//! in regardless of the password they supply.

use crate::auth::{spi::AuthenticationError, Authenticator, DefaultUser};
use async_trait::async_trait;

/// An [`Authenticator`] that accepts any username/password combination. This
/// is the default for a newly built [`Server`](crate::Server).
#[derive(Debug)]
pub struct AnonymousAuthenticator;

#[async_trait]
impl Authenticator<DefaultUser> for AnonymousAuthenticator {
    async fn authenticate(&self, _username: &str, _password: &str) -> Result<DefaultUser, AuthenticationError> {
        Ok(DefaultUser {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anonymous_auth_always_succeeds() {
        let auth = AnonymousAuthenticator {};
        assert_eq!(auth.authenticate("anonymous", "").await.unwrap(), DefaultUser {});
        assert_eq!(auth.authenticate("alice", "secret").await.unwrap(), DefaultUser {});
    }
}
