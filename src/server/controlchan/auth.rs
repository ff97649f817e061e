//! The authentication gate: commands outside the NO_AUTH set are refused
//! with 530 until a USER/PASS pair succeeded.

use super::middleware::ControlChanMiddleware;
use super::{Command, ControlChanError, Reply, ReplyCode};
use crate::auth::UserDetail;
use crate::server::session::SharedSession;
use crate::storage::{Metadata, StorageBackend};
use async_trait::async_trait;

pub struct AuthMiddleware<Storage, User, Next>
where
    Storage: StorageBackend<User>,
    Storage::Metadata: Metadata,
    User: UserDetail,
    Next: ControlChanMiddleware,
{
    pub session: SharedSession<Storage, User>,
    pub next: Next,
}

#[async_trait]
impl<Storage, User, Next> ControlChanMiddleware for AuthMiddleware<Storage, User, Next>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
    Next: ControlChanMiddleware,
{
    async fn handle(&mut self, command: Command) -> Result<Reply, ControlChanError> {
        if command.is_exempt_from_auth() {
            return self.next.handle(command).await;
        }
        let authenticated = {
            let session = self.session.lock().await;
            session.authenticated()
        };
        if authenticated {
            self.next.handle(command).await
        } else {
            Ok(Reply::new(ReplyCode::NotLoggedIn, "Not logged in."))
        }
    }
}
