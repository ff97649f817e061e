//! The TLS-only gate: when the server is configured `tls_only`, commands
//! outside the NO_AUTH set over a plaintext control channel are refused
//! with 522.

use super::middleware::ControlChanMiddleware;
use super::{Command, ControlChanError, Reply, ReplyCode};
use crate::auth::UserDetail;
use crate::server::session::SharedSession;
use crate::storage::{Metadata, StorageBackend};
use async_trait::async_trait;

pub struct TlsOnlyMiddleware<Storage, User, Next>
where
    Storage: StorageBackend<User>,
    Storage::Metadata: Metadata,
    User: UserDetail,
    Next: ControlChanMiddleware,
{
    pub session: SharedSession<Storage, User>,
    pub tls_only: bool,
    pub next: Next,
}

#[async_trait]
impl<Storage, User, Next> ControlChanMiddleware for TlsOnlyMiddleware<Storage, User, Next>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
    Next: ControlChanMiddleware,
{
    async fn handle(&mut self, command: Command) -> Result<Reply, ControlChanError> {
        if !self.tls_only || command.is_exempt_from_auth() {
            return self.next.handle(command).await;
        }
        let secure = {
            let session = self.session.lock().await;
            session.cmd_tls
        };
        if secure {
            self.next.handle(command).await
        } else {
            Ok(Reply::new(
                ReplyCode::ProtocolNotSupported,
                "Command only allowed over a secure connection; use AUTH TLS",
            ))
        }
    }
}
