//! The RFC 959 User Name (`USER`) command

use crate::{
    auth::UserDetail,
    server::{
        controlchan::{
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        session::SessionState,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct User {
    username: String,
}

impl User {
    pub fn new(username: String) -> Self {
        User { username }
    }
}

#[async_trait]
impl<Storage, UserDet> CommandHandler<Storage, UserDet> for User
where
    UserDet: UserDetail + 'static,
    Storage: StorageBackend<UserDet> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, UserDet>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        if args.tls_only && !session.cmd_tls {
            return Ok(Reply::new(
                ReplyCode::NotLoggedIn,
                "This server does not permit login over a non-secure connection; connect using FTP-SSL with explicit AUTH TLS",
            ));
        }
        session.username = Some(self.username.clone());
        session.state = SessionState::WaitPass;
        Ok(Reply::new(ReplyCode::NeedPassword, "User name okay, need password."))
    }
}
