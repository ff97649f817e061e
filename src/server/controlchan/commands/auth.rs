//! The RFC 2228 `AUTH` command used to upgrade the control channel to TLS
//!
//! A client requests TLS with the AUTH command and then decides if it wishes
//! to secure the data connections by use of the PBSZ and PROT commands.

use crate::{
    auth::UserDetail,
    server::controlchan::{
        error::ControlChanError,
        handler::{CommandContext, CommandHandler},
        Reply, ReplyCode,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

/// The parameter that can be given to the `AUTH` command.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AuthParam {
    Ssl,
    Tls,
}

#[derive(Debug)]
pub struct Auth {
    protocol: AuthParam,
}

impl Auth {
    pub fn new(protocol: AuthParam) -> Self {
        Auth { protocol }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Auth
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        match (args.tls_configured, self.protocol) {
            (true, AuthParam::Tls) => {
                let mut session = args.session.lock().await;
                if session.cmd_tls {
                    return Ok(Reply::new(ReplyCode::BadCommandSequence, "Already in secure mode"));
                }
                // The control loop runs the handshake right after this 234
                // reply is flushed, so no command can sneak in between.
                session.pending_tls_upgrade = true;
                Ok(Reply::new(ReplyCode::AuthOkayNoDataNeeded, "Honored"))
            }
            (true, AuthParam::Ssl) => Ok(Reply::new(ReplyCode::CommandNotImplementedForParameter, "Auth SSL not implemented")),
            (false, _) => Ok(Reply::new(ReplyCode::CommandNotImplemented, "TLS/SSL not configured")),
        }
    }
}
