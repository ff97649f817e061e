//! The RFC 2228 Data Channel Protection Level (`PROT`) command

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

/// The parameter that can be given to the `PROT` command.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtParam {
    Clear,
    Safe,
    Confidential,
    Private,
}

#[derive(Debug)]
pub struct Prot {
    param: ProtParam,
}

impl Prot {
    pub fn new(param: ProtParam) -> Self {
        Prot { param }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Prot
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        if !session.cmd_tls {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "PROT not allowed on insecure control connection"));
        }
        if !session.pbsz_received {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "PBSZ must be issued first"));
        }
        match self.param {
            ProtParam::Private => {
                session.data_tls = true;
                Ok(Reply::new(ReplyCode::CommandOkay, "OK"))
            }
            _ => Ok(Reply::new(ReplyCode::ProtLevelNotSupported, "Requested protection level not supported")),
        }
    }
}
