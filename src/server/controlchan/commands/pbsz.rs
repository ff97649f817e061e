//! The RFC 2228 Protection Buffer Size (`PBSZ`) command

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

#[derive(Debug)]
pub struct Pbsz {
    size: u64,
}

impl Pbsz {
    pub fn new(size: u64) -> Self {
        Pbsz { size }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Pbsz
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        if !session.cmd_tls {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "PBSZ must be preceded by a successful AUTH TLS"));
        }
        session.pbsz_received = true;
        // TLS does its own buffering, the only meaningful size is 0.
        if self.size == 0 {
            Ok(Reply::new(ReplyCode::CommandOkay, "OK"))
        } else {
            Ok(Reply::new(ReplyCode::CommandOkay, "PBSZ=0"))
        }
    }
}
