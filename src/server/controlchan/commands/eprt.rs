//! The RFC 2428 Extended Data Port (`EPRT`) command, IPv4 only.

use crate::{
    auth::UserDetail,
    server::{
        controlchan::{
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        session::DataChan,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::net::SocketAddrV4;

#[derive(Debug)]
pub struct Eprt {
    addr: SocketAddrV4,
}

impl Eprt {
    pub fn new(addr: SocketAddrV4) -> Self {
        Eprt { addr }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Eprt
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        if session.data_chan.is_some() {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "Bad sequence of commands."));
        }
        session.data_chan = Some(DataChan::Active { addr: self.addr });
        Ok(Reply::new(ReplyCode::CommandOkay, "OK"))
    }
}
