//! The RFC 959 Data Port (`PORT`) command
//
// The argument is a HOST-PORT specification for the data port to be used in
// the data connection: the concatenation of a 32-bit internet host address
// and a 16-bit TCP port address, broken into 8-bit fields transmitted as
// comma separated decimal numbers:
//
//   PORT h1,h2,h3,h4,p1,p2

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
pub struct Port {
    addr: SocketAddrV4,
}

impl Port {
    pub fn new(addr: SocketAddrV4) -> Self {
        Port { addr }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Port
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        // Once either PASV or PORT was received, the other family is
        // refused until a transfer resets the sub-state.
        if session.data_chan.is_some() {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "Bad sequence of commands."));
        }
        session.data_chan = Some(DataChan::Active { addr: self.addr });
        Ok(Reply::new(ReplyCode::CommandOkay, "OK"))
    }
}
