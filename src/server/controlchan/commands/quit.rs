//! The RFC 959 Logout (`QUIT`) command

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
pub struct Quit;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Quit
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        // Anything still in flight on the wire after QUIT is dropped; the
        // control loop exits once the 221 went out.
        session.has_quit = true;
        session.close_after_reply = true;
        session.reset_data_chan();
        Ok(Reply::new(ReplyCode::ClosingControlConnection, "Goodbye."))
    }
}
