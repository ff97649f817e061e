//! The RFC 959 Rename From (`RNFR`) command

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
pub struct Rnfr {
    path: String,
}

impl Rnfr {
    pub fn new(path: String) -> Self {
        Rnfr { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Rnfr
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let resolved = session.resolve(&self.path);
        // The path is held until the next RNTO; it does not need to exist
        // yet, the rename itself will tell.
        session.rename_from = Some(resolved);
        Ok(Reply::new(ReplyCode::FileActionPending, "Ready for destination name"))
    }
}
