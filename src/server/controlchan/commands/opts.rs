//! The RFC 2389 Options (`OPTS`) command

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
pub struct Opts {
    params: String,
}

impl Opts {
    pub fn new(params: String) -> Self {
        Opts { params }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Opts
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, _args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        // UTF8 is always on; everything else is not negotiable.
        if self.params.trim().eq_ignore_ascii_case("utf8 on") {
            Ok(Reply::new(ReplyCode::CommandOkay, "UTF8 mode enabled"))
        } else {
            Ok(Reply::new(ReplyCode::LocalError, "Not supported"))
        }
    }
}
