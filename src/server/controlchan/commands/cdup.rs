//! The RFC 959 Change To Parent Directory (`CDUP`) command

use crate::{
    auth::UserDetail,
    server::{
        controlchan::{
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        path,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Cdup;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Cdup
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        session.cwd = session.cwd.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/"));
        let cwd = path::path_escape(&session.cwd.to_string_lossy());
        Ok(Reply::new_with_string(
            ReplyCode::FileActionOkay,
            format!("CWD successful. \"{}\" is current directory", cwd),
        ))
    }
}
