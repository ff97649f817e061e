//! The RFC 3659 File Size (`SIZE`) command

use super::{current_user, fs_error_reply};
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
pub struct Size {
    path: String,
}

impl Size {
    pub fn new(path: String) -> Self {
        Size { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Size
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let session = args.session.lock().await;
        let resolved = session.resolve(&self.path);
        let storage = session.storage.clone();
        let user = session.user.clone();
        drop(session);

        match storage.metadata(current_user(&user)?, &resolved).await {
            Ok(meta) if meta.is_file() => Ok(Reply::new_with_string(ReplyCode::FileStatus, format!("{}", meta.len()))),
            Ok(_) => Ok(Reply::new(ReplyCode::FileError, "Could not get file size.")),
            Err(e) => Ok(fs_error_reply(&e)),
        }
    }
}
