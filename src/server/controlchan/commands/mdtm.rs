//! The RFC 3659 Modification Time (`MDTM`) command

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
use chrono::{DateTime, Utc};

#[derive(Debug)]
pub struct Mdtm {
    path: String,
}

impl Mdtm {
    pub fn new(path: String) -> Self {
        Mdtm { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Mdtm
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
            Ok(meta) => match meta.modified() {
                Ok(modified) => {
                    let timestamp: DateTime<Utc> = modified.into();
                    Ok(Reply::new_with_string(ReplyCode::FileStatus, timestamp.format("%Y%m%d%H%M%S").to_string()))
                }
                Err(e) => Ok(fs_error_reply(&e)),
            },
            Err(e) => Ok(fs_error_reply(&e)),
        }
    }
}
