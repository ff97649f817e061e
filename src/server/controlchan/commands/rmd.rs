//! The RFC 959 Remove Directory (`RMD`) command

use super::{current_user, fs_error_reply};
use crate::{
    auth::UserDetail,
    notification::{DataEvent, DataListener},
    server::controlchan::{
        error::ControlChanError,
        handler::{CommandContext, CommandHandler},
        Reply, ReplyCode,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Rmd {
    path: String,
}

impl Rmd {
    pub fn new(path: String) -> Self {
        Rmd { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Rmd
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let resolved = session.resolve(&self.path);
        let storage = session.storage.clone();
        let user = session.user.clone();

        match storage.rmd(current_user(&user)?, &resolved).await {
            Ok(()) => {
                let event_meta = session.event_meta();
                drop(session);
                args.data_listener
                    .receive_data_event(
                        DataEvent::RemovedDir {
                            path: resolved.to_string_lossy().to_string(),
                        },
                        event_meta,
                    )
                    .await;
                Ok(Reply::new(ReplyCode::FileActionOkay, "Folder deleted"))
            }
            Err(e) => Ok(fs_error_reply(&e)),
        }
    }
}
