//! The RFC 959 Rename To (`RNTO`) command

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
pub struct Rnto {
    path: String,
}

impl Rnto {
    pub fn new(path: String) -> Self {
        Rnto { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Rnto
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        // The stored source is cleared whether the rename works or not.
        let from = match session.rename_from.take() {
            Some(from) => from,
            None => return Ok(Reply::new(ReplyCode::BadCommandSequence, "RNFR required first")),
        };
        let to = session.resolve(&self.path);
        let storage = session.storage.clone();
        let user = session.user.clone();

        match storage.rename(current_user(&user)?, &from, &to).await {
            Ok(()) => {
                let event_meta = session.event_meta();
                drop(session);
                args.data_listener
                    .receive_data_event(
                        DataEvent::Renamed {
                            from: from.to_string_lossy().to_string(),
                            to: to.to_string_lossy().to_string(),
                        },
                        event_meta,
                    )
                    .await;
                Ok(Reply::new(ReplyCode::FileActionOkay, "File renamed successfully"))
            }
            Err(e) => Ok(fs_error_reply(&e)),
        }
    }
}
