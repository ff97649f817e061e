//! The RFC 959 Make Directory (`MKD`) command

use super::{current_user, fs_error_reply};
use crate::{
    auth::UserDetail,
    notification::{DataEvent, DataListener},
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

#[derive(Debug)]
pub struct Mkd {
    path: String,
}

impl Mkd {
    pub fn new(path: String) -> Self {
        Mkd { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Mkd
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        let target = path::with_cwd(&session.cwd, &self.path);
        let resolved = session.resolve(&self.path);
        let storage = session.storage.clone();
        let user = session.user.clone();

        match storage.mkd(current_user(&user)?, &resolved).await {
            Ok(()) => {
                let event_meta = session.event_meta();
                drop(session);
                args.data_listener
                    .receive_data_event(
                        DataEvent::MadeDir {
                            path: target.to_string_lossy().to_string(),
                        },
                        event_meta,
                    )
                    .await;
                Ok(Reply::new_with_string(
                    ReplyCode::DirCreated,
                    format!("\"{}\" directory created", path::path_escape(&target.to_string_lossy())),
                ))
            }
            Err(e) => Ok(fs_error_reply(&e)),
        }
    }
}
