//! The RFC 959 Change Working Directory (`CWD`) command

use super::current_user;
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

#[derive(Debug)]
pub struct Cwd {
    path: String,
}

impl Cwd {
    pub fn new(path: String) -> Self {
        Cwd { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Cwd
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

        match storage.metadata(current_user(&user)?, &resolved).await {
            Ok(meta) if meta.is_dir() => {
                session.cwd = target;
                let cwd = path::path_escape(&session.cwd.to_string_lossy());
                Ok(Reply::new_with_string(
                    ReplyCode::FileActionOkay,
                    format!("CWD successful. \"{}\" is current directory", cwd),
                ))
            }
            Ok(_) => Ok(Reply::new(ReplyCode::FileError, "Not a directory")),
            Err(_) => Ok(Reply::new(ReplyCode::FileError, "No such file or directory")),
        }
    }
}
