//! The RFC 959 Status (`STAT`) command
//
// With a path argument this behaves like LIST, except the listing travels
// over the control channel as a 213 multi-line reply and no data socket is
// involved.

use super::{current_user, fs_error_reply};
use crate::{
    auth::UserDetail,
    server::{
        controlchan::{
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        datachan, path,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Stat {
    path: Option<String>,
}

impl Stat {
    pub fn new(path: Option<String>) -> Self {
        Stat { path }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Stat
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let stripped = path::strip_options(self.path.as_deref().unwrap_or("")).to_string();
        let target = if stripped.is_empty() { String::from(".") } else { stripped };

        let (storage, user, resolved) = {
            let session = args.session.lock().await;
            (session.storage.clone(), session.user.clone(), session.resolve(&target))
        };

        match datachan::directory_lines(&storage, current_user(&user)?, &resolved, true, &args.listing, &args.resolver).await {
            Ok(lines) => {
                let mut all = vec![String::from("Status follows")];
                all.extend(lines);
                all.push(String::from("End of status"));
                Ok(Reply::new_multiline(ReplyCode::FileStatus, all))
            }
            Err(e) => Ok(fs_error_reply(&e)),
        }
    }
}
