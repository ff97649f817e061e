//! The RFC 959 Password (`PASS`) command

use crate::{
    auth::UserDetail,
    notification::{PresenceEvent, PresenceListener},
    server::{
        controlchan::{
            error::{ControlChanError, ControlChanErrorKind},
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        password::Password,
        path,
        session::SessionState,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct Pass {
    password: Password,
}

impl Pass {
    pub fn new(password: Password) -> Self {
        Pass { password }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Pass
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let (state, username) = {
            let session = args.session.lock().await;
            (session.state, session.username.clone())
        };
        if state != SessionState::WaitPass {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "Bad sequence of commands."));
        }
        let username = username.ok_or_else(|| ControlChanError::new(ControlChanErrorKind::InternalServerError))?;

        match args.authenticator.authenticate(&username, self.password.as_str()).await {
            Ok(user) => {
                let root = user.home().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
                let cwd = path::with_cwd(Path::new("/"), &user.initial_cwd().to_string_lossy());

                let mut session = args.session.lock().await;
                session.root = root;
                session.cwd = cwd;

                // The starting directory must exist, otherwise the login
                // hooks gave us a session we cannot serve.
                let start_dir = session.resolve(".");
                let storage = session.storage.clone();
                match storage.metadata(&user, &start_dir).await {
                    Ok(meta) if meta.is_dir() => {
                        session.user = Arc::new(Some(user));
                        session.state = SessionState::WaitCmd;
                        let event_meta = session.event_meta();
                        drop(session);

                        args.presence_listener.receive_presence_event(PresenceEvent::LoggedIn, event_meta).await;
                        Ok(Reply::new(ReplyCode::UserLoggedIn, "User logged in, proceed."))
                    }
                    _ => {
                        slog::warn!(args.logger, "Initial directory {:?} not usable for user {}", start_dir, username);
                        session.close_after_reply = true;
                        Ok(Reply::new(ReplyCode::ServiceNotAvailable, "Service not available, closing control connection."))
                    }
                }
            }
            Err(e) => {
                slog::info!(args.logger, "Authentication failed for user {}: {}", username, e);
                let mut session = args.session.lock().await;
                session.state = SessionState::New;
                session.username = None;
                Ok(Reply::new(ReplyCode::NotLoggedIn, "Authentication failed"))
            }
        }
    }
}
