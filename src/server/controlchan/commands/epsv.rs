//! The RFC 2428 Extended Passive Mode (`EPSV`) command

use crate::{
    auth::UserDetail,
    server::{
        controlchan::{
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        passive,
        session::DataChan,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

#[derive(Debug)]
pub struct Epsv;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Epsv
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        if session.data_chan.is_some() {
            return Ok(Reply::new(ReplyCode::BadCommandSequence, "Bad sequence of commands."));
        }

        let remote = passive::canonical_ip(session.source.ip());
        match args.passive_pool.reserve(remote).await {
            Ok(conn) => {
                let port = conn.port();
                session.data_chan = Some(DataChan::Passive(conn));
                Ok(Reply::new_with_string(
                    ReplyCode::EnteringExtendedPassiveMode,
                    format!("Entering Extended Passive Mode (|||{}|)", port),
                ))
            }
            Err(e) => {
                slog::warn!(args.logger, "Could not reserve a passive port: {}", e);
                Ok(Reply::new(
                    ReplyCode::ServiceNotAvailable,
                    "Server was unable to open passive connection listener",
                ))
            }
        }
    }
}
