//! The RFC 2389 Feature (`FEAT`) command

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
pub struct Feat;

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Feat
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut lines = vec!["Features:".to_string(), " SIZE".to_string(), " UTF8".to_string(), " MDTM".to_string()];
        if args.tls_configured {
            lines.push(" AUTH TLS".to_string());
            lines.push(" PBSZ".to_string());
            lines.push(" PROT".to_string());
        }
        lines.push("End".to_string());
        Ok(Reply::new_multiline(ReplyCode::SystemStatus, lines))
    }
}
