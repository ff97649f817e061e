//! The RFC 959 Representation Type (`TYPE`) command
//
// Transfers are always stream-of-bytes; the selected type only changes the
// wording of the 150 reply.

use crate::{
    auth::UserDetail,
    server::{
        controlchan::{
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        session::TransferMode,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;

/// The parameter that can be given to the `TYPE` command.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TypeParam {
    Ascii,
    Image,
    Other,
}

#[derive(Debug)]
pub struct Type {
    param: TypeParam,
}

impl Type {
    pub fn new(param: TypeParam) -> Self {
        Type { param }
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Type
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError> {
        let mut session = args.session.lock().await;
        match self.param {
            TypeParam::Ascii => {
                session.transfer_mode = TransferMode::Ascii;
                Ok(Reply::new(ReplyCode::CommandOkay, "Switching to ASCII mode"))
            }
            TypeParam::Image => {
                session.transfer_mode = TransferMode::Image;
                Ok(Reply::new(ReplyCode::CommandOkay, "Switching to Binary mode"))
            }
            TypeParam::Other => Ok(Reply::new(ReplyCode::CommandOkayNotImplemented, "Not supported")),
        }
    }
}
