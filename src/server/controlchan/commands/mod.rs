//! One handler per supported command, in the dispatch order of the control
//! loop's primary handler.

mod acct;
mod allo;
mod auth;
mod cdup;
mod cwd;
mod dele;
mod eprt;
mod epsv;
mod feat;
mod mdtm;
mod mkd;
mod noop;
mod opts;
mod pass;
mod pasv;
mod pbsz;
mod port;
mod prot;
mod pwd;
mod quit;
mod rmd;
mod rnfr;
mod rnto;
mod size;
mod stat;
mod syst;
mod type_;
mod user;

pub use acct::Acct;
pub use allo::Allo;
pub use auth::{Auth, AuthParam};
pub use cdup::Cdup;
pub use cwd::Cwd;
pub use dele::Dele;
pub use eprt::Eprt;
pub use epsv::Epsv;
pub use feat::Feat;
pub use mdtm::Mdtm;
pub use mkd::Mkd;
pub use noop::Noop;
pub use opts::Opts;
pub use pass::Pass;
pub use pasv::Pasv;
pub use pbsz::Pbsz;
pub use port::Port;
pub use prot::{Prot, ProtParam};
pub use pwd::Pwd;
pub use quit::Quit;
pub use rmd::Rmd;
pub use rnfr::Rnfr;
pub use rnto::Rnto;
pub use size::Size;
pub use stat::Stat;
pub use syst::Syst;
pub use type_::{Type, TypeParam};
pub use user::User;

use super::{ControlChanError, ControlChanErrorKind, Reply, ReplyCode};
use crate::storage;
use std::sync::Arc;

// Maps a storage back-end refusal onto the FTP reply for it.
pub(crate) fn fs_error_reply(err: &storage::Error) -> Reply {
    use storage::ErrorKind::*;
    match err.kind() {
        PermanentFileNotAvailable => Reply::new(ReplyCode::FileError, "File or directory not found"),
        PermissionDenied => Reply::new(ReplyCode::FileError, "Permission denied"),
        TransientFileNotAvailable => Reply::new(ReplyCode::TransientFileError, "File temporarily unavailable"),
        FileNameNotAllowed => Reply::new(ReplyCode::BadFileName, "File name not allowed"),
        InsufficientStorageSpace => Reply::new(ReplyCode::OutOfSpace, "Insufficient storage space"),
        ExceededStorageAllocation => Reply::new(ReplyCode::ExceededStorageAllocation, "Exceeded storage allocation"),
        LocalError => Reply::new(ReplyCode::LocalError, "Local error"),
    }
}

// The user field is always present behind the auth gate; this turns the
// illegal state into an error instead of a panic.
pub(crate) fn current_user<User>(user: &Arc<Option<User>>) -> Result<&User, ControlChanError> {
    match user.as_ref() {
        Some(u) => Ok(u),
        None => Err(ControlChanError::new(ControlChanErrorKind::InternalServerError)),
    }
}
