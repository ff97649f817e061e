//! Contains the code that makes up the FTP server: the front-end accepting
//! control connections, the per-session control channel state machine, the
//! data channel coordinator and the shared passive listener pool.

pub(crate) mod controlchan;
pub(crate) mod datachan;
pub(crate) mod ftpserver;
pub(crate) mod io;
pub(crate) mod passive;
pub(crate) mod password;
pub(crate) mod path;
pub(crate) mod session;
pub(crate) mod tls;
