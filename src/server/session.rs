//! The session module implements the per-connection session state that the
//! control channel state machine and the data channel coordinator share.

use super::passive::PassiveDataConn;
use super::tls::FtpsConfig;
use crate::auth::UserDetail;
use crate::notification::EventMeta;
use crate::storage::{Metadata, StorageBackend};
use std::fmt::Formatter;
use std::net::{SocketAddr, SocketAddrV4};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};

// TraceId is an identifier used to correlate log statements together.
#[derive(PartialEq, Eq, Debug)]
pub struct TraceId(u64);

impl TraceId {
    pub fn new() -> Self {
        TraceId(rand::random())
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SessionState {
    // Nothing authenticated yet.
    New,
    // A USER was accepted, the PASS for it is outstanding.
    WaitPass,
    // Logged in.
    WaitCmd,
}

// The TYPE the client selected. Transfers are always stream-of-bytes; the
// selected type only shows up in the text of the 150 reply.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TransferMode {
    Ascii,
    Image,
}

impl TransferMode {
    pub fn name(&self) -> &'static str {
        match self {
            TransferMode::Ascii => "ASCII",
            TransferMode::Image => "BINARY",
        }
    }
}

// The data channel sub-state. `None` on the session means neither PORT nor
// PASV was received since the last transfer; receiving either moves to the
// corresponding variant and the other family is refused with 503 until a
// transfer completes.
pub enum DataChan {
    // PORT/EPRT was received: we dial out to this address at transfer time.
    Active { addr: SocketAddrV4 },
    // PASV/EPSV was received: a listener slot is reserved, the client may
    // or may not have dialled in yet.
    Passive(PassiveDataConn),
}

impl Debug for DataChan {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            DataChan::Active { addr } => write!(f, "Active({})", addr),
            DataChan::Passive(conn) => write!(f, "Passive(port {})", conn.port()),
        }
    }
}

// The session shared via an asynchronous lock
pub type SharedSession<S, U> = Arc<tokio::sync::Mutex<Session<S, U>>>;

// This is where we keep the state for an FTP session.
#[derive(Debug)]
pub struct Session<Storage, User>
where
    Storage: StorageBackend<User>,
    Storage::Metadata: Metadata,
    User: UserDetail,
{
    // Used to correlate log statements of one session; not a key into
    // anything.
    pub trace_id: TraceId,
    // Extra information about the logged in user, like account details.
    pub user: Arc<Option<User>>,
    // The username used to log in. None if not logged in.
    pub username: Option<String>,
    pub storage: Arc<Storage>,
    // The address of the control connection peer. Its IP is the only one a
    // passive data connection will be accepted from.
    pub source: SocketAddr,
    // The root all paths of this session resolve under, installed at login
    // from the user's home. A path inside the storage back-end.
    pub root: PathBuf,
    // The working directory, always a normalised absolute path below root.
    pub cwd: PathBuf,
    // After a RNFR command this holds the source path for the RNTO command.
    pub rename_from: Option<PathBuf>,
    pub state: SessionState,
    // Tells if FTPS/TLS security is available to the session or not. The
    // cmd_tls and data_tls fields tell if the channels are actually
    // encrypted at the moment.
    pub ftps_config: FtpsConfig,
    // True once AUTH TLS upgraded the control channel. Never goes back to
    // false.
    pub cmd_tls: bool,
    // True if PROT P switched the data channel to TLS.
    pub data_tls: bool,
    // A PBSZ must precede PROT; this remembers seeing one.
    pub pbsz_received: bool,
    pub transfer_mode: TransferMode,
    // The data channel sub-state, None between transfers.
    pub data_chan: Option<DataChan>,
    // Set by QUIT: any further input is dropped and the control loop exits
    // after flushing the reply.
    pub has_quit: bool,
    // Set by handlers that want the control connection closed after their
    // reply went out (QUIT, fatal 421s).
    pub close_after_reply: bool,
    // Set by the AUTH handler; the control loop performs the handshake
    // after sending the 234 reply.
    pub pending_tls_upgrade: bool,
    // Counts emitted notification events.
    event_sequence: u64,
}

impl<Storage, User: UserDetail + 'static> Session<Storage, User>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    pub(super) fn new(storage: Arc<Storage>, source: SocketAddr) -> Self {
        Session {
            trace_id: TraceId::new(),
            user: Arc::new(None),
            username: None,
            storage,
            source,
            root: PathBuf::from("/"),
            cwd: PathBuf::from("/"),
            rename_from: None,
            state: SessionState::New,
            ftps_config: FtpsConfig::Off,
            cmd_tls: false,
            data_tls: false,
            pbsz_received: false,
            transfer_mode: TransferMode::Image,
            data_chan: None,
            has_quit: false,
            close_after_reply: false,
            pending_tls_upgrade: false,
            event_sequence: 0,
        }
    }

    pub fn ftps(mut self, mode: FtpsConfig) -> Self {
        self.ftps_config = mode;
        self
    }

    pub fn authenticated(&self) -> bool {
        self.state == SessionState::WaitCmd
    }

    /// Resolves a client supplied path against root and cwd into the path
    /// handed to the storage back-end.
    pub fn resolve(&self, arg: &str) -> PathBuf {
        let virtual_path = super::path::with_cwd(&self.cwd, arg);
        if self.root == Path::new("/") {
            virtual_path
        } else {
            // root is absolute, virtual_path too; splice them textually.
            let mut out = self.root.clone();
            for c in virtual_path.components().skip(1) {
                out.push(c);
            }
            out
        }
    }

    // Drops the data channel sub-state so the next PASV/PORT is accepted
    // again. Called on every transfer termination.
    pub fn reset_data_chan(&mut self) {
        self.data_chan = None;
    }

    pub fn event_meta(&mut self) -> EventMeta {
        self.event_sequence += 1;
        EventMeta {
            username: self.username.clone().unwrap_or_else(|| String::from("unknown")),
            trace_id: format!("{}", self.trace_id),
            sequence_number: self.event_sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DefaultUser;
    use crate::storage::Filesystem;
    use pretty_assertions::assert_eq;

    fn session() -> Session<Filesystem, DefaultUser> {
        Session::new(Arc::new(Filesystem::new("/tmp")), "127.0.0.1:21".parse().unwrap())
    }

    #[test]
    fn resolve_against_cwd() {
        let mut s = session();
        s.cwd = PathBuf::from("/sub");
        assert_eq!(s.resolve("file.txt"), PathBuf::from("/sub/file.txt"));
        assert_eq!(s.resolve("/other.txt"), PathBuf::from("/other.txt"));
        assert_eq!(s.resolve("../up.txt"), PathBuf::from("/up.txt"));
    }

    #[test]
    fn resolve_with_user_root() {
        let mut s = session();
        s.root = PathBuf::from("/home/alice");
        s.cwd = PathBuf::from("/docs");
        assert_eq!(s.resolve("a.txt"), PathBuf::from("/home/alice/docs/a.txt"));
        assert_eq!(s.resolve("/b.txt"), PathBuf::from("/home/alice/b.txt"));
        // dotdot cannot escape the user root
        assert_eq!(s.resolve("../../../../c.txt"), PathBuf::from("/home/alice/c.txt"));
    }
}
