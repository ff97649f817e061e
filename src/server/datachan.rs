//! Contains the data channel coordinator: pairs a transfer command with its
//! data socket (passive or active), and drives RETR/STOR/APPE/LIST/NLST
//! with the 150/226/4xx reply ordering the protocol wants.

use super::controlchan::{Command, ControlChanError, ControlChanErrorKind, Reply, ReplyCode};
use super::ftpserver::options::{FilenameSort, ListingConfig, NameResolver};
use super::path;
use super::session::{DataChan, SharedSession};
use super::tls::{self, FtpsConfig};
use crate::auth::UserDetail;
use crate::notification::{DataEvent, DataListener};
use crate::storage::{self, Fileinfo, Metadata, StorageBackend, WriteMode};
use chrono::{DateTime, Utc};
use futures_util::{future, stream, Sink, SinkExt, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

// When the uid/gid resolvers know no name for an id, listings show this.
const UNKNOWN_OWNER: &str = "ftp";

pub trait DataStream: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Sync + Unpin {}

impl<T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Sync + Unpin> DataStream for T {}

// Everything the transfer coordinator needs besides the command itself.
pub(crate) struct DataChanParams<Storage, User>
where
    Storage: StorageBackend<User>,
    Storage::Metadata: Metadata,
    User: UserDetail,
{
    pub logger: slog::Logger,
    pub session: SharedSession<Storage, User>,
    pub ftps_config: FtpsConfig,
    pub use_read_file: bool,
    pub use_write_file: bool,
    pub upload_max_slurp_size: usize,
    pub listing: Arc<ListingConfig>,
    pub resolver: Arc<dyn NameResolver>,
    pub data_listener: Arc<dyn DataListener>,
}

/// Runs one transfer command to completion. Every reply of the transfer
/// (150, 226, 425/426/550) goes out through `sink`; the returned error is
/// only for a dead control connection.
pub(crate) async fn execute<Storage, User, S>(params: &DataChanParams<Storage, User>, sink: &mut S, cmd: Command) -> Result<(), ControlChanError>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
    S: Sink<Reply, Error = ControlChanError> + Unpin + Send,
{
    match cmd {
        Command::Retr { path } => exec_retr(params, sink, path).await,
        Command::Stor { path } => exec_stor(params, sink, path, WriteMode::Create).await,
        Command::Appe { path } => exec_stor(params, sink, path, WriteMode::Append).await,
        Command::List { arg } => exec_list(params, sink, arg, true).await,
        Command::Nlst { arg } => exec_list(params, sink, arg, false).await,
        _ => Err(ControlChanError::new(ControlChanErrorKind::InternalServerError)),
    }
}

// Turns the session's data channel sub-state into a live socket: waits for
// the client on a passive slot, or dials out for active mode. Consuming the
// sub-state here is also what re-arms PASV/PORT for the next transfer.
async fn acquire<Storage, User>(
    session: &SharedSession<Storage, User>,
    ftps_config: &FtpsConfig,
    logger: &slog::Logger,
) -> Result<Box<dyn DataStream>, Reply>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
{
    let (chan, data_tls) = {
        let mut session = session.lock().await;
        (session.data_chan.take(), session.data_tls)
    };

    let stream: TcpStream = match chan {
        None => return Err(Reply::new(ReplyCode::CantOpenDataConnection, "Use PORT or PASV first.")),
        Some(DataChan::Active { addr }) => TcpStream::connect(addr).await.map_err(|e| {
            slog::warn!(logger, "Could not connect to active mode address {}: {}", addr, e);
            Reply::new(ReplyCode::CantOpenDataConnection, "Can't open data connection.")
        })?,
        Some(DataChan::Passive(conn)) => conn.wait_for_client().await.map_err(|e| {
            slog::warn!(logger, "Passive data connection failed: {}", e);
            Reply::new(ReplyCode::CantOpenDataConnection, "Can't open data connection.")
        })?,
    };

    if data_tls {
        let (stream, _authorized) = tls::upgrade(stream, ftps_config).await.map_err(|e| {
            slog::warn!(logger, "TLS handshake failed on data connection: {}", e);
            Reply::new(ReplyCode::CantOpenDataConnection, "Can't open data connection.")
        })?;
        Ok(Box::new(stream))
    } else {
        Ok(Box::new(stream))
    }
}

async fn emit<Storage, User>(params: &DataChanParams<Storage, User>, event: DataEvent)
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
{
    let meta = {
        let mut session = params.session.lock().await;
        session.event_meta()
    };
    params.data_listener.receive_data_event(event, meta).await;
}

enum RetrSource {
    Stream(Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>),
    Buffer(Vec<u8>),
}

async fn exec_retr<Storage, User, S>(params: &DataChanParams<Storage, User>, sink: &mut S, arg: String) -> Result<(), ControlChanError>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
    S: Sink<Reply, Error = ControlChanError> + Unpin + Send,
{
    let (storage, user, resolved, mode_name) = {
        let session = params.session.lock().await;
        (
            session.storage.clone(),
            session.user.clone(),
            session.resolve(&arg),
            session.transfer_mode.name(),
        )
    };
    let user = match user.as_ref() {
        Some(u) => u,
        None => return Err(ControlChanError::new(ControlChanErrorKind::InternalServerError)),
    };
    let display_path = resolved.to_string_lossy().to_string();

    // The source file is reported on before the data channel is touched; a
    // missing file never produces data channel activity.
    let bytes_expected = storage.metadata(user, &resolved).await.ok().map(|m| m.len());
    let source = if params.use_read_file {
        storage.read_file(user, &resolved).await.map(RetrSource::Buffer)
    } else {
        storage.get(user, &resolved).await.map(RetrSource::Stream)
    };
    let source = match source {
        Ok(source) => source,
        Err(e) => {
            let reply = match e.kind() {
                storage::ErrorKind::PermanentFileNotAvailable => Reply::new(ReplyCode::FileError, "Not Found"),
                _ => Reply::new(ReplyCode::FileError, "Not Accessible"),
            };
            return sink.send(reply).await;
        }
    };

    let mut socket = match acquire(&params.session, &params.ftps_config, &params.logger).await {
        Ok(socket) => socket,
        Err(reply) => {
            emit(
                params,
                DataEvent::RetrFailed {
                    path: display_path,
                    error: String::from("no data connection"),
                },
            )
            .await;
            return sink.send(reply).await;
        }
    };

    sink.send(Reply::new_with_string(
        ReplyCode::FileStatusOkay,
        format!("Opening {} mode data connection", mode_name),
    ))
    .await?;
    emit(
        params,
        DataEvent::RetrStarted {
            path: display_path.clone(),
            bytes_expected,
        },
    )
    .await;

    let started = Instant::now();
    let copied: std::io::Result<u64> = match source {
        RetrSource::Stream(mut reader) => tokio::io::copy(&mut reader, &mut socket).await,
        RetrSource::Buffer(buf) => socket.write_all(&buf).await.map(|_| buf.len() as u64),
    };

    match copied {
        Ok(bytes) => {
            if let Err(e) = socket.shutdown().await {
                slog::warn!(params.logger, "Could not shutdown data socket after RETR: {}", e);
            }
            drop(socket);
            sink.send(Reply::new_with_string(
                ReplyCode::ClosingDataConnection,
                format!("Closing data connection, sent {} bytes", bytes),
            ))
            .await?;
            emit(
                params,
                DataEvent::Got {
                    path: display_path,
                    bytes,
                    duration: started.elapsed(),
                },
            )
            .await;
        }
        Err(e) => {
            slog::warn!(params.logger, "Error copying stream during RETR: {}", e);
            sink.send(Reply::new(ReplyCode::ConnectionClosed, "Connection closed; transfer aborted."))
                .await?;
            emit(
                params,
                DataEvent::RetrFailed {
                    path: display_path,
                    error: e.to_string(),
                },
            )
            .await;
        }
    }
    Ok(())
}

async fn exec_stor<Storage, User, S>(params: &DataChanParams<Storage, User>, sink: &mut S, arg: String, mode: WriteMode) -> Result<(), ControlChanError>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
    S: Sink<Reply, Error = ControlChanError> + Unpin + Send,
{
    let (storage, user, resolved) = {
        let session = params.session.lock().await;
        (session.storage.clone(), session.user.clone(), session.resolve(&arg))
    };
    let user = match user.as_ref() {
        Some(u) => u,
        None => return Err(ControlChanError::new(ControlChanErrorKind::InternalServerError)),
    };
    let display_path = resolved.to_string_lossy().to_string();

    sink.send(Reply::new(ReplyCode::FileStatusOkay, "Ok to send data")).await?;

    let socket = match acquire(&params.session, &params.ftps_config, &params.logger).await {
        Ok(socket) => socket,
        Err(reply) => {
            emit(
                params,
                DataEvent::StorFailed {
                    path: display_path,
                    error: String::from("no data connection"),
                },
            )
            .await;
            return sink.send(reply).await;
        }
    };
    emit(params, DataEvent::StorStarted { path: display_path.clone() }).await;

    let started = Instant::now();
    // Backpressure comes for free here: both copy paths read from the
    // socket no faster than the back-end accepts writes.
    let stored: Result<u64, storage::Error> = if params.use_write_file {
        match slurp(socket, params.upload_max_slurp_size).await {
            Ok(Slurped::All(buf)) => storage.write_file(user, buf, &resolved, mode).await,
            Ok(Slurped::Overflow(buf, rest)) => {
                let input = std::io::Cursor::new(buf).chain(rest);
                storage.put(user, input, &resolved, mode).await
            }
            Err(e) => Err(storage::Error::new(storage::ErrorKind::LocalError, e)),
        }
    } else {
        storage.put(user, socket, &resolved, mode).await
    };

    match stored {
        Ok(bytes) => {
            sink.send(Reply::new(ReplyCode::ClosingDataConnection, "Closing data connection")).await?;
            emit(
                params,
                DataEvent::Put {
                    path: display_path,
                    bytes,
                    duration: started.elapsed(),
                },
            )
            .await;
        }
        Err(e) => {
            slog::warn!(params.logger, "Error writing upload: {}", e);
            sink.send(Reply::new(ReplyCode::ConnectionClosed, "Connection closed; transfer aborted."))
                .await?;
            emit(
                params,
                DataEvent::StorFailed {
                    path: display_path,
                    error: e.to_string(),
                },
            )
            .await;
        }
    }
    Ok(())
}

async fn exec_list<Storage, User, S>(params: &DataChanParams<Storage, User>, sink: &mut S, arg: Option<String>, long: bool) -> Result<(), ControlChanError>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail + 'static,
    S: Sink<Reply, Error = ControlChanError> + Unpin + Send,
{
    let stripped = path::strip_options(arg.as_deref().unwrap_or("")).to_string();
    let target = if stripped.is_empty() { String::from(".") } else { stripped };

    let (storage, user, resolved) = {
        let session = params.session.lock().await;
        (session.storage.clone(), session.user.clone(), session.resolve(&target))
    };
    let user = match user.as_ref() {
        Some(u) => u,
        None => return Err(ControlChanError::new(ControlChanErrorKind::InternalServerError)),
    };

    let lines = match directory_lines(&storage, user, &resolved, long, &params.listing, &params.resolver).await {
        Ok(lines) => lines,
        Err(e) => {
            slog::warn!(params.logger, "Could not list {:?}: {}", resolved, e);
            return sink.send(Reply::new(ReplyCode::TransientFileError, "Requested file action not taken")).await;
        }
    };

    let mut socket = match acquire(&params.session, &params.ftps_config, &params.logger).await {
        Ok(socket) => socket,
        Err(reply) => return sink.send(reply).await,
    };

    sink.send(Reply::new(ReplyCode::FileStatusOkay, "Here comes the directory listing")).await?;

    let mut payload = String::new();
    for line in &lines {
        payload.push_str(line);
        payload.push_str("\r\n");
    }

    match socket.write_all(payload.as_bytes()).await {
        Ok(()) => {
            if let Err(e) = socket.shutdown().await {
                slog::warn!(params.logger, "Could not shutdown data socket after LIST: {}", e);
            }
            drop(socket);
            sink.send(Reply::new(ReplyCode::ClosingDataConnection, "Transfer OK")).await?;
        }
        Err(e) => {
            slog::warn!(params.logger, "Error sending directory listing: {}", e);
            sink.send(Reply::new(ReplyCode::ConnectionClosed, "Connection closed; transfer aborted."))
                .await?;
        }
    }
    Ok(())
}

/// Expands, filters, sorts and formats a listing. The long form resolves
/// owner and group names with bounded concurrency; STAT reuses this over
/// the control channel.
pub(crate) async fn directory_lines<Storage, User>(
    storage: &Arc<Storage>,
    user: &User,
    path: &Path,
    long: bool,
    listing: &ListingConfig,
    resolver: &Arc<dyn NameResolver>,
) -> Result<Vec<String>, storage::Error>
where
    Storage: StorageBackend<User>,
    Storage::Metadata: Metadata,
    User: UserDetail,
{
    let mut entries = path::glob(storage, user, path).await?;

    if listing.hide_dot_files {
        entries.retain(|fi| !fi.file_name().starts_with('.'));
    }

    match &listing.sort {
        FilenameSort::Unsorted => {}
        FilenameSort::CaseFolded => entries.sort_by_key(|fi| fi.file_name().to_lowercase()),
        FilenameSort::KeyedBy(map) => {
            let map = map.as_ref();
            entries.sort_by_key(|fi| map(&fi.file_name()));
        }
        FilenameSort::CompareWith(cmp) => {
            let cmp = cmp.as_ref();
            entries.sort_by(|a, b| cmp(&a.file_name(), &b.file_name()));
        }
    }

    if !long {
        return Ok(entries.iter().map(Fileinfo::file_name).collect());
    }

    let uids: BTreeSet<u32> = entries.iter().map(|fi| fi.metadata.uid()).collect();
    let gids: BTreeSet<u32> = entries.iter().map(|fi| fi.metadata.gid()).collect();
    let concurrency = listing.max_stats_at_once.max(1);

    let owners: HashMap<u32, String> = stream::iter(uids)
        .map(|uid| {
            let resolver = resolver.clone();
            async move { (uid, resolver.username_for_uid(uid).await) }
        })
        .buffer_unordered(concurrency)
        .filter_map(|(id, name)| future::ready(name.map(|n| (id, n))))
        .collect()
        .await;
    let groups: HashMap<u32, String> = stream::iter(gids)
        .map(|gid| {
            let resolver = resolver.clone();
            async move { (gid, resolver.group_for_gid(gid).await) }
        })
        .buffer_unordered(concurrency)
        .filter_map(|(id, name)| future::ready(name.map(|n| (id, n))))
        .collect()
        .await;

    Ok(entries
        .iter()
        .map(|fi| {
            let owner = owners.get(&fi.metadata.uid()).map(String::as_str).unwrap_or(UNKNOWN_OWNER);
            let group = groups.get(&fi.metadata.gid()).map(String::as_str).unwrap_or(UNKNOWN_OWNER);
            format_entry(fi, owner, group)
        })
        .collect())
}

// One long-form listing line:
// -rw-r--r-- 1 ftp ftp        12345 Aug  2 13:37 name
fn format_entry<M: Metadata>(fi: &Fileinfo<PathBuf, M>, owner: &str, group: &str) -> String {
    let file_type = if fi.metadata.is_dir() {
        'd'
    } else if fi.metadata.is_symlink() {
        'l'
    } else {
        '-'
    };
    let modified = fi
        .metadata
        .modified()
        .map(|m| DateTime::<Utc>::from(m).format("%b %e %H:%M").to_string())
        .unwrap_or_else(|_| String::from("Jan  1 00:00"));
    format!(
        "{}{} {} {} {} {:>12} {} {}",
        file_type,
        fi.metadata.permissions(),
        fi.metadata.links(),
        owner,
        group,
        fi.metadata.len(),
        modified,
        fi.file_name()
    )
}

enum Slurped {
    // The whole upload fit in the buffer.
    All(Vec<u8>),
    // The limit was hit; the buffered head plus the unread remainder.
    Overflow(Vec<u8>, Box<dyn DataStream>),
}

// Buffers the upload in memory, doubling the buffer on demand, until EOF or
// until the configured cap is reached.
async fn slurp(mut socket: Box<dyn DataStream>, limit: usize) -> std::io::Result<Slurped> {
    let mut buf: Vec<u8> = Vec::with_capacity(std::cmp::min(limit, 8 * 1024).max(1));
    loop {
        if buf.len() == buf.capacity() {
            if buf.capacity() >= limit {
                return Ok(Slurped::Overflow(buf, socket));
            }
            let grow = std::cmp::min(buf.capacity(), limit - buf.capacity());
            buf.reserve_exact(grow);
        }
        let n = socket.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(Slurped::All(buf));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Permissions;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, SystemTime};

    struct MockMetadata {
        dir: bool,
        size: u64,
    }

    impl Metadata for MockMetadata {
        fn len(&self) -> u64 {
            self.size
        }
        fn is_dir(&self) -> bool {
            self.dir
        }
        fn is_file(&self) -> bool {
            !self.dir
        }
        fn is_symlink(&self) -> bool {
            false
        }
        fn modified(&self) -> crate::storage::Result<SystemTime> {
            // 2021-03-07 13:37:00 UTC
            Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(1_615_124_220))
        }
        fn uid(&self) -> u32 {
            0
        }
        fn gid(&self) -> u32 {
            0
        }
        fn permissions(&self) -> Permissions {
            Permissions(0o644)
        }
    }

    #[test]
    fn long_listing_line_shape() {
        let fi = Fileinfo {
            path: PathBuf::from("/srv/hello.txt"),
            metadata: MockMetadata { dir: false, size: 512 },
        };
        let line = format_entry(&fi, "ftp", "ftp");
        assert_eq!(line, "-rw-r--r-- 1 ftp ftp          512 Mar  7 13:37 hello.txt");
    }

    #[test]
    fn long_listing_marks_directories() {
        let fi = Fileinfo {
            path: PathBuf::from("/srv/sub"),
            metadata: MockMetadata { dir: true, size: 4096 },
        };
        let line = format_entry(&fi, "alice", "staff");
        assert!(line.starts_with('d'));
        assert!(line.contains(" alice staff "));
    }

    #[tokio::test]
    async fn slurp_small_upload_fits() {
        let data: &[u8] = b"tiny upload";
        let socket: Box<dyn DataStream> = Box::new(std::io::Cursor::new(data.to_vec()));
        match slurp(socket, 1024).await.unwrap() {
            Slurped::All(buf) => assert_eq!(buf, data),
            Slurped::Overflow(..) => panic!("small upload should fit the slurp buffer"),
        }
    }

    #[tokio::test]
    async fn slurp_falls_back_when_limit_hit() {
        let data = vec![7u8; 100];
        let socket: Box<dyn DataStream> = Box::new(std::io::Cursor::new(data.clone()));
        match slurp(socket, 16).await.unwrap() {
            Slurped::All(_) => panic!("upload beyond the limit should overflow"),
            Slurped::Overflow(head, mut rest) => {
                assert_eq!(head.len(), 16);
                let mut tail = Vec::new();
                rest.read_to_end(&mut tail).await.unwrap();
                let mut whole = head;
                whole.extend_from_slice(&tail);
                assert_eq!(whole, data);
            }
        }
    }
}
