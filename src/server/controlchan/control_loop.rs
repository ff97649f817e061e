//! The per-session control loop: reads commands, runs them through the
//! dispatch gates, writes replies, and drives transfers and the AUTH TLS
//! upgrade in strict sequence.

use crate::{
    auth::{Authenticator, UserDetail},
    notification::{DataListener, PresenceEvent, PresenceListener},
    server::{
        controlchan::{
            auth::AuthMiddleware,
            codecs::FtpCodec,
            command::Command,
            commands,
            error::{ControlChanError, ControlChanErrorKind},
            handler::{CommandContext, CommandHandler},
            log::LoggingMiddleware,
            middleware::ControlChanMiddleware,
            tlsgate::TlsOnlyMiddleware,
            whitelist::CommandWhitelistMiddleware,
            Reply, ReplyCode,
        },
        datachan::{self, DataChanParams},
        ftpserver::options::{ListingConfig, NameResolver, PassiveHost},
        io::PrefixedStream,
        passive::PassivePool,
        session::{SharedSession, Session},
        tls::{self, FtpsConfig},
    },
    storage::{Metadata, StorageBackend},
};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::Mutex,
};
use tokio_util::codec::{Decoder, Framed};

trait AsyncReadAsyncWriteSendUnpin: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncReadAsyncWriteSendUnpin for T {}

pub struct Config<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    pub storage: Arc<Storage>,
    pub greeting: &'static str,
    pub authenticator: Arc<dyn Authenticator<User>>,
    pub passive_pool: PassivePool,
    pub passive_host: PassiveHost,
    pub ftps_config: FtpsConfig,
    pub tls_only: bool,
    pub allowed_commands: Option<Arc<HashSet<String>>>,
    pub use_read_file: bool,
    pub use_write_file: bool,
    pub upload_max_slurp_size: usize,
    pub listing: Arc<ListingConfig>,
    pub resolver: Arc<dyn NameResolver>,
    pub data_listener: Arc<dyn DataListener>,
    pub presence_listener: Arc<dyn PresenceListener>,
    pub idle_session_timeout: Duration,
    pub logger: slog::Logger,
}

/// Takes over a freshly accepted control connection: sends the greeting and
/// spawns the command loop for it.
pub async fn spawn<Storage, User>(config: Config<Storage, User>, tcp_stream: TcpStream) -> Result<(), ControlChanError>
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    let source = tcp_stream.peer_addr()?;
    let local_addr = tcp_stream.local_addr()?;

    let session: Session<Storage, User> = Session::new(config.storage.clone(), source).ftps(config.ftps_config.clone());
    let logger = config
        .logger
        .new(slog::o!("trace-id" => format!("{}", session.trace_id), "source" => format!("{}", source)));
    let shared_session: SharedSession<Storage, User> = Arc::new(Mutex::new(session));

    let event_chain = PrimaryEventHandler {
        logger: logger.clone(),
        session: shared_session.clone(),
        authenticator: config.authenticator.clone(),
        tls_configured: config.ftps_config.is_on(),
        tls_only: config.tls_only,
        passive_pool: config.passive_pool.clone(),
        passive_host: config.passive_host,
        local_addr,
        listing: config.listing.clone(),
        resolver: config.resolver.clone(),
        data_listener: config.data_listener.clone(),
        presence_listener: config.presence_listener.clone(),
    };

    let event_chain = AuthMiddleware {
        session: shared_session.clone(),
        next: event_chain,
    };

    let event_chain = TlsOnlyMiddleware {
        session: shared_session.clone(),
        tls_only: config.tls_only,
        next: event_chain,
    };

    let event_chain = CommandWhitelistMiddleware {
        allowed_commands: config.allowed_commands.clone(),
        next: event_chain,
    };

    let mut event_chain = LoggingMiddleware {
        logger: logger.clone(),
        sequence_nr: 0,
        next: event_chain,
    };

    let datachan_params = DataChanParams {
        logger: logger.clone(),
        session: shared_session.clone(),
        ftps_config: config.ftps_config.clone(),
        use_read_file: config.use_read_file,
        use_write_file: config.use_write_file,
        upload_max_slurp_size: config.upload_max_slurp_size,
        listing: config.listing.clone(),
        resolver: config.resolver.clone(),
        data_listener: config.data_listener.clone(),
    };

    let codec = FtpCodec::new();
    let cmd_and_reply_stream: Framed<Box<dyn AsyncReadAsyncWriteSendUnpin>, FtpCodec> = codec.framed(Box::new(tcp_stream));
    let (mut reply_sink, mut command_source) = cmd_and_reply_stream.split();

    reply_sink.send(Reply::new(ReplyCode::ServiceReady, config.greeting)).await?;
    reply_sink.flush().await?;

    {
        let mut session = shared_session.lock().await;
        let meta = session.event_meta();
        drop(session);
        config.presence_listener.receive_presence_event(PresenceEvent::Connected, meta).await;
    }

    let ftps_config = config.ftps_config.clone();
    let presence_listener = config.presence_listener.clone();
    let idle_session_timeout = config.idle_session_timeout;

    tokio::spawn(async move {
        slog::info!(logger, "Starting control loop");
        loop {
            let incoming = {
                let mut timeout_delay = Box::pin(tokio::time::sleep(idle_session_timeout));
                tokio::select! {
                    cmd_result = command_source.next() => cmd_result,
                    _ = &mut timeout_delay => Some(Err(ControlChanError::new(ControlChanErrorKind::ControlChannelTimeout))),
                }
            };
            let incoming = match incoming {
                // EOF: the client hung up.
                None => break,
                Some(incoming) => incoming,
            };

            match incoming {
                Ok(cmd) => {
                    if shared_session.lock().await.has_quit {
                        continue;
                    }

                    let is_transfer = cmd.is_transfer();
                    let reply = match event_chain.handle(cmd.clone()).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            slog::warn!(logger, "Command handler error: {:?}. Closing control connection", e);
                            break;
                        }
                    };

                    if is_transfer && matches!(reply, Reply::None) {
                        // The gates let the transfer through; the data
                        // channel coordinator now owns the reply sequence.
                        if let Err(e) = datachan::execute(&datachan_params, &mut reply_sink, cmd).await {
                            slog::warn!(logger, "Could not send transfer reply to client: {:?}", e);
                            break;
                        }
                        continue;
                    }

                    if reply_sink.send(reply).await.is_err() {
                        slog::warn!(logger, "Could not send reply to client");
                        break;
                    }

                    let (upgrade, close) = {
                        let mut session = shared_session.lock().await;
                        let upgrade = session.pending_tls_upgrade;
                        session.pending_tls_upgrade = false;
                        (upgrade, session.close_after_reply)
                    };

                    if upgrade {
                        slog::info!(logger, "Upgrading control channel to TLS");

                        // Get back the original stream, keeping whatever
                        // the codec already read ahead: those bytes belong
                        // to the TLS handshake.
                        let framed = match reply_sink.reunite(command_source) {
                            Ok(framed) => framed,
                            Err(_) => {
                                slog::error!(logger, "Could not reunite control channel halves");
                                break;
                            }
                        };
                        let parts = framed.into_parts();
                        let io = PrefixedStream::new(parts.read_buf, parts.io);

                        match tls::upgrade(io, &ftps_config).await {
                            Ok((stream, authorized)) => {
                                slog::info!(logger, "Control channel now secure"; "authorized" => authorized);
                                {
                                    let mut session = shared_session.lock().await;
                                    session.cmd_tls = true;
                                }
                                let io: Box<dyn AsyncReadAsyncWriteSendUnpin> = Box::new(stream);
                                let (sink, src) = FtpCodec::new().framed(io).split();
                                reply_sink = sink;
                                command_source = src;
                            }
                            Err(e) => {
                                slog::warn!(logger, "Closing control channel. Could not upgrade to TLS: {}", e);
                                break;
                            }
                        }
                    }

                    if close {
                        break;
                    }
                }
                Err(e) => {
                    let (reply, close_connection) = handle_control_channel_error(&logger, e);
                    if reply_sink.send(reply).await.is_err() {
                        slog::warn!(logger, "Could not send error reply to client");
                        break;
                    }
                    if close_connection {
                        break;
                    }
                }
            }
        }

        let meta = {
            let mut session = shared_session.lock().await;
            session.reset_data_chan();
            if session.username.is_some() {
                Some(session.event_meta())
            } else {
                None
            }
        };
        if let Some(meta) = meta {
            presence_listener.receive_presence_event(PresenceEvent::LoggedOut, meta).await;
        }
        slog::info!(logger, "Exiting control loop");
    });

    Ok(())
}

// Gets the reply to be sent to the client and tells if the connection
// should be closed afterwards.
fn handle_control_channel_error(logger: &slog::Logger, error: ControlChanError) -> (Reply, bool) {
    slog::warn!(logger, "Control channel error: {}", error);
    match error.kind() {
        ControlChanErrorKind::UnknownCommand { .. } => (Reply::new(ReplyCode::CommandNotImplemented, "Command not implemented."), false),
        ControlChanErrorKind::InvalidCommand => (Reply::new(ReplyCode::ParameterSyntaxError, "Invalid parameter"), false),
        ControlChanErrorKind::UnsupportedProtocolFamily => (Reply::new(ReplyCode::ProtocolNotSupported, "Network protocol not supported, use (1)"), false),
        ControlChanErrorKind::Utf8Error => (Reply::new(ReplyCode::CommandSyntaxError, "Invalid UTF8 in command"), true),
        ControlChanErrorKind::ControlChannelTimeout => (
            Reply::new(ReplyCode::ServiceNotAvailable, "Session timed out. Closing control connection"),
            true,
        ),
        _ => (Reply::new(ReplyCode::LocalError, "Unknown internal server error, please try again later"), true),
    }
}

struct PrimaryEventHandler<Storage, User>
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    logger: slog::Logger,
    session: SharedSession<Storage, User>,
    authenticator: Arc<dyn Authenticator<User>>,
    tls_configured: bool,
    tls_only: bool,
    passive_pool: PassivePool,
    passive_host: PassiveHost,
    local_addr: SocketAddr,
    listing: Arc<ListingConfig>,
    resolver: Arc<dyn NameResolver>,
    data_listener: Arc<dyn DataListener>,
    presence_listener: Arc<dyn PresenceListener>,
}

#[async_trait]
impl<Storage, User> ControlChanMiddleware for PrimaryEventHandler<Storage, User>
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    async fn handle(&mut self, cmd: Command) -> Result<Reply, ControlChanError> {
        if cmd.requires_data_chan() {
            let session = self.session.lock().await;
            if session.data_chan.is_none() {
                return Ok(Reply::new(ReplyCode::CantOpenDataConnection, "Use PORT or PASV first."));
            }
        }
        // Transfer commands run in the data channel coordinator, driven by
        // the control loop after the gates let them through.
        if cmd.is_transfer() {
            return Ok(Reply::none());
        }

        let args = CommandContext {
            session: self.session.clone(),
            authenticator: self.authenticator.clone(),
            tls_configured: self.tls_configured,
            tls_only: self.tls_only,
            passive_pool: self.passive_pool.clone(),
            passive_host: self.passive_host,
            local_addr: self.local_addr,
            listing: self.listing.clone(),
            resolver: self.resolver.clone(),
            data_listener: self.data_listener.clone(),
            presence_listener: self.presence_listener.clone(),
            logger: self.logger.clone(),
        };

        let handler: Box<dyn CommandHandler<Storage, User>> = match cmd {
            Command::User { username } => Box::new(commands::User::new(username)),
            Command::Pass { password } => Box::new(commands::Pass::new(password)),
            Command::Acct => Box::new(commands::Acct),
            Command::Syst => Box::new(commands::Syst),
            Command::Stat { path } => Box::new(commands::Stat::new(path)),
            Command::Type { param } => Box::new(commands::Type::new(param)),
            Command::Noop => Box::new(commands::Noop),
            Command::Pasv => Box::new(commands::Pasv),
            Command::Epsv => Box::new(commands::Epsv),
            Command::Port { addr } => Box::new(commands::Port::new(addr)),
            Command::Eprt { addr } => Box::new(commands::Eprt::new(addr)),
            Command::Feat => Box::new(commands::Feat),
            Command::Pwd => Box::new(commands::Pwd),
            Command::Cwd { path } => Box::new(commands::Cwd::new(path)),
            Command::Cdup => Box::new(commands::Cdup),
            Command::Opts { params } => Box::new(commands::Opts::new(params)),
            Command::Dele { path } => Box::new(commands::Dele::new(path)),
            Command::Rmd { path } => Box::new(commands::Rmd::new(path)),
            Command::Mkd { path } => Box::new(commands::Mkd::new(path)),
            Command::Quit => Box::new(commands::Quit),
            Command::Allo => Box::new(commands::Allo),
            Command::Rnfr { path } => Box::new(commands::Rnfr::new(path)),
            Command::Rnto { path } => Box::new(commands::Rnto::new(path)),
            Command::Auth { protocol } => Box::new(commands::Auth::new(protocol)),
            Command::Pbsz { size } => Box::new(commands::Pbsz::new(size)),
            Command::Prot { param } => Box::new(commands::Prot::new(param)),
            Command::Size { path } => Box::new(commands::Size::new(path)),
            Command::Mdtm { path } => Box::new(commands::Mdtm::new(path)),
            Command::Retr { .. } | Command::Stor { .. } | Command::Appe { .. } | Command::List { .. } | Command::Nlst { .. } => {
                return Err(ControlChanError::new(ControlChanErrorKind::InternalServerError));
            }
        };

        handler.handle(args).await
    }
}
