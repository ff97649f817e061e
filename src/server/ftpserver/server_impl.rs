use super::options::{
    self, FilenameSort, FilenameSortFunc, FilenameSortMap, ListingConfig, NameResolver, PassiveHost,
};
use crate::{
    auth::{AnonymousAuthenticator, Authenticator, DefaultUser, UserDetail},
    notification::{nop::NopListener, DataListener, PresenceListener},
    server::{
        controlchan,
        passive::PassivePool,
        tls::{self, FtpsConfig},
    },
    storage::{Filesystem, Metadata, StorageBackend},
};
use std::collections::HashSet;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// The TLS files the builder collected; turned into a rustls config when
// `listen` starts.
struct FtpsFiles {
    certs_file: PathBuf,
    key_file: PathBuf,
    client_ca_file: Option<PathBuf>,
}

/// An instance of an FTP(S) server. It contains a reference to an
/// [`Authenticator`] that will be used for authentication, and a
/// [`StorageBackend`] that will be used as the virtual file system.
///
/// The server can be started with the [`listen`](Server::listen) method.
///
/// # Example
///
/// ```no_run
/// use quayftp::Server;
///
/// let server = Server::with_fs_root("/srv/ftp")
///     .greeting("Welcome to my FTP server")
///     .passive_ports(50000..=50099);
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(server.listen("127.0.0.1:2121")).unwrap();
/// ```
///
/// [`Authenticator`]: crate::auth::Authenticator
/// [`StorageBackend`]: crate::storage::StorageBackend
pub struct Server<Storage, User>
where
    Storage: StorageBackend<User>,
    User: UserDetail,
{
    storage: Box<dyn (Fn() -> Storage) + Send + Sync>,
    greeting: &'static str,
    authenticator: Arc<dyn Authenticator<User>>,
    passive_ports: RangeInclusive<u16>,
    passive_host: PassiveHost,
    ftps: Option<FtpsFiles>,
    tls_only: bool,
    allow_unauthorized_tls: bool,
    allowed_commands: Option<Arc<HashSet<String>>>,
    use_read_file: bool,
    use_write_file: bool,
    upload_max_slurp_size: usize,
    listing: ListingConfig,
    resolver: Arc<dyn NameResolver>,
    data_listener: Arc<dyn DataListener>,
    presence_listener: Arc<dyn PresenceListener>,
    idle_session_timeout: Duration,
    logger: slog::Logger,
}

impl Server<Filesystem, DefaultUser> {
    /// Create a new `Server` serving the local filesystem below the given
    /// root, allowing anyone in.
    ///
    /// # Example
    ///
    /// ```rust
    /// use quayftp::Server;
    ///
    /// let server = Server::with_fs_root("/srv/ftp");
    /// ```
    pub fn with_fs_root<P: Into<PathBuf> + Send + 'static>(path: P) -> Self {
        let path = path.into();
        Server::new(Box::new(move || Filesystem::new(path.clone())))
    }
}

impl<Storage, User> Server<Storage, User>
where
    User: UserDetail + 'static,
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
{
    /// Construct a new [`Server`] with a factory for the given
    /// [`StorageBackend`]. The other parameters will be set to defaults.
    ///
    /// [`StorageBackend`]: crate::storage::StorageBackend
    pub fn new(storage: Box<dyn (Fn() -> Storage) + Send + Sync>) -> Self
    where
        AnonymousAuthenticator: Authenticator<User>,
    {
        Server {
            storage,
            greeting: options::DEFAULT_GREETING,
            authenticator: Arc::new(AnonymousAuthenticator {}),
            passive_ports: options::DEFAULT_PASSIVE_PORTS,
            passive_host: PassiveHost::default(),
            ftps: None,
            tls_only: false,
            allow_unauthorized_tls: false,
            allowed_commands: None,
            use_read_file: false,
            use_write_file: false,
            upload_max_slurp_size: options::DEFAULT_UPLOAD_MAX_SLURP_SIZE,
            listing: ListingConfig::default(),
            resolver: Arc::new(options::DefaultNameResolver),
            data_listener: Arc::new(NopListener),
            presence_listener: Arc::new(NopListener),
            idle_session_timeout: Duration::from_secs(options::DEFAULT_IDLE_SESSION_TIMEOUT_SECS),
            logger: slog::Logger::root(slog::Discard, slog::o!()),
        }
    }

    /// Set the greeting that will be sent to the client after connecting.
    pub fn greeting(mut self, greeting: &'static str) -> Self {
        self.greeting = greeting;
        self
    }

    /// Set the [`Authenticator`](crate::auth::Authenticator) that will be
    /// used for authentication.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator<User>>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Set the range of passive ports that we'll use for passive data
    /// connections.
    pub fn passive_ports(mut self, range: RangeInclusive<u16>) -> Self {
        self.passive_ports = range;
        self
    }

    /// Specifies how the IP address that libunftp puts in the PASV reply is
    /// determined.
    pub fn passive_host<H: Into<PassiveHost>>(mut self, host: H) -> Self {
        self.passive_host = host.into();
        self
    }

    /// Configures the path to a PEM certificate chain and private key in
    /// order to enable FTPS (`AUTH TLS`, `PBSZ`, `PROT`).
    pub fn ftps<P: Into<PathBuf>>(mut self, certs_file: P, key_file: P) -> Self {
        self.ftps = Some(FtpsFiles {
            certs_file: certs_file.into(),
            key_file: key_file.into(),
            client_ca_file: None,
        });
        self
    }

    /// Additionally asks connecting clients for a certificate signed by one
    /// of the roots in the given PEM file. Only has effect after
    /// [`ftps`](Server::ftps).
    pub fn ftps_client_ca<P: Into<PathBuf>>(mut self, client_ca_file: P) -> Self {
        if let Some(ftps) = &mut self.ftps {
            ftps.client_ca_file = Some(client_ca_file.into());
        }
        self
    }

    /// Refuse every command except the pre-login set until the control
    /// channel was upgraded with `AUTH TLS`.
    pub fn tls_only(mut self, tls_only: bool) -> Self {
        self.tls_only = tls_only;
        self
    }

    /// Accept TLS peers that were asked for a client certificate but
    /// presented none.
    pub fn allow_unauthorized_tls(mut self, allow: bool) -> Self {
        self.allow_unauthorized_tls = allow;
        self
    }

    /// Restrict the server to the given commands; everything else is
    /// refused with 502.
    pub fn allowed_commands<I, T>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.allowed_commands = Some(Arc::new(commands.into_iter().map(|c| c.into().to_uppercase()).collect()));
        self
    }

    /// Buffer whole files in memory on RETR instead of streaming them.
    pub fn use_read_file(mut self, on: bool) -> Self {
        self.use_read_file = on;
        self
    }

    /// Buffer uploads in memory (up to
    /// [`upload_max_slurp_size`](Server::upload_max_slurp_size)) and hand
    /// them to the back-end in one piece.
    pub fn use_write_file(mut self, on: bool) -> Self {
        self.use_write_file = on;
        self
    }

    /// The upload size above which a slurped STOR falls back to streaming.
    pub fn upload_max_slurp_size(mut self, bytes: usize) -> Self {
        self.upload_max_slurp_size = bytes;
        self
    }

    /// Hide entries starting with a dot from directory listings.
    pub fn hide_dot_files(mut self, on: bool) -> Self {
        self.listing.hide_dot_files = on;
        self
    }

    /// Send directory listings unsorted, the way the back-end returns them.
    pub fn dont_sort_filenames(mut self, on: bool) -> Self {
        if on {
            self.listing.sort = FilenameSort::Unsorted;
        }
        self
    }

    /// Sort directory listings on a key extracted by the given function.
    pub fn filename_sort_map(mut self, map: Arc<FilenameSortMap>) -> Self {
        self.listing.sort = FilenameSort::KeyedBy(map);
        self
    }

    /// Sort directory listings with the given comparator.
    pub fn filename_sort_func(mut self, func: Arc<FilenameSortFunc>) -> Self {
        self.listing.sort = FilenameSort::CompareWith(func);
        self
    }

    /// Bound the concurrency of per-entry lookups (owner and group name
    /// resolution) while building a listing.
    pub fn max_stats_at_once(mut self, max: usize) -> Self {
        self.listing.max_stats_at_once = max;
        self
    }

    /// Set the resolver for the owner and group names shown in listings.
    pub fn name_resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Register a listener for transfer and filesystem-change events.
    pub fn notify_data(mut self, listener: Arc<dyn DataListener>) -> Self {
        self.data_listener = listener;
        self
    }

    /// Register a listener for clients connecting, logging in and out.
    pub fn notify_presence(mut self, listener: Arc<dyn PresenceListener>) -> Self {
        self.presence_listener = listener;
        self
    }

    /// Disconnect clients that stay idle longer than this.
    pub fn idle_session_timeout(mut self, timeout: Duration) -> Self {
        self.idle_session_timeout = timeout;
        self
    }

    /// Set the root logger; per-session loggers derive from it.
    pub fn logger(mut self, logger: slog::Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Start the server, accepting control connections on `addr`. Runs
    /// until the future is dropped.
    pub async fn listen<A: tokio::net::ToSocketAddrs>(self, addr: A) -> std::io::Result<()> {
        let ftps_config = match &self.ftps {
            Some(files) => {
                let tls_config = tls::new_config(&files.certs_file, &files.key_file, files.client_ca_file.as_ref())?;
                FtpsConfig::On {
                    tls_config,
                    client_auth_requested: files.client_ca_file.is_some(),
                    allow_unauthorized: self.allow_unauthorized_tls,
                }
            }
            None => FtpsConfig::Off,
        };

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        slog::info!(self.logger, "Listening on {}", local_addr);

        // One passive pool for all sessions, bound on the same address the
        // control connections come in on.
        let pool_bind_ip: IpAddr = local_addr.ip();
        let passive_pool = PassivePool::new(pool_bind_ip, self.passive_ports.clone(), self.logger.clone());

        let listing = Arc::new(self.listing.clone());

        loop {
            let (tcp_stream, peer) = listener.accept().await?;
            if let Err(e) = tcp_stream.set_nodelay(true) {
                slog::warn!(self.logger, "Could not disable Nagle on control connection: {}", e);
            }

            let config = controlchan::control_loop::Config {
                storage: Arc::new((self.storage)()),
                greeting: self.greeting,
                authenticator: self.authenticator.clone(),
                passive_pool: passive_pool.clone(),
                passive_host: self.passive_host,
                ftps_config: ftps_config.clone(),
                tls_only: self.tls_only,
                allowed_commands: self.allowed_commands.clone(),
                use_read_file: self.use_read_file,
                use_write_file: self.use_write_file,
                upload_max_slurp_size: self.upload_max_slurp_size,
                listing: listing.clone(),
                resolver: self.resolver.clone(),
                data_listener: self.data_listener.clone(),
                presence_listener: self.presence_listener.clone(),
                idle_session_timeout: self.idle_session_timeout,
                logger: self.logger.clone(),
            };

            if let Err(e) = controlchan::control_loop::spawn(config, tcp_stream).await {
                slog::warn!(self.logger, "Could not start session for {}: {}", peer, e);
            }
        }
    }
}
