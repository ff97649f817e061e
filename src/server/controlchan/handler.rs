use super::{ControlChanError, Reply};
use crate::{
    auth::{Authenticator, UserDetail},
    notification::{DataListener, PresenceListener},
    server::{
        ftpserver::options::{ListingConfig, NameResolver, PassiveHost},
        passive::PassivePool,
        session::SharedSession,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::sync::Arc;

// Common interface for all handlers of `Command`s
#[async_trait]
pub trait CommandHandler<Storage, User>: Send + Sync
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata,
    User: UserDetail,
{
    async fn handle(&self, args: CommandContext<Storage, User>) -> Result<Reply, ControlChanError>;
}

// Represents the arguments passed to a `CommandHandler`
pub struct CommandContext<Storage, User>
where
    Storage: StorageBackend<User> + 'static,
    Storage::Metadata: Metadata + Sync,
    User: UserDetail + 'static,
{
    pub session: SharedSession<Storage, User>,
    pub authenticator: Arc<dyn Authenticator<User>>,
    pub tls_configured: bool,
    pub tls_only: bool,
    pub passive_pool: PassivePool,
    pub passive_host: PassiveHost,
    pub local_addr: std::net::SocketAddr,
    pub listing: Arc<ListingConfig>,
    pub resolver: Arc<dyn NameResolver>,
    pub data_listener: Arc<dyn DataListener>,
    pub presence_listener: Arc<dyn PresenceListener>,
    pub logger: slog::Logger,
}
