//! The RFC 959 Passive (`PASV`) command
//
// This command requests the server-DTP to "listen" on a data port and to
// wait for a connection rather than initiate one upon receipt of a transfer
// command. The response to this command includes the host and port address
// this server is listening on.

use crate::{
    auth::UserDetail,
    server::{
        controlchan::{
            error::ControlChanError,
            handler::{CommandContext, CommandHandler},
            Reply, ReplyCode,
        },
        ftpserver::options::PassiveHost,
        passive,
        session::DataChan,
    },
    storage::{Metadata, StorageBackend},
};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug)]
pub struct Pasv;

// The IP the 227 reply tells the client to dial.
pub(super) fn announced_ip(passive_host: PassiveHost, local_addr: SocketAddr) -> Option<Ipv4Addr> {
    match passive_host {
        PassiveHost::Ip(ip) => Some(ip),
        PassiveHost::FromConnection => match passive::canonical_ip(local_addr.ip()) {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        },
    }
}

#[async_trait]
impl<Storage, User> CommandHandler<Storage, User> for Pasv
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

        let ip = match announced_ip(args.passive_host, args.local_addr) {
            Some(ip) => ip,
            None => {
                slog::error!(args.logger, "No IPv4 address to announce for PASV on {}", args.local_addr);
                return Ok(Reply::new(
                    ReplyCode::ServiceNotAvailable,
                    "Server was unable to open passive connection listener",
                ));
            }
        };

        let remote = passive::canonical_ip(session.source.ip());
        match args.passive_pool.reserve(remote).await {
            Ok(conn) => {
                let port = conn.port();
                session.data_chan = Some(DataChan::Passive(conn));
                let octets = ip.octets();
                Ok(Reply::new_with_string(
                    ReplyCode::EnteringPassiveMode,
                    format!(
                        "Entering Passive Mode ({},{},{},{},{},{})",
                        octets[0],
                        octets[1],
                        octets[2],
                        octets[3],
                        port >> 8,
                        port & 0xff
                    ),
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
