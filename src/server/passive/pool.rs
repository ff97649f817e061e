use super::connection::{PassiveDataConn, WAIT_TIMEOUT};
use super::listener::{self, ListenerState, RegisterError};
use std::collections::HashMap;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// The error type produced while setting up or waiting on a passive data
/// channel.
#[derive(Debug, Error)]
pub enum PassiveError {
    /// The port already carries a waiter for this remote IP or is bound by
    /// another process. Internal: the pool retries the next port on this.
    #[error("passive port {0} is busy")]
    PortBusy(u16),

    /// Every port in the configured range is busy.
    #[error("no free passive port in range {start}-{end}")]
    RangeExhausted {
        /// First port of the configured range
        start: u16,
        /// Last port of the configured range
        end: u16,
    },

    /// Binding the passive port failed for a reason other than the address
    /// being in use.
    #[error("failed to bind passive listener")]
    Bind(#[source] std::io::Error),

    /// The expected client did not dial in before the wait timer expired.
    #[error("client did not connect to the passive port in time")]
    WaitTimeout,
}

/// Allocates passive data ports from a bounded range, shared by all control
/// connections. Cheap to clone.
#[derive(Clone)]
pub struct PassivePool {
    inner: Arc<PoolInner>,
}

pub(super) struct PoolInner {
    bind_ip: IpAddr,
    ports: RangeInclusive<u16>,
    wait_timeout: Duration,
    pub(super) listeners: Mutex<HashMap<u16, Arc<ListenerState>>>,
    logger: slog::Logger,
}

impl PassivePool {
    /// Creates a pool handing out ports from `ports`, binding them on
    /// `bind_ip`.
    pub fn new(bind_ip: IpAddr, ports: RangeInclusive<u16>, logger: slog::Logger) -> Self {
        PassivePool {
            inner: Arc::new(PoolInner {
                bind_ip,
                ports,
                wait_timeout: WAIT_TIMEOUT,
                listeners: Mutex::new(HashMap::new()),
                logger,
            }),
        }
    }

    #[cfg(test)]
    fn with_wait_timeout(bind_ip: IpAddr, ports: RangeInclusive<u16>, wait_timeout: Duration, logger: slog::Logger) -> Self {
        PassivePool {
            inner: Arc::new(PoolInner {
                bind_ip,
                ports,
                wait_timeout,
                listeners: Mutex::new(HashMap::new()),
                logger,
            }),
        }
    }

    /// Reserves a slot for `remote` on the lowest free port of the range.
    /// The returned connection's port is bound and listening when this
    /// returns, so it is safe to announce to the client right away.
    pub async fn reserve(&self, remote: IpAddr) -> Result<PassiveDataConn, PassiveError> {
        for port in self.inner.ports.clone() {
            match self.try_reserve(port, remote).await {
                Err(PassiveError::PortBusy(_)) => continue,
                other => return other,
            }
        }
        Err(PassiveError::RangeExhausted {
            start: *self.inner.ports.start(),
            end: *self.inner.ports.end(),
        })
    }

    // The collision check and the slot insertion happen under the listener
    // table lock, which makes them atomic across sessions.
    async fn try_reserve(&self, port: u16, remote: IpAddr) -> Result<PassiveDataConn, PassiveError> {
        let mut listeners = self.inner.listeners.lock().await;

        if let Some(state) = listeners.get(&port).cloned() {
            match state.register(remote) {
                Ok((id, rx)) => return Ok(self.issue(state, remote, id, rx)),
                Err(RegisterError::Collision) => return Err(PassiveError::PortBusy(port)),
                Err(RegisterError::Defunct) => {
                    listeners.remove(&port);
                }
            }
        }

        let socket = TcpListener::bind((self.inner.bind_ip, port)).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::AddrInUse => PassiveError::PortBusy(port),
            _ => PassiveError::Bind(e),
        })?;

        let state = Arc::new(ListenerState::new(port));
        listeners.insert(port, state.clone());
        tokio::spawn(listener::run(
            socket,
            state.clone(),
            Arc::downgrade(&self.inner),
            self.inner.logger.clone(),
        ));

        let (id, rx) = state.register(remote).map_err(|_| PassiveError::PortBusy(port))?;
        Ok(self.issue(state, remote, id, rx))
    }

    fn issue(
        &self,
        state: Arc<ListenerState>,
        remote: IpAddr,
        id: u64,
        rx: tokio::sync::oneshot::Receiver<tokio::net::TcpStream>,
    ) -> PassiveDataConn {
        // The wait timer: expire the slot if the client never dials in.
        let timer_state = state.clone();
        let timeout = self.inner.wait_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_state.remove(remote, id);
        });

        PassiveDataConn::new(state, remote, id, rx)
    }
}
