use super::listener::ListenerState;
use super::pool::PassiveError;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

// How long a reserved passive slot waits for the client to dial in before
// it is torn down.
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(9000);

/// One pending passive data channel endpoint: a reserved slot on a bound
/// listener that the expected client has not dialled into yet. Dropping it
/// releases the slot (and the listener's port once no slots remain).
pub struct PassiveDataConn {
    port: u16,
    rx: oneshot::Receiver<TcpStream>,
    _guard: WaiterGuard,
}

impl PassiveDataConn {
    pub(super) fn new(state: Arc<ListenerState>, remote: IpAddr, id: u64, rx: oneshot::Receiver<TcpStream>) -> Self {
        let port = state.port();
        PassiveDataConn {
            port,
            rx,
            _guard: WaiterGuard { state, remote, id },
        }
    }

    /// The passive port this slot is reserved on. Safe to announce in a
    /// 227/229 reply: the listener is bound before the slot exists.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves once the expected client dials in, yielding the accepted
    /// socket. Fails when the wait timer expired or the listener went away.
    pub async fn wait_for_client(self) -> Result<TcpStream, PassiveError> {
        let PassiveDataConn { rx, _guard, .. } = self;
        let socket = rx.await.map_err(|_| PassiveError::WaitTimeout)?;
        Ok(socket)
    }
}

impl std::fmt::Debug for PassiveDataConn {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PassiveDataConn").field("port", &self.port).finish()
    }
}

// Deregisters the waiter slot when the session lets go of the connection,
// whether it was consumed, timed out or abandoned.
struct WaiterGuard {
    state: Arc<ListenerState>,
    remote: IpAddr,
    id: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.state.remove(self.remote, self.id);
    }
}
