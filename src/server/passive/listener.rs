use super::pool::PoolInner;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, Weak};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Notify};

// The shared state of one bound passive listener: the waiter slots keyed by
// the remote IP we expect to dial in. At most one slot per remote IP; the
// pool treats a collision like an address-in-use bind failure and retries
// on the next port.
pub(super) struct ListenerState {
    port: u16,
    waiters: Mutex<Waiters>,
    shutdown: Notify,
}

struct Waiters {
    next_id: u64,
    // Set once the accept task decided to exit; registrations against a
    // closed listener must go to a freshly bound one.
    closed: bool,
    slots: HashMap<IpAddr, WaiterSlot>,
}

struct WaiterSlot {
    id: u64,
    tx: oneshot::Sender<TcpStream>,
}

#[derive(Debug)]
pub(super) enum RegisterError {
    // Another session from the same remote IP already waits on this port.
    Collision,
    // The accept task is gone, the pool entry is stale.
    Defunct,
}

impl ListenerState {
    pub(super) fn new(port: u16) -> Self {
        ListenerState {
            port,
            waiters: Mutex::new(Waiters {
                next_id: 0,
                closed: false,
                slots: HashMap::new(),
            }),
            shutdown: Notify::new(),
        }
    }

    pub(super) fn port(&self) -> u16 {
        self.port
    }

    pub(super) fn register(&self, remote: IpAddr) -> Result<(u64, oneshot::Receiver<TcpStream>), RegisterError> {
        let mut waiters = self.waiters.lock().unwrap();
        if waiters.closed {
            return Err(RegisterError::Defunct);
        }
        if waiters.slots.contains_key(&remote) {
            return Err(RegisterError::Collision);
        }
        waiters.next_id += 1;
        let id = waiters.next_id;
        let (tx, rx) = oneshot::channel();
        waiters.slots.insert(remote, WaiterSlot { id, tx });
        Ok((id, rx))
    }

    // Removes the slot for `remote` if it still belongs to registration
    // `id`. Dropping the sender wakes the owning session with an error.
    pub(super) fn remove(&self, remote: IpAddr, id: u64) {
        let mut waiters = self.waiters.lock().unwrap();
        let matches = waiters.slots.get(&remote).map(|s| s.id == id).unwrap_or(false);
        if matches {
            waiters.slots.remove(&remote);
            if waiters.slots.is_empty() {
                self.shutdown.notify_one();
            }
        }
    }

    // Routes an accepted socket to the slot waiting for its remote IP. A
    // socket from an IP nobody waits for is dropped.
    fn deliver(&self, remote: IpAddr, socket: TcpStream) {
        let mut waiters = self.waiters.lock().unwrap();
        if let Some(slot) = waiters.slots.remove(&remote) {
            let _ = slot.tx.send(socket);
        }
    }

    // Marks the listener closed if no slots remain. Returns whether the
    // accept task should exit.
    fn close_if_idle(&self) -> bool {
        let mut waiters = self.waiters.lock().unwrap();
        if waiters.slots.is_empty() {
            waiters.closed = true;
            true
        } else {
            false
        }
    }
}

// Maps an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) back to its dotted
// quad so it compares equal to the IP the control connection announced.
pub(crate) fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

// The accept task of one bound passive port. Exits, releasing the bound
// socket and its pool entry, when the last waiter slot is gone.
pub(super) async fn run(socket: TcpListener, state: Arc<ListenerState>, pool: Weak<PoolInner>, logger: slog::Logger) {
    loop {
        tokio::select! {
            accepted = socket.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let remote = canonical_ip(peer.ip());
                        slog::debug!(logger, "Passive connection from {} on port {}", remote, state.port());
                        state.deliver(remote, stream);
                    }
                    Err(e) => {
                        slog::warn!(logger, "Accept failed on passive port {}: {}", state.port(), e);
                        break;
                    }
                }
            }
            _ = state.shutdown.notified() => {}
        };
        if state.close_if_idle() {
            break;
        }
    }

    // Drop the pool's entry for this port, unless it was already replaced
    // by a newer listener.
    {
        let mut waiters = state.waiters.lock().unwrap();
        waiters.closed = true;
        for (_, slot) in waiters.slots.drain() {
            drop(slot.tx);
        }
    }
    if let Some(pool) = pool.upgrade() {
        let mut listeners = pool.listeners.lock().await;
        if let Some(current) = listeners.get(&state.port()) {
            if Arc::ptr_eq(current, &state) {
                listeners.remove(&state.port());
            }
        }
    }
    slog::debug!(logger, "Passive listener on port {} released", state.port());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn canonical_ip_unwraps_mapped_v4() {
        let mapped = IpAddr::V6("::ffff:192.0.2.7".parse::<Ipv6Addr>().unwrap());
        assert_eq!(canonical_ip(mapped), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)));
    }

    #[test]
    fn canonical_ip_keeps_plain_addresses() {
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(canonical_ip(v4), v4);

        let v6 = IpAddr::V6("2001:db8::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(canonical_ip(v6), v6);
    }

    #[test]
    fn second_registration_for_same_ip_collides() {
        let state = ListenerState::new(2121);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        let (_id, _rx) = state.register(ip).unwrap();
        assert!(matches!(state.register(ip), Err(RegisterError::Collision)));

        let other = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        assert!(state.register(other).is_ok());
    }

    #[test]
    fn remove_is_id_checked() {
        let state = ListenerState::new(2121);
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        let (first_id, _rx) = state.register(ip).unwrap();
        state.remove(ip, first_id);

        // A fresh registration gets a new id; removal with the old one is a no-op.
        let (second_id, _rx2) = state.register(ip).unwrap();
        state.remove(ip, first_id);
        assert!(matches!(state.register(ip), Err(RegisterError::Collision)));
        state.remove(ip, second_id);
        assert!(state.register(ip).is_ok());
    }

    #[test]
    fn closed_state_rejects_registrations() {
        let state = ListenerState::new(2121);
        assert!(state.close_if_idle());
        assert!(matches!(state.register(IpAddr::V4(Ipv4Addr::LOCALHOST)), Err(RegisterError::Defunct)));
    }
}
