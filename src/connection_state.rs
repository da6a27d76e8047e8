use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connected through the socket opened at this epoch.
    Connected(u64),
    Closing,
}

/// Proof that the caller won the right to replace the socket it observed.
///
/// Must be handed back through [`ConnectionManager::install`] or
/// [`ConnectionManager::abandon`].
#[derive(Debug)]
pub struct ReconnectClaim {
    previous: ConnectionState,
}

/// Outcome of installing a freshly opened socket.
#[derive(Debug)]
pub enum Installed<S> {
    Swapped {
        epoch: u64,
        previous: Option<Arc<S>>,
    },
    /// The connection started closing while the socket was being opened.
    Rejected(Arc<S>),
}

struct Inner<S> {
    state: ConnectionState,
    socket: Option<(u64, Arc<S>)>,
    last_epoch: u64,
    last_connected: Option<Instant>,
    reconnect_attempts: u32,
}

/// Per-connection state machine guarding the active socket.
///
/// Reconnect attempts carry the epoch of the socket they saw fail; only the
/// first attempt for a given epoch is granted a claim, later ones are no-ops.
pub struct ConnectionManager<S> {
    inner: Mutex<Inner<S>>,
}

impl<S> Default for ConnectionManager<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ConnectionManager<S> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                socket: None,
                last_epoch: 0,
                last_connected: None,
                reconnect_attempts: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.lock().state, ConnectionState::Connected(_))
    }

    /// The socket writers should use, with the epoch it was opened at.
    pub fn current(&self) -> Option<(u64, Arc<S>)> {
        self.lock()
            .socket
            .as_ref()
            .map(|(epoch, socket)| (*epoch, socket.clone()))
    }

    pub fn current_epoch(&self) -> Option<u64> {
        self.lock().socket.as_ref().map(|(epoch, _)| *epoch)
    }

    /// Claim the reconnect for the socket observed at `observed` (`None` when no socket was seen).
    pub fn try_claim(&self, observed: Option<u64>) -> Option<ReconnectClaim> {
        let mut inner = self.lock();
        match inner.state {
            ConnectionState::Connecting | ConnectionState::Closing => return None,
            ConnectionState::Disconnected | ConnectionState::Connected(_) => {}
        }
        let current = inner.socket.as_ref().map(|(epoch, _)| *epoch);
        if current != observed {
            return None;
        }
        let previous = inner.state;
        if observed.is_some() {
            inner.reconnect_attempts += 1;
        }
        inner.state = ConnectionState::Connecting;
        Some(ReconnectClaim { previous })
    }

    /// Install a new socket under a claim, returning the socket it replaced.
    pub fn install(&self, _claim: ReconnectClaim, socket: Arc<S>) -> Installed<S> {
        let mut inner = self.lock();
        if inner.state != ConnectionState::Connecting {
            return Installed::Rejected(socket);
        }
        inner.last_epoch += 1;
        let epoch = inner.last_epoch;
        let previous = inner.socket.replace((epoch, socket)).map(|(_, s)| s);
        inner.state = ConnectionState::Connected(epoch);
        inner.last_connected = Some(Instant::now());
        inner.reconnect_attempts = 0;
        Installed::Swapped { epoch, previous }
    }

    /// Give a claim back after a failed attempt so the next observer may retry.
    pub fn abandon(&self, claim: ReconnectClaim) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = claim.previous;
        }
    }

    pub fn begin_close(&self) -> Option<Arc<S>> {
        let mut inner = self.lock();
        inner.state = ConnectionState::Closing;
        inner.socket.take().map(|(_, s)| s)
    }

    pub fn finish_close(&self) {
        self.lock().state = ConnectionState::Disconnected;
    }

    pub fn get_reconnect_attempts(&self) -> u32 {
        self.lock().reconnect_attempts
    }

    pub fn last_connected_duration(&self) -> Option<Duration> {
        self.lock().last_connected.map(|instant| instant.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(manager: &ConnectionManager<&'static str>, name: &'static str) -> u64 {
        let claim = manager.try_claim(manager.current_epoch()).unwrap();
        match manager.install(claim, Arc::new(name)) {
            Installed::Swapped { epoch, .. } => epoch,
            Installed::Rejected(_) => panic!("install rejected"),
        }
    }

    #[test]
    fn test_initial_connect() {
        let manager = ConnectionManager::new();
        assert_eq!(manager.get_state(), ConnectionState::Disconnected);
        let epoch = connected(&manager, "a");
        assert_eq!(epoch, 1);
        assert_eq!(manager.get_state(), ConnectionState::Connected(1));
        assert_eq!(*manager.current().unwrap().1, "a");
    }

    #[test]
    fn test_only_first_observer_claims() {
        let manager = ConnectionManager::new();
        let epoch = connected(&manager, "a");

        let first = manager.try_claim(Some(epoch));
        let second = manager.try_claim(Some(epoch));
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(manager.get_state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let manager = ConnectionManager::new();
        let old = connected(&manager, "a");
        let new = connected(&manager, "b");
        assert_eq!(new, old + 1);
        assert!(manager.try_claim(Some(old)).is_none());
        assert!(manager.try_claim(Some(new)).is_some());
    }

    #[test]
    fn test_swap_returns_previous_socket() {
        let manager = ConnectionManager::new();
        let epoch = connected(&manager, "a");
        let claim = manager.try_claim(Some(epoch)).unwrap();
        match manager.install(claim, Arc::new("b")) {
            Installed::Swapped { epoch, previous } => {
                assert_eq!(epoch, 2);
                assert_eq!(*previous.unwrap(), "a");
            }
            Installed::Rejected(_) => panic!("install rejected"),
        }
    }

    #[test]
    fn test_abandon_restores_previous_state() {
        let manager = ConnectionManager::new();
        let epoch = connected(&manager, "a");
        let claim = manager.try_claim(Some(epoch)).unwrap();
        assert_eq!(manager.get_reconnect_attempts(), 1);
        manager.abandon(claim);
        assert_eq!(manager.get_state(), ConnectionState::Connected(epoch));
        assert!(manager.try_claim(Some(epoch)).is_some());
        assert_eq!(manager.get_reconnect_attempts(), 2);
    }

    #[test]
    fn test_install_rejected_while_closing() {
        let manager: ConnectionManager<&'static str> = ConnectionManager::new();
        let claim = manager.try_claim(None).unwrap();
        assert!(manager.begin_close().is_none());
        assert!(matches!(
            manager.install(claim, Arc::new("a")),
            Installed::Rejected(_)
        ));
        assert!(manager.try_claim(None).is_none());
        manager.finish_close();
        assert_eq!(manager.get_state(), ConnectionState::Disconnected);
    }
}
