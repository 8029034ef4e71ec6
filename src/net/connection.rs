//! Connection registry for forced shutdown.
//!
//! # Responsibilities
//! - Assign unique connection IDs at accept time
//! - Track every open client connection
//! - Remove a connection when it closes, for whatever reason
//! - Force-close every tracked connection on shutdown
//!
//! # Design Decisions
//! - Registration is synchronous, done by the accept loop before the
//!   connection task is spawned, so no connection escapes `close_all`
//! - Each entry owns the sending half of a kill switch; the connection task
//!   races its HTTP future against the receiving half
//! - Removal is driven by a guard dropped when the connection task ends,
//!   never by polling
//! - Registry mutation is behind a mutex (multi-threaded runtime)

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

/// Idle timeout applied to every accepted connection.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
struct Entry {
    peer: SocketAddr,
    kill: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, Entry>>,
}

impl RegistryInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks open connections so shutdown can terminate them.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted connection.
    ///
    /// Returns the guard that unregisters on drop and the kill switch that
    /// fires when the registry force-closes the connection.
    pub fn register(&self, peer: SocketAddr) -> (ConnectionGuard, KillSwitch) {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(id, Entry { peer, kill: tx });

        tracing::debug!(connection_id = %id, peer_addr = %peer, "Connection registered");

        (
            ConnectionGuard {
                registry: Arc::clone(&self.inner),
                id,
            },
            KillSwitch { rx },
        )
    }

    /// Remove a connection and terminate it: dropping its entry fires the
    /// connection's kill switch. Returns false if it was not registered.
    ///
    /// Connections that end on their own are removed by their guard instead.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.inner.lock().remove(&id).is_some()
    }

    /// Force-close every registered connection and clear the registry.
    ///
    /// Returns the number of connections closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(ConnectionId, Entry)> = self.inner.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            // The receiver is gone if the connection is already finishing.
            let _ = entry.kill.send(());
            tracing::debug!(connection_id = %id, peer_addr = %entry.peer, "Connection force-closed");
        }
        count
    }

    /// Number of currently open connections.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// IDs of the open connections, ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.inner.lock().keys().copied().collect();
        ids.sort();
        ids
    }
}

/// Guard that tracks a connection's lifetime.
/// Unregisters the connection when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<RegistryInner>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Resolves when the registry force-closes this connection.
#[derive(Debug)]
pub struct KillSwitch {
    rx: oneshot::Receiver<()>,
}

impl KillSwitch {
    /// Wait until the connection must be terminated.
    pub async fn fired(self) {
        // A dropped sender means the entry was drained: same outcome.
        let _ = self.rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_ids_are_monotonic() {
        let registry = ConnectionRegistry::new();
        let (a, _ka) = registry.register(peer(1));
        let (b, _kb) = registry.register(peer(2));
        assert!(b.id() > a.id());
        assert_eq!(registry.ids(), vec![a.id(), b.id()]);
        assert_eq!(a.id().to_string(), format!("conn-{}", a.id().as_u64()));
    }

    #[test]
    fn test_guard_drop_unregisters() {
        let registry = ConnectionRegistry::new();
        let (guard1, _k1) = registry.register(peer(1));
        let (guard2, _k2) = registry.register(peer(2));
        assert_eq!(registry.len(), 2);

        drop(guard1);
        assert_eq!(registry.len(), 1);

        drop(guard2);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_terminates_the_connection() {
        let registry = ConnectionRegistry::new();
        let (guard, kill) = registry.register(peer(1));
        let (_other, other_kill) = registry.register(peer(2));

        assert!(registry.unregister(guard.id()));
        assert!(!registry.unregister(guard.id()));
        tokio::time::timeout(Duration::from_secs(1), kill.fired()).await.unwrap();

        // Only the removed connection is affected.
        let still_open = tokio::time::timeout(Duration::from_millis(50), other_kill.fired()).await;
        assert!(still_open.is_err());
        assert_eq!(registry.len(), 1);

        drop(guard);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_close_all_fires_every_kill_switch() {
        let registry = ConnectionRegistry::new();
        let (guard1, kill1) = registry.register(peer(1));
        let (guard2, kill2) = registry.register(peer(2));

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());

        tokio::time::timeout(Duration::from_secs(1), kill1.fired()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), kill2.fired()).await.unwrap();

        // Late close notifications are harmless.
        drop(guard1);
        drop(guard2);
        assert!(registry.is_empty());
        assert_eq!(registry.close_all(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let registry = ConnectionRegistry::new();
        let clone = registry.clone();
        let (_guard, kill) = clone.register(peer(9));
        assert_eq!(registry.len(), 1);

        let task = tokio::spawn(kill.fired());
        registry.close_all();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(clone.is_empty());
    }
}
