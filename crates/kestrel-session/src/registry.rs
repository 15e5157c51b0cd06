// ============================================
// File: crates/kestrel-session/src/registry.rs
// ============================================
//! # Connection Registry
//!
//! ## Creation Reason
//! Connections are looked up by id from many tasks at once; the registry
//! owns them and enforces the connection limit and idle timeout.
//!
//! ## Main Functionality
//! - `ConnectionRegistry::insert`: register with limit and duplicate checks
//! - `get` / `get_or_error` / `remove`
//! - `cleanup_idle`: close and drop connections past the idle timeout
//!
//! ## ⚠️ Important Note for Next Developer
//! - Removal always closes the connection
//! - Never hold a map reference across an await
//! - `reserved` is the limit; do not check `len()` under an entry lock,
//!   it locks every shard
//!
//! ## Last Modified
//! v0.1.0 - Initial registry

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use kestrel_common::ConnectionId;

use crate::connection::Connection;
use crate::error::{Result, SessionError};

/// All live connections of an endpoint.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// Slots taken, including inserts still in flight.
    reserved: AtomicUsize,
    max_connections: usize,
    idle_timeout: Duration,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(max_connections: usize, idle_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            reserved: AtomicUsize::new(0),
            max_connections,
            idle_timeout,
        }
    }

    /// Registers a connection under its id.
    ///
    /// # Errors
    /// - `ConnectionLimitReached` when the registry is full
    /// - `ConnectionExists` when the id is taken
    pub fn insert(&self, connection: Arc<Connection>) -> Result<Arc<Connection>> {
        let max = self.max_connections;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map_err(|_| SessionError::ConnectionLimitReached { limit: max })?;

        let id = connection.id();
        match self.connections.entry(id) {
            Entry::Occupied(_) => {
                self.reserved.fetch_sub(1, Ordering::AcqRel);
                return Err(SessionError::ConnectionExists(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&connection));
            }
        }

        // Shard lock released; len() locks every shard.
        info!(
            connection_id = %id,
            perspective = %connection.perspective(),
            connections = self.connections.len(),
            "Connection registered"
        );
        Ok(connection)
    }

    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|r| Arc::clone(r.value()))
    }

    /// # Errors
    /// `ConnectionNotFound` if no connection has this id.
    pub fn get_or_error(&self, id: &ConnectionId) -> Result<Arc<Connection>> {
        self.get(id).ok_or(SessionError::ConnectionNotFound(*id))
    }

    /// Unregisters and closes a connection.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(id).map(|(_, c)| c);

        if let Some(connection) = &removed {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
            connection.close();
            info!(
                connection_id = %id,
                level = %connection.encryption_level(),
                age_ms = connection.age().as_millis(),
                "Connection removed"
            );
        }

        removed
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Removes connections idle past the timeout, and closed ones.
    pub fn cleanup_idle(&self) -> Vec<ConnectionId> {
        let expired: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| {
                let connection = entry.value();
                connection.is_closed() || connection.is_idle(self.idle_timeout)
            })
            .map(|entry| *entry.key())
            .collect();

        for id in &expired {
            debug!(connection_id = %id, "Connection expired");
            self.remove(id);
        }

        if !expired.is_empty() {
            info!("Cleaned up {} idle connections", expired.len());
        }

        expired
    }

    /// Closes and removes every connection.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }

    #[must_use]
    pub fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| Arc::clone(r.value())).collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.count())
            .field("max_connections", &self.max_connections)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use kestrel_common::Perspective;
    use kestrel_core::{CryptoSetupConfig, EncryptionLevel};

    use super::*;

    fn connection() -> Arc<Connection> {
        Arc::new(Connection::new(
            ConnectionId::generate(),
            Perspective::Server,
            CryptoSetupConfig::default(),
        ))
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = ConnectionRegistry::new(4, Duration::from_secs(60));
        let conn = registry.insert(connection()).unwrap();

        assert_eq!(registry.count(), 1);
        assert!(Arc::ptr_eq(&registry.get(&conn.id()).unwrap(), &conn));
        assert!(registry.get_or_error(&conn.id()).is_ok());
        assert!(matches!(
            registry.get_or_error(&ConnectionId::generate()),
            Err(SessionError::ConnectionNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ConnectionRegistry::new(4, Duration::from_secs(60));
        let conn = registry.insert(connection()).unwrap();
        let twin = Arc::new(Connection::new(
            conn.id(),
            Perspective::Server,
            CryptoSetupConfig::default(),
        ));
        assert!(matches!(
            registry.insert(twin),
            Err(SessionError::ConnectionExists(_))
        ));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_limit_enforced() {
        let registry = ConnectionRegistry::new(2, Duration::from_secs(60));
        registry.insert(connection()).unwrap();
        registry.insert(connection()).unwrap();
        assert!(matches!(
            registry.insert(connection()),
            Err(SessionError::ConnectionLimitReached { limit: 2 })
        ));
    }

    #[test]
    fn test_limit_holds_under_concurrent_inserts() {
        let registry = ConnectionRegistry::new(4, Duration::from_secs(60));
        let barrier = std::sync::Barrier::new(16);

        let accepted = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.insert(connection()).is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(accepted, 4);
        assert_eq!(registry.count(), 4);
    }

    #[test]
    fn test_rejected_and_removed_free_their_slot() {
        let registry = ConnectionRegistry::new(2, Duration::from_secs(60));
        let conn = registry.insert(connection()).unwrap();
        let twin = Arc::new(Connection::new(
            conn.id(),
            Perspective::Server,
            CryptoSetupConfig::default(),
        ));
        assert!(matches!(
            registry.insert(twin),
            Err(SessionError::ConnectionExists(_))
        ));

        let second = registry.insert(connection()).unwrap();
        assert!(registry.insert(connection()).is_err());

        registry.remove(&second.id()).unwrap();
        registry.insert(connection()).unwrap();
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_remove_closes() {
        let registry = ConnectionRegistry::new(4, Duration::from_secs(60));
        let conn = registry.insert(connection()).unwrap();

        let removed = registry.remove(&conn.id()).unwrap();
        assert!(removed.is_closed());
        assert!(registry.is_empty());
        assert!(registry.remove(&conn.id()).is_none());
    }

    #[test]
    fn test_cleanup_idle() {
        let registry = ConnectionRegistry::new(4, Duration::from_millis(20));
        let stale = registry.insert(connection()).unwrap();
        let closed = registry.insert(connection()).unwrap();
        closed.close();

        std::thread::sleep(Duration::from_millis(40));
        let fresh = registry.insert(connection()).unwrap();
        fresh
            .seal_packet(b"keepalive", EncryptionLevel::Unspecified)
            .unwrap();

        let mut expired = registry.cleanup_idle();
        expired.sort();
        let mut expected = vec![stale.id(), closed.id()];
        expected.sort();
        assert_eq!(expired, expected);
        assert!(stale.is_closed());
        assert_eq!(registry.count(), 1);
        assert!(registry.get(&fresh.id()).is_some());
    }

    #[test]
    fn test_close_all() {
        let registry = ConnectionRegistry::new(4, Duration::from_secs(60));
        let a = registry.insert(connection()).unwrap();
        registry.insert(connection()).unwrap();

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(a.is_closed());
    }
}
