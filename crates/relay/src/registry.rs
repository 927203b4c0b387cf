//! Channel → connection registry.
//!
//! Uses DashMap so sessions and the bus bridge can touch the registry
//! concurrently. Every operation below takes the shard lock for the keys it
//! touches, so readers never see a sequence that is half appended or half
//! spliced.
//!
//! A channel key only exists while it has at least one entry. A connection
//! is appended once per non-ping message naming the channel, so the same
//! handle can appear several times in one sequence and will then receive
//! each delivery that many times. Teardown goes through
//! [`ConnectionRegistry::unregister_all`], which drops every one of them.

use crate::connection::ConnectionHandle;
use dashmap::DashMap;
use tracing::debug;

/// Registry of channel subscriptions.
pub struct ConnectionRegistry {
    /// Channel → connections, in registration order.
    channels: DashMap<String, Vec<ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Append a connection to a channel, creating the channel if needed.
    pub fn register(&self, channel: &str, conn: ConnectionHandle) {
        let mut entry = self.channels.entry(channel.to_string()).or_default();
        entry.push(conn);
        debug!(
            "Channel '{}' adding connection #{}",
            channel,
            entry.len()
        );
    }

    /// Remove a connection from every channel it is registered under.
    ///
    /// Drops the first matching entry per channel and prunes channels left
    /// empty. Returns the number of entries removed.
    pub fn unregister(&self, conn: &ConnectionHandle) -> usize {
        let mut removed = 0;
        self.channels.retain(|channel, conns| {
            if let Some(pos) = conns.iter().position(|c| c.id == conn.id) {
                debug!("Found bad connection at [{}][{}]", channel, pos);
                conns.remove(pos);
                removed += 1;
            }
            !conns.is_empty()
        });
        removed
    }

    /// Remove every entry for a connection, duplicates included.
    ///
    /// Used when the connection is gone for good: after this no channel
    /// holds a reference to it.
    pub fn unregister_all(&self, conn: &ConnectionHandle) -> usize {
        let mut removed = 0;
        self.channels.retain(|channel, conns| {
            let before = conns.len();
            conns.retain(|c| c.id != conn.id);
            let dropped = before - conns.len();
            if dropped > 0 {
                debug!("Dropped {} entries for {} in [{}]", dropped, conn.id, channel);
                removed += dropped;
            }
            !conns.is_empty()
        });
        removed
    }

    /// Snapshot of the connections registered under a channel.
    ///
    /// Unknown channels yield an empty list.
    pub fn connections_for(&self, channel: &str) -> Vec<ConnectionHandle> {
        self.channels
            .get(channel)
            .map(|conns| conns.clone())
            .unwrap_or_default()
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of channels with at least one connection.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Total number of entries across all channels, duplicates included.
    pub fn subscription_count(&self) -> usize {
        self.channels.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::recording_connection;
    use std::sync::Arc;

    #[test]
    fn test_register_then_unregister_removes_channel() {
        let registry = ConnectionRegistry::new();
        let (conn, _) = recording_connection();

        registry.register("deck", conn.clone());
        assert_eq!(registry.connections_for("deck").len(), 1);

        assert_eq!(registry.unregister(&conn), 1);
        assert!(registry.connections_for("deck").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_cleans_every_channel() {
        let registry = ConnectionRegistry::new();
        let (conn, _) = recording_connection();
        let (other, _) = recording_connection();

        registry.register("a", conn.clone());
        registry.register("b", conn.clone());
        registry.register("b", other.clone());

        assert_eq!(registry.unregister(&conn), 2);
        assert!(registry.connections_for("a").is_empty());
        assert_eq!(registry.connections_for("b"), vec![other]);
        assert_eq!(registry.channels(), vec!["b".to_string()]);
    }

    #[test]
    fn test_last_removal_prunes_channel() {
        let registry = ConnectionRegistry::new();
        let (c1, _) = recording_connection();
        let (c2, _) = recording_connection();

        registry.register("c", c1.clone());
        registry.register("c", c2.clone());
        registry.unregister(&c1);
        assert_eq!(registry.channels(), vec!["c".to_string()]);

        registry.unregister(&c2);
        assert!(registry.connections_for("c").is_empty());
        assert!(!registry.channels().contains(&"c".to_string()));
        assert_eq!(registry.channel_count(), 0);
    }

    #[test]
    fn test_duplicate_registration_preserved() {
        let registry = ConnectionRegistry::new();
        let (conn, _) = recording_connection();

        registry.register("dup", conn.clone());
        registry.register("dup", conn.clone());
        assert_eq!(registry.connections_for("dup"), vec![conn.clone(), conn]);
        assert_eq!(registry.subscription_count(), 2);
    }

    #[test]
    fn test_unregister_all_drops_duplicates_everywhere() {
        let registry = ConnectionRegistry::new();
        let (conn, _) = recording_connection();
        let (other, _) = recording_connection();

        for _ in 0..3 {
            registry.register("a", conn.clone());
        }
        registry.register("a", other.clone());
        registry.register("b", conn.clone());
        registry.register("b", conn.clone());

        assert_eq!(registry.unregister_all(&conn), 5);
        assert_eq!(registry.connections_for("a"), vec![other]);
        assert!(registry.connections_for("b").is_empty());
        assert_eq!(registry.channels(), vec!["a".to_string()]);
        assert_eq!(Arc::strong_count(&conn), 1);
    }

    #[test]
    fn test_unregister_takes_one_entry_per_channel() {
        let registry = ConnectionRegistry::new();
        let (conn, _) = recording_connection();
        registry.register("dup", conn.clone());
        registry.register("dup", conn.clone());

        assert_eq!(registry.unregister(&conn), 1);
        assert_eq!(registry.connections_for("dup").len(), 1);
        assert_eq!(registry.unregister_all(&conn), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registration_order_kept() {
        let registry = ConnectionRegistry::new();
        let conns: Vec<_> = (0..3).map(|_| recording_connection().0).collect();
        for c in &conns {
            registry.register("ordered", c.clone());
        }
        registry.unregister(&conns[1]);

        assert_eq!(
            registry.connections_for("ordered"),
            vec![conns[0].clone(), conns[2].clone()]
        );
    }

    #[test]
    fn test_unknown_channel_and_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let (conn, _) = recording_connection();
        assert!(registry.connections_for("nope").is_empty());
        assert_eq!(registry.unregister(&conn), 0);
    }

    #[test]
    fn test_empty_channel_name_is_a_channel() {
        let registry = ConnectionRegistry::new();
        let (conn, _) = recording_connection();
        registry.register("", conn.clone());
        assert_eq!(registry.connections_for("").len(), 1);
        assert_eq!(registry.channels(), vec![String::new()]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = ConnectionRegistry::new();
        let (c1, _) = recording_connection();
        let (c2, _) = recording_connection();

        registry.register("snap", c1.clone());
        let snapshot = registry.connections_for("snap");
        registry.register("snap", c2);
        registry.unregister(&c1);

        assert_eq!(snapshot, vec![c1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        const N: usize = 200;
        let registry = Arc::new(ConnectionRegistry::new());

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let (conn, _) = recording_connection();
                    registry.register("shared", conn.clone());
                    conn
                })
            })
            .collect();

        let mut conns = Vec::with_capacity(N);
        for handle in handles {
            conns.push(handle.await.unwrap());
        }

        let registered = registry.connections_for("shared");
        assert_eq!(registered.len(), N);
        for conn in &conns {
            assert_eq!(registered.iter().filter(|c| c.id == conn.id).count(), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_and_unregister() {
        const N: usize = 100;
        let registry = Arc::new(ConnectionRegistry::new());
        let (keeper, _) = recording_connection();
        registry.register("mixed", keeper.clone());

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let (conn, _) = recording_connection();
                    registry.register("mixed", conn.clone());
                    registry.register(&format!("solo-{}", i), conn.clone());
                    let _ = registry.connections_for("mixed");
                    registry.unregister(&conn);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.connections_for("mixed"), vec![keeper]);
        assert_eq!(registry.channels(), vec!["mixed".to_string()]);
    }
}
