use crate::core::config::ConnectionConfig;
use crate::core::connection::Connection;
use crate::protocol::SubProtocol;
use crate::traits::{fingerprint, Headers, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Identity of a reusable connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub endpoint: String,
    pub protocols: Vec<SubProtocol>,
    pub headers: String,
}

impl PoolKey {
    pub fn new(endpoint: &str, protocols: &[SubProtocol], headers: &Headers) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            protocols: protocols.to_vec(),
            headers: fingerprint(endpoint, headers),
        }
    }
}

/// Open connections shared between subscriptions
///
/// A subscription reuses an open connection to the same endpoint offered
/// the same protocols with the same headers. Closed connections are pruned
/// on access. Opens are serialised so two concurrent subscribers never race
/// to create two sockets for one key.
pub struct ConnectionPool {
    connections: Arc<RwLock<HashMap<PoolKey, Connection>>>,
    open_lock: tokio::sync::Mutex<()>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            open_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open connection for a key, if one exists
    pub fn get(&self, key: &PoolKey) -> Option<Connection> {
        self.connections
            .read()
            .get(key)
            .filter(|connection| connection.is_open())
            .cloned()
    }

    /// Reuse an open connection or open a new one
    pub async fn acquire(
        &self,
        endpoint: &str,
        protocols: &[SubProtocol],
        headers: &Headers,
        config: &ConnectionConfig,
    ) -> Result<Connection> {
        let key = PoolKey::new(endpoint, protocols, headers);
        if let Some(connection) = self.get(&key) {
            debug!("Reusing connection {} to {}", connection.id(), endpoint);
            return Ok(connection);
        }

        let _guard = self.open_lock.lock().await;
        if let Some(connection) = self.get(&key) {
            return Ok(connection);
        }
        self.prune();

        let connection = Connection::open(endpoint, protocols, headers, config.clone()).await?;
        info!("Pooled connection {} to {}", connection.id(), endpoint);
        self.connections.write().insert(key, connection.clone());
        Ok(connection)
    }

    /// Drop closed connections; returns how many were removed
    pub fn prune(&self) -> usize {
        let mut connections = self.connections.write();
        let before = connections.len();
        connections.retain(|_, connection| connection.is_open());
        let removed = before - connections.len();
        if removed > 0 {
            debug!("Pruned {} closed connection(s)", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every pooled connection
    pub async fn close_all(&self) {
        let connections: Vec<Connection> = self.connections.write().drain().map(|(_, c)| c).collect();
        info!("Closing {} pooled connection(s)", connections.len());
        for connection in connections {
            connection.close().await;
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_key_identity() {
        let mut headers = Headers::new();
        headers.insert("Authorization".into(), "Bearer a".into());

        let a = PoolKey::new("ws://h/graphql", &SubProtocol::DEFAULT_PREFERENCE, &headers);
        let b = PoolKey::new("ws://h/graphql", &SubProtocol::DEFAULT_PREFERENCE, &headers);
        assert_eq!(a, b);

        let c = PoolKey::new("ws://h/graphql", &[SubProtocol::GraphqlWs], &headers);
        assert_ne!(a, c);

        headers.insert("Authorization".into(), "Bearer b".into());
        let d = PoolKey::new("ws://h/graphql", &SubProtocol::DEFAULT_PREFERENCE, &headers);
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let pool = ConnectionPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.prune(), 0);
        pool.close_all().await;
    }
}
