//! Connection registry: the set of clients that receive broadcasts.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ptycast_common::{ClientId, DeliveryError};
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::RwLock;

use crate::protocol::ServerFrame;

/// Outbound side of one connection.
///
/// Frames go onto the connection's own bounded queue; the task owning the
/// socket drains it, so broadcasts and direct replies never interleave.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: ClientId,
    pub addr: SocketAddr,
    tx: mpsc::Sender<ServerFrame>,
}

impl ClientHandle {
    pub fn new(id: ClientId, addr: SocketAddr, tx: mpsc::Sender<ServerFrame>) -> Self {
        Self { id, addr, tx }
    }

    /// Queue a frame for this client, waiting at most `timeout` for room.
    pub async fn deliver(
        &self,
        frame: ServerFrame,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        match self.tx.send_timeout(frame, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => Err(DeliveryError::Closed),
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::TimedOut(timeout)),
        }
    }
}

/// Shared, lock-guarded map of live clients.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    clients: Arc<RwLock<HashMap<ClientId, ClientHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. Returns the new client count.
    pub async fn add(&self, client: ClientHandle) -> usize {
        let mut map = self.clients.write().await;
        map.insert(client.id.clone(), client);
        map.len()
    }

    /// Deregister a client. Returns `true` if it was present.
    pub async fn remove(&self, id: &ClientId) -> bool {
        self.clients.write().await.remove(id).is_some()
    }

    /// Deregister several clients under one lock.
    pub async fn remove_all(&self, ids: &[ClientId]) -> usize {
        let mut map = self.clients.write().await;
        ids.iter().filter(|id| map.remove(*id).is_some()).count()
    }

    /// Copy of the current membership. The lock is released on return.
    pub async fn snapshot(&self) -> Vec<ClientHandle> {
        self.clients.read().await.values().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, id: &ClientId) -> bool {
        self.clients.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
