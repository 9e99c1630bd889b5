//! Registry of live chat connections.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::connection::{ClientSink, ConnectionId};

/// A registered connection as seen by the broadcast worker.
pub type Recipient = (ConnectionId, Arc<dyn ClientSink>);

/// The authoritative set of connections eligible for fan-out.
///
/// A single `parking_lot::Mutex` guards the map. It is held only for the
/// insert, removal or copy itself and never across socket I/O.
pub struct ConnectionRegistry {
    clients: Mutex<HashMap<ConnectionId, Arc<dyn ClientSink>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection. A second add of the same id keeps the first sink.
    pub fn add(&self, id: ConnectionId, sink: Arc<dyn ClientSink>) {
        self.clients.lock().entry(id).or_insert(sink);
    }

    /// Register a connection and return a guard that deregisters it when
    /// released or dropped.
    pub fn register(self: &Arc<Self>, id: ConnectionId, sink: Arc<dyn ClientSink>) -> Registration {
        self.add(id.clone(), sink);
        Registration {
            registry: Arc::clone(self),
            id,
            released: false,
        }
    }

    /// Take a connection out of the set without closing it.
    pub fn detach(&self, id: &ConnectionId) -> Option<Arc<dyn ClientSink>> {
        self.clients.lock().remove(id)
    }

    /// Deregister and close a connection. Unknown or already removed ids are
    /// a no-op.
    pub async fn remove(&self, id: &ConnectionId) {
        if let Some(sink) = self.detach(id) {
            sink.close().await;
            tracing::debug!(conn_id = %id, "connection deregistered");
        }
    }

    /// Point-in-time copy of every registered connection.
    pub fn snapshot(&self) -> Vec<Recipient> {
        self.clients
            .lock()
            .iter()
            .map(|(id, sink)| (id.clone(), Arc::clone(sink)))
            .collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.clients.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deregister and close every connection. Used on process shutdown so
    /// pending reads unblock.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<dyn ClientSink>> =
            self.clients.lock().drain().map(|(_, sink)| sink).collect();
        let count = drained.len();
        futures_util::future::join_all(drained.iter().map(|sink| sink.close())).await;
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped registration of one connection.
///
/// [`Registration::release`] removes and closes the connection. If the guard
/// is dropped without being released (task cancelled, panic unwinding) the
/// connection is detached synchronously and closed on a spawned task.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
    released: bool,
}

impl Registration {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub async fn release(mut self) {
        self.released = true;
        self.registry.remove(&self.id).await;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Some(sink) = self.registry.detach(&self.id) else {
            return;
        };
        tracing::debug!(conn_id = %self.id, "connection deregistered on drop");
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move { sink.close().await });
        }
    }
}
