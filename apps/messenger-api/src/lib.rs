pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::repository::MessageRepository;
use gateway::dispatch::Dispatcher;
use gateway::fanout::{self, BroadcastHub, BroadcastWorker};
use gateway::registry::ConnectionRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn MessageRepository>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcast: Arc<BroadcastHub>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire up the registry, broadcast queues and dispatcher around a
    /// repository. The returned worker must be spawned by the caller.
    pub fn new(config: Config, repo: Arc<dyn MessageRepository>) -> (Self, BroadcastWorker) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (hub, worker) = fanout::channel(config.broadcast_queue_capacity, registry.clone());
        let broadcast = Arc::new(hub);
        let dispatcher = Arc::new(Dispatcher::new(
            repo.clone(),
            broadcast.clone(),
            registry.clone(),
            config.read_idle_timeout,
        ));

        let state = Self {
            repo,
            registry,
            broadcast,
            dispatcher,
            config: Arc::new(config),
        };
        (state, worker)
    }
}
