//! Application State
//!
//! Shared state across all handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ragchat_agent::RequestHandler;
use ragchat_config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    /// Per-request pipeline shared by every connection
    pub handler: Arc<RequestHandler>,
    connections: Arc<AtomicUsize>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: Settings, handler: RequestHandler) -> Self {
        Self {
            config: Arc::new(config),
            handler: Arc::new(handler),
            connections: Arc::new(AtomicUsize::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Reserve a connection slot; `None` once `server.max_connections` are open
    pub fn try_connect(&self) -> Option<ConnectionGuard> {
        let limit = self.config.server.max_connections;
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < limit).then_some(open + 1)
            })
            .ok()?;
        metrics::gauge!("ragchat_ws_connections").increment(1.0);
        Some(ConnectionGuard {
            connections: self.connections.clone(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Releases its connection slot on drop
pub struct ConnectionGuard {
    connections: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
        metrics::gauge!("ragchat_ws_connections").decrement(1.0);
    }
}
