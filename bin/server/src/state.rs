//! Shared handler state.

use murmur::Coordinator;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    /// Secret expected in `X-Gateway-Secret` on `/internal` routes.
    pub gateway_secret: Option<Arc<str>>,
    /// Streams with no event for this long are closed.
    pub stream_idle_timeout: Duration,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, gateway_secret: Option<String>) -> Self {
        let stream_idle_timeout = coordinator.config().stream_idle_timeout;
        Self {
            coordinator,
            gateway_secret: gateway_secret.map(Arc::from),
            stream_idle_timeout,
        }
    }
}
