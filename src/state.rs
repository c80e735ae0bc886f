//! Shared application state for the serving layer.

use std::sync::Arc;

use crate::engine::EngineConfig;
use crate::metrics::MetricsStore;

/// State handed to the HTTP handlers: the engine configuration plus the
/// metrics store. The engine itself holds no shared mutable state, so
/// concurrent requests are independent; the store is the only shared
/// resource.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineConfig,
    pub metrics: Arc<dyn MetricsStore>,
}

impl AppState {
    pub fn new(engine: EngineConfig, metrics: Arc<dyn MetricsStore>) -> Self {
        Self { engine, metrics }
    }
}
