//! # Controller Context
//!
//! State shared by every reconciliation the watch loop runs.

use crate::config::ControllerConfig;
use crate::controller::{FibonacciBackoff, ReconciliationEngine};
use crate::runtime::events::EventPublisher;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

pub struct ControllerContext {
    pub engine: ReconciliationEngine,
    pub events: Arc<dyn EventPublisher>,
    pub config: Arc<ControllerConfig>,
    /// Error backoff per `namespace/name`, so one failing source never slows another
    backoff_states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl fmt::Debug for ControllerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerContext")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ControllerContext {
    #[must_use]
    pub fn new(
        engine: ReconciliationEngine,
        events: Arc<dyn EventPublisher>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            engine,
            events,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Next retry delay for `key`, advancing its backoff
    pub fn next_error_backoff(&self, key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => states
                .entry(key.to_string())
                .or_insert_with(|| {
                    FibonacciBackoff::new(
                        self.config.backoff_min_secs,
                        self.config.backoff_max_secs,
                    )
                })
                .next_backoff(),
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
                Duration::from_secs(self.config.backoff_max_secs)
            }
        }
    }

    /// Forget the error history of `key` after a successful pass
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(backoff) = states.get_mut(key) {
                backoff.reset();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::controller::ResyncPolicy;
    use crate::provider::ProviderRegistry;
    use crate::runtime::events::testing::RecordingPublisher;
    use crate::store::memory::MemoryStore;
    use crate::store::SourceStore;

    pub(crate) fn context(
        store: Arc<MemoryStore>,
        providers: ProviderRegistry,
        events: Arc<RecordingPublisher>,
    ) -> ControllerContext {
        let config = Arc::new(ControllerConfig::default());
        let engine = ReconciliationEngine::new(
            store as Arc<dyn SourceStore>,
            Arc::new(providers),
            ResyncPolicy {
                period: config.resync_period(),
                refresh_margin: config.refresh_margin(),
                min_interval: config.min_refresh_interval(),
            },
        );
        ControllerContext::new(engine, events, config)
    }
}
