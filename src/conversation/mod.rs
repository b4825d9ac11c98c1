//! Turn scheduling and conversation management
//!
//! The runtime owns the pieces shared across runs (cache, connector
//! factory, host config) with an explicit lifecycle: opened when the
//! runtime is built, flushed as runs record turns. Each run gets its own
//! [`RunHandle`] driven turn-by-turn through `step()`.

pub mod prompt;
mod run;
pub mod scheduler;

pub use run::{RunError, RunHandle, RunState, StepOutcome};

use crate::cache::ResponseCache;
use crate::config::RuntimeConfig;
use crate::llm::{ConnectorFactory, EnvConnectorFactory};
use crate::setup::Setup;
use std::sync::Arc;

/// Shared state for starting conversation runs.
///
/// Multiple runs may execute concurrently; they share the response cache
/// while each owns its transcript and scheduler state.
pub struct ConversationRuntime {
    config: RuntimeConfig,
    cache: Arc<ResponseCache>,
    factory: Arc<dyn ConnectorFactory>,
}

impl ConversationRuntime {
    /// Build a runtime from config, opening the configured cache file (or
    /// an in-memory cache when none is set) and resolving connectors from
    /// the environment.
    pub fn new(config: RuntimeConfig) -> Self {
        let cache = match &config.cache.path {
            Some(path) => ResponseCache::open(path, config.cache.debug),
            None => ResponseCache::in_memory(config.cache.debug),
        };
        Self {
            cache: Arc::new(cache),
            factory: Arc::new(EnvConnectorFactory::new()),
            config,
        }
    }

    /// Build a runtime from explicit parts. Hosts use this to share a
    /// cache across runtimes or to substitute a connector factory.
    pub fn with_parts(
        config: RuntimeConfig,
        cache: Arc<ResponseCache>,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Self {
        Self {
            config,
            cache,
            factory,
        }
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    /// Validate the setup and initialize a run. Fatal setup problems
    /// surface here, before any turn runs.
    pub fn start_run(&self, setup: Setup) -> Result<RunHandle, RunError> {
        RunHandle::start(
            setup,
            self.config.clone(),
            self.cache.clone(),
            self.factory.as_ref(),
        )
    }
}
