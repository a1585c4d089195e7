//! Model lifecycle: bring instances into memory and release them.
//!
//! The loader is a pure factory. It keeps no cache and no state; which
//! instances exist, and in which lifecycle phase, is the registry's
//! concern.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use super::capability::{InvocationError, ModelCapability};
use super::catalog::{ModelDescriptor, ModelKey};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("provider failed to load {key}: {source}")]
    Provider {
        key: ModelKey,
        #[source]
        source: InvocationError,
    },
}

#[derive(Debug, Error)]
pub enum UnloadError {
    #[error("provider failed to release {key}: {source}")]
    Provider {
        key: ModelKey,
        #[source]
        source: InvocationError,
    },
}

/// A model resident in memory. Valid only while its registry entry is
/// Ready; the registry keeps it alive for every batch dispatched against
/// it.
pub struct LoadedModel {
    key: ModelKey,
    capability: Arc<dyn ModelCapability>,
    load_time: Duration,
}

impl LoadedModel {
    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    pub fn capability(&self) -> &Arc<dyn ModelCapability> {
        &self.capability
    }

    pub fn load_time(&self) -> Duration {
        self.load_time
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("key", &self.key)
            .field("load_time", &self.load_time)
            .finish_non_exhaustive()
    }
}

/// Loads and releases model instances through descriptor providers.
pub struct ModelLoader;

impl ModelLoader {
    pub fn new() -> Self {
        Self
    }

    /// Bring a model into memory. Potentially slow (seconds); callers hold
    /// the per-key transition lock, never an entry read lock. The handle
    /// only exists once this returns, so an abandoned load leaks nothing
    /// into the registry.
    pub async fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<LoadedModel>, LoadError> {
        let key = descriptor.key().clone();
        let start = Instant::now();
        let capability = descriptor.provider().load(descriptor).await.map_err(|source| {
            warn!(model = %key, error = %source, "model load failed");
            LoadError::Provider {
                key: key.clone(),
                source,
            }
        })?;
        let load_time = start.elapsed();
        info!(model = %key, load_ms = load_time.as_millis() as u64, "model loaded");

        Ok(Arc::new(LoadedModel {
            key,
            capability,
            load_time,
        }))
    }

    /// Release a loaded instance. An unclean release is logged and
    /// surfaced, never retried.
    pub async fn unload(&self, model: &LoadedModel) -> Result<(), UnloadError> {
        if let Err(source) = model.capability.release().await {
            warn!(model = %model.key, error = %source, "model release was not clean");
            return Err(UnloadError::Provider {
                key: model.key.clone(),
                source,
            });
        }
        info!(model = %model.key, "model unloaded");
        Ok(())
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}
