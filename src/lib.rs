//! Versioned model-serving runtime.
//!
//! Serves machine-learning models behind an async request/response
//! interface: a registry tracks load state per (name, version), a loader
//! manages the expensive bring-into-memory lifecycle, and a batching
//! dispatcher groups concurrent requests for the same model into bounded
//! batches before invoking the pluggable model capability once per batch.
//!
//! # Guarantees
//!
//! - **Load dedup**: concurrent callers never trigger two loads for one
//!   key; late arrivals wait and observe the in-flight outcome.
//! - **Handle validity**: a handle never outlives its entry's Ready
//!   period; unload waits for every dispatched batch.
//! - **Bounded queueing latency**: a request waits at most the batch
//!   window plus the model's own invocation time.
//! - **Per-key ordering**: batches for one model execute strictly in
//!   formation order; different models are fully independent.
//!
//! The actual model computation (summarization, classification,
//! generation) is supplied by the embedder through [`CapabilityProvider`]
//! and never reimplemented here; the same goes for the transport layer,
//! which consumes the operations in [`api`].

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use health::{HealthChecker, HealthConfig};
use models::ModelRegistry;
use scheduler::{BatchConfig, BatchDispatcher};
use shutdown::ShutdownCoordinator;
use telemetry::MetricsAggregator;

pub use api::{InferenceCall, InferenceResponse, ModelStatusEntry};
pub use error::ServeError;
pub use models::{
    CapabilityProvider, CatalogBuilder, InvocationError, InvocationItem, LoadState, ModelCapability,
    ModelCatalog, ModelDescriptor, ModelKey, ModelKind, ParamValue,
};
pub use telemetry::MetricsSnapshot;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub batch: BatchConfig,
    pub health: HealthConfig,
    /// How long `shutdown` waits for live requests to drain.
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            health: HealthConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// The serving runtime: catalogue, registry, dispatcher, metrics.
///
/// Construct once per process with the static catalogue, then hand shared
/// references to the transport layer.
pub struct Runtime {
    catalog: Arc<ModelCatalog>,
    registry: Arc<ModelRegistry>,
    dispatcher: Arc<BatchDispatcher>,
    metrics: Arc<MetricsAggregator>,
    coordinator: ShutdownCoordinator,
    cancel: CancellationToken,
    health: HealthChecker,
    shutdown_timeout: Duration,
}

impl Runtime {
    pub fn new(catalog: ModelCatalog, config: RuntimeConfig) -> Self {
        telemetry::describe_metrics();

        let catalog = Arc::new(catalog);
        let registry = Arc::new(ModelRegistry::new(Arc::clone(&catalog)));
        let metrics = Arc::new(MetricsAggregator::new());
        let cancel = CancellationToken::new();
        let dispatcher = Arc::new(BatchDispatcher::new(
            Arc::clone(&catalog),
            Arc::clone(&registry),
            Arc::clone(&metrics),
            config.batch,
            cancel.clone(),
        ));

        Self {
            catalog,
            registry,
            dispatcher,
            metrics,
            coordinator: ShutdownCoordinator::new(),
            cancel,
            health: HealthChecker::new(config.health),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Build from `SERVING_*` environment variables.
    pub fn from_env(catalog: ModelCatalog) -> Self {
        Self::new(catalog, config::load().runtime)
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }
}
