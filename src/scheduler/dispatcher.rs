//! Per-model batching dispatcher.
//!
//! Each model key gets its own lane: an unbounded queue drained by one
//! task that forms batches bounded by size and deadline, then invokes the
//! model capability once per batch. Lanes are fully independent; within a
//! lane, batches execute strictly in formation order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ServeError;
use crate::models::{ModelCatalog, ModelKey, ModelRegistry, ParamValue};
use crate::shutdown::ShutdownGuard;
use crate::telemetry::MetricsAggregator;

use super::batch::BatchConfig;
use super::request::{InferenceRequest, ResponseRx};
use super::worker::LaneWorker;

pub(super) enum LaneMsg {
    Request(InferenceRequest),
    /// Fail everything queued ahead of this marker with the given error.
    Flush(ServeError),
}

/// Routes requests into per-key lanes and owns the lane lifecycle.
pub struct BatchDispatcher {
    catalog: Arc<ModelCatalog>,
    registry: Arc<ModelRegistry>,
    metrics: Arc<MetricsAggregator>,
    config: BatchConfig,
    lanes: DashMap<ModelKey, mpsc::UnboundedSender<LaneMsg>>,
    shutdown: CancellationToken,
    pending: Arc<AtomicUsize>,
}

impl BatchDispatcher {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        registry: Arc<ModelRegistry>,
        metrics: Arc<MetricsAggregator>,
        config: BatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            registry,
            metrics,
            config: config.normalized(),
            lanes: DashMap::new(),
            shutdown,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue one request. Unknown keys fail before anything is enqueued;
    /// a cancelled runtime no longer accepts work.
    pub fn submit(
        &self,
        key: &ModelKey,
        payload: String,
        overrides: BTreeMap<String, ParamValue>,
        shutdown_guard: Option<ShutdownGuard>,
    ) -> Result<ResponseRx, ServeError> {
        if !self.catalog.contains(key) {
            return Err(ServeError::ModelNotFound(key.clone()));
        }
        if self.shutdown.is_cancelled() {
            return Err(ServeError::ShuttingDown);
        }

        let (request, response_rx) =
            InferenceRequest::new(key.clone(), payload, overrides, shutdown_guard);
        self.pending.fetch_add(1, Ordering::SeqCst);

        let sender = self.lane(key);
        if sender.send(LaneMsg::Request(request)).is_err() {
            // Lane already wound down during shutdown.
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ServeError::ShuttingDown);
        }
        Ok(response_rx)
    }

    /// Fail every request currently queued for `key`, including an open
    /// batch window. Requests submitted afterwards are unaffected.
    pub fn flush_pending(&self, key: &ModelKey, error: ServeError) {
        if let Some(sender) = self.lanes.get(key) {
            let _ = sender.send(LaneMsg::Flush(error));
        }
    }

    /// Requests accepted but not yet resolved, across all lanes.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn lane(&self, key: &ModelKey) -> mpsc::UnboundedSender<LaneMsg> {
        let entry = self.lanes.entry(key.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = LaneWorker::new(
                key.clone(),
                Arc::clone(&self.catalog),
                Arc::clone(&self.registry),
                Arc::clone(&self.metrics),
                self.config.clone(),
                self.shutdown.clone(),
                Arc::clone(&self.pending),
            );
            tokio::spawn(worker.run(rx));
            tx
        });
        entry.value().clone()
    }
}
