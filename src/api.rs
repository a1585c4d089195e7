//! Serving operations consumed by the transport layer.
//!
//! These methods are the whole external surface: model listing, explicit
//! load/unload, single and batched inference, metrics, health, and
//! graceful shutdown.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::ServeError;
use crate::health::HealthReport;
use crate::models::{LoadState, ModelKey, ModelKind, ParamValue};
use crate::scheduler::{CompletedInference, ResponseRx};
use crate::shutdown::ShutdownResult;
use crate::telemetry::MetricsSnapshot;
use crate::Runtime;

/// One element of a batched `infer_batch` call.
#[derive(Debug, Clone)]
pub struct InferenceCall {
    pub key: ModelKey,
    pub text: String,
    pub params: BTreeMap<String, ParamValue>,
}

/// Result of a completed inference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResponse {
    pub request_id: Uuid,
    pub model_used: ModelKey,
    pub output: String,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<CompletedInference> for InferenceResponse {
    fn from(completed: CompletedInference) -> Self {
        Self {
            request_id: completed.request_id,
            model_used: completed.key,
            output: completed.output,
            latency_ms: completed.latency_ms,
            timestamp: Utc::now(),
        }
    }
}

/// Catalogue entry plus its current load state.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatusEntry {
    pub key: ModelKey,
    pub kind: ModelKind,
    pub description: String,
    pub defaults: BTreeMap<String, ParamValue>,
    pub state: LoadState,
}

impl Runtime {
    /// All known models with their load state, in catalogue order.
    pub fn list_models(&self) -> Vec<ModelStatusEntry> {
        self.catalog
            .list()
            .into_iter()
            .map(|descriptor| ModelStatusEntry {
                key: descriptor.key().clone(),
                kind: descriptor.kind(),
                description: descriptor.description().to_string(),
                defaults: descriptor.defaults().clone(),
                state: self
                    .registry
                    .status(descriptor.key())
                    .unwrap_or(LoadState::Unloaded),
            })
            .collect()
    }

    /// Load a model eagerly. Returns the resulting state.
    pub async fn load_model(&self, key: &ModelKey) -> Result<LoadState, ServeError> {
        self.registry.ensure_ready(key).await.map(|_| LoadState::Ready)
    }

    /// Unload a model. Requests still queued behind it resolve with
    /// `ModelUnloadFailed` rather than being dropped; batches already
    /// dispatched keep their handle until they complete.
    pub async fn unload_model(&self, key: &ModelKey) -> Result<LoadState, ServeError> {
        if !self.catalog.contains(key) {
            return Err(ServeError::ModelNotFound(key.clone()));
        }
        self.dispatcher.flush_pending(
            key,
            ServeError::ModelUnloadFailed {
                key: key.clone(),
                detail: "model unloaded while request was queued".to_string(),
            },
        );
        self.registry.unload(key).await
    }

    /// Run one inference request through the batching dispatcher.
    pub async fn infer(
        &self,
        key: &ModelKey,
        text: impl Into<String>,
        params: BTreeMap<String, ParamValue>,
    ) -> Result<InferenceResponse, ServeError> {
        let response_rx = self.submit(key, text.into(), params)?;
        await_response(response_rx).await
    }

    /// Run several requests. All are submitted before any result is
    /// awaited, so concurrent elements for the same model share a batch
    /// window. Results are positional; each element succeeds or fails
    /// independently.
    pub async fn infer_batch(
        &self,
        calls: Vec<InferenceCall>,
    ) -> Vec<Result<InferenceResponse, ServeError>> {
        let submitted: Vec<Result<ResponseRx, ServeError>> = calls
            .into_iter()
            .map(|call| self.submit(&call.key, call.text, call.params))
            .collect();

        join_all(submitted.into_iter().map(|slot| async move {
            match slot {
                Ok(response_rx) => await_response(response_rx).await,
                Err(error) => Err(error),
            }
        }))
        .await
    }

    /// Current request counters.
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Liveness/readiness report for orchestrator probes.
    pub fn health_report(&self) -> HealthReport {
        self.health.report(
            self.coordinator.state(),
            self.registry.ready_count(),
            self.dispatcher.pending_count(),
        )
    }

    /// Drain live requests within the configured timeout, then unload
    /// every Ready model. Batches already dispatched complete; requests
    /// still queued resolve with `ShuttingDown`.
    pub async fn shutdown(&self) -> ShutdownResult {
        info!("runtime shutdown initiated");
        self.cancel.cancel();
        let result = self.coordinator.initiate(self.shutdown_timeout).await;

        for (key, state) in self.registry.list_status() {
            if state == LoadState::Ready {
                if let Err(error) = self.registry.unload(&key).await {
                    tracing::warn!(model = %key, error = %error, "unload during shutdown failed");
                }
            }
        }
        info!(result = ?result, "runtime shutdown complete");
        result
    }

    fn submit(
        &self,
        key: &ModelKey,
        text: String,
        params: BTreeMap<String, ParamValue>,
    ) -> Result<ResponseRx, ServeError> {
        let guard = self.coordinator.track().ok_or(ServeError::ShuttingDown)?;
        self.dispatcher.submit(key, text, params, Some(guard))
    }
}

async fn await_response(response_rx: ResponseRx) -> Result<InferenceResponse, ServeError> {
    let completed = response_rx.await.map_err(|_| ServeError::ShuttingDown)??;
    Ok(InferenceResponse::from(completed))
}
