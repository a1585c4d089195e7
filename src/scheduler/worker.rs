//! Lane worker: forms batch windows for one key and executes them in
//! order.
//!
//! The window race is deadline-versus-size: the first request opens the
//! window and arms the clock; the window closes when it fills or when the
//! deadline fires, whichever comes first. The deadline arm is polled
//! first, so a zero timeout degenerates to one request per batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Span};

use crate::error::ServeError;
use crate::models::{InvocationError, InvocationItem, ModelCatalog, ModelKey, ModelRegistry};
use crate::telemetry::{BatchSpan, MetricsAggregator, SpanExt};

use super::batch::{Batch, BatchConfig};
use super::dispatcher::LaneMsg;

pub(super) struct LaneWorker {
    key: ModelKey,
    catalog: Arc<ModelCatalog>,
    registry: Arc<ModelRegistry>,
    metrics: Arc<MetricsAggregator>,
    config: BatchConfig,
    shutdown: CancellationToken,
    pending: Arc<AtomicUsize>,
}

impl LaneWorker {
    pub(super) fn new(
        key: ModelKey,
        catalog: Arc<ModelCatalog>,
        registry: Arc<ModelRegistry>,
        metrics: Arc<MetricsAggregator>,
        config: BatchConfig,
        shutdown: CancellationToken,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            key,
            catalog,
            registry,
            metrics,
            config,
            shutdown,
            pending,
        }
    }

    pub(super) async fn run(self, mut rx: mpsc::UnboundedReceiver<LaneMsg>) {
        loop {
            // Idle until a request opens the next window.
            let first = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(LaneMsg::Request(request)) => request,
                    Some(LaneMsg::Flush(_)) => continue,
                    None => return,
                },
            };

            let mut batch = Batch::new(self.key.clone());
            batch.push(first);
            let deadline = Instant::now() + self.config.batch_timeout;
            let mut flush: Option<ServeError> = None;

            // Deadline-versus-size race. The deadline arm comes first so
            // an already-elapsed deadline wins over buffered arrivals.
            while batch.len() < self.config.max_batch_size {
                tokio::select! {
                    biased;
                    () = sleep_until(deadline) => break,
                    msg = rx.recv() => match msg {
                        Some(LaneMsg::Request(request)) => batch.push(request),
                        Some(LaneMsg::Flush(error)) => {
                            flush = Some(error);
                            break;
                        }
                        None => break,
                    },
                }
            }

            let discarded = batch.discard_abandoned();
            if discarded > 0 {
                self.pending.fetch_sub(discarded, Ordering::SeqCst);
                debug!(model = %self.key, discarded, "dropped cancelled requests at window close");
            }
            if batch.is_empty() {
                continue;
            }

            match flush {
                Some(error) => self.fail_batch(batch, error),
                None => self.execute_batch(batch).await,
            }
        }

        // Shutdown: the open window above was executed; whatever is still
        // queued cannot be served.
        rx.close();
        while let Ok(msg) = rx.try_recv() {
            if let LaneMsg::Request(request) = msg {
                let key = request.key.clone();
                let latency_ms = request.resolve_err(ServeError::ShuttingDown);
                self.metrics.record(&key, latency_ms, false);
                self.pending.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    async fn execute_batch(&self, batch: Batch) {
        let span = BatchSpan::new(&batch.key, batch.len());
        self.dispatch(batch).instrument(span).await;
    }

    async fn dispatch(&self, batch: Batch) {
        let key = batch.key.clone();
        let result = self.invoke(&batch).await;
        Span::current().record_result(&result);

        match result {
            Ok(outputs) => {
                let size = batch.len();
                for (request, output) in batch.requests.into_iter().zip(outputs) {
                    let latency_ms = request.resolve_ok(output);
                    self.metrics.record(&key, latency_ms, true);
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                }
                debug!(model = %key, batch_size = size, "batch resolved");
            }
            Err(error) => {
                warn!(model = %key, error = %error, "batch failed");
                self.fail_batch(batch, error);
            }
        }
    }

    /// One capability invocation for the whole batch. The handle stays
    /// valid for the duration: `ensure_ready` pins it against unload.
    async fn invoke(&self, batch: &Batch) -> Result<Vec<String>, ServeError> {
        let ready = self.registry.ensure_ready(&batch.key).await?;
        let descriptor = self
            .catalog
            .get(&batch.key)
            .ok_or_else(|| ServeError::ModelNotFound(batch.key.clone()))?;

        let items: Vec<InvocationItem> = batch
            .requests
            .iter()
            .map(|request| InvocationItem {
                payload: request.payload.clone(),
                params: descriptor.merged_params(&request.overrides),
            })
            .collect();

        let outputs = ready
            .model()
            .capability()
            .invoke(&items)
            .await
            .map_err(|error| ServeError::Invocation {
                key: batch.key.clone(),
                detail: error.to_string(),
            })?;

        if outputs.len() != items.len() {
            let arity = InvocationError::OutputArity {
                expected: items.len(),
                got: outputs.len(),
            };
            return Err(ServeError::Invocation {
                key: batch.key.clone(),
                detail: arity.to_string(),
            });
        }
        Ok(outputs)
    }

    /// Fan one failure out to every request in the batch.
    fn fail_batch(&self, batch: Batch, error: ServeError) {
        for request in batch.requests {
            let latency_ms = request.resolve_err(error.clone());
            self.metrics.record(&batch.key, latency_ms, false);
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
