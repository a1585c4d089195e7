//! Inference request and result-slot types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ServeError;
use crate::models::{ModelKey, ParamValue};
use crate::shutdown::ShutdownGuard;

/// Payload delivered back through the result slot.
#[derive(Debug, Clone)]
pub struct CompletedInference {
    pub request_id: Uuid,
    pub key: ModelKey,
    pub output: String,
    pub latency_ms: f64,
}

/// Sender half of the single-assignment result slot.
pub type ResponseTx = oneshot::Sender<Result<CompletedInference, ServeError>>;
/// Receiver half held by the caller; dropping it cancels a request that
/// has not yet been dispatched.
pub type ResponseRx = oneshot::Receiver<Result<CompletedInference, ServeError>>;

/// A request owned by the dispatcher from submission until resolution.
pub struct InferenceRequest {
    pub id: Uuid,
    pub key: ModelKey,
    pub payload: String,
    pub overrides: BTreeMap<String, ParamValue>,
    pub submitted_at: Instant,
    response_tx: ResponseTx,
    /// Keeps the drain count honest until resolution.
    _shutdown: Option<ShutdownGuard>,
}

impl InferenceRequest {
    pub fn new(
        key: ModelKey,
        payload: String,
        overrides: BTreeMap<String, ParamValue>,
        shutdown: Option<ShutdownGuard>,
    ) -> (Self, ResponseRx) {
        let (response_tx, response_rx) = oneshot::channel();
        let request = Self {
            id: Uuid::new_v4(),
            key,
            payload,
            overrides,
            submitted_at: Instant::now(),
            response_tx,
            _shutdown: shutdown,
        };
        (request, response_rx)
    }

    /// True when the caller dropped its receiver before the window closed.
    pub fn is_abandoned(&self) -> bool {
        self.response_tx.is_closed()
    }

    /// Milliseconds since submission.
    pub fn latency_ms(&self) -> f64 {
        self.submitted_at.elapsed().as_secs_f64() * 1000.0
    }

    /// Fulfil the slot with an output. Returns the request latency.
    pub fn resolve_ok(self, output: String) -> f64 {
        let latency_ms = self.latency_ms();
        let completed = CompletedInference {
            request_id: self.id,
            key: self.key,
            output,
            latency_ms,
        };
        let _ = self.response_tx.send(Ok(completed));
        latency_ms
    }

    /// Fulfil the slot with a failure. Returns the request latency.
    pub fn resolve_err(self, error: ServeError) -> f64 {
        let latency_ms = self.latency_ms();
        let _ = self.response_tx.send(Err(error));
        latency_ms
    }
}

impl fmt::Debug for InferenceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceRequest")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("abandoned", &self.is_abandoned())
            .finish_non_exhaustive()
    }
}
