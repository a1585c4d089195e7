//! Request batching and dispatch.
//!
//! Turns a stream of concurrently arriving per-model requests into a
//! bounded sequence of batched capability invocations, trading a small
//! configurable latency for amortized per-call overhead.

mod batch;
mod dispatcher;
mod request;
mod worker;

pub use batch::{Batch, BatchConfig};
pub use dispatcher::BatchDispatcher;
pub use request::{CompletedInference, InferenceRequest, ResponseRx, ResponseTx};
