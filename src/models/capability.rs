//! The pluggable computation boundary.
//!
//! The runtime never performs model math itself; it resolves a
//! [`ModelCapability`] through the descriptor's provider and invokes it
//! once per batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::catalog::{ModelDescriptor, ParamValue};

/// One element of a batched invocation: the payload plus the parameters
/// already merged from descriptor defaults and per-request overrides.
#[derive(Debug, Clone)]
pub struct InvocationItem {
    pub payload: String,
    pub params: BTreeMap<String, ParamValue>,
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("model execution failed: {0}")]
    Execution(String),

    #[error("capability returned {got} outputs for {expected} inputs")]
    OutputArity { expected: usize, got: usize },

    #[error("model weights unavailable: {0}")]
    WeightsUnavailable(String),

    #[error("incompatible parameters: {0}")]
    BadParameters(String),
}

/// A model resident in memory, ready to execute batches.
///
/// Implementations must return exactly one output per input, in input
/// order. The dispatcher relies on positional correspondence to route
/// results back to callers.
#[async_trait]
pub trait ModelCapability: Send + Sync {
    async fn invoke(&self, items: &[InvocationItem]) -> Result<Vec<String>, InvocationError>;

    /// Release held resources. Called once by the loader during unload.
    async fn release(&self) -> Result<(), InvocationError> {
        Ok(())
    }
}

/// Produces capabilities for a descriptor.
///
/// The expensive part of bringing a model into memory lives behind this
/// trait; the registry guarantees at most one concurrent `load` per key.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn load(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn ModelCapability>, InvocationError>;
}
