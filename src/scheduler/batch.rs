//! Batch window configuration and assembly.

use std::time::Duration;

use crate::models::ModelKey;

use super::request::InferenceRequest;

/// Controls how requests coalesce into batches.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Requests per invocation; a window closes as soon as it is full.
    pub max_batch_size: usize,
    /// How long an open window waits for more requests. Zero dispatches
    /// every request on its own.
    pub batch_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 8,
            batch_timeout: Duration::from_millis(100),
        }
    }
}

impl BatchConfig {
    /// Clamp to usable values: at least one request per batch.
    pub fn normalized(mut self) -> Self {
        self.max_batch_size = self.max_batch_size.max(1);
        self
    }
}

/// Ordered requests for one key, consumed by a single capability
/// invocation. Exists only between window close and resolution.
#[derive(Debug)]
pub struct Batch {
    pub key: ModelKey,
    pub requests: Vec<InferenceRequest>,
}

impl Batch {
    pub fn new(key: ModelKey) -> Self {
        Self {
            key,
            requests: Vec::new(),
        }
    }

    pub fn push(&mut self, request: InferenceRequest) {
        self.requests.push(request);
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Drop entries whose caller went away before the window closed.
    /// Returns how many were removed.
    pub fn discard_abandoned(&mut self) -> usize {
        let before = self.requests.len();
        self.requests.retain(|request| !request.is_abandoned());
        before - self.requests.len()
    }
}
