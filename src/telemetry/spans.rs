//! Span helpers for batch dispatch tracing.

use tracing::{info_span, Span};

use crate::models::ModelKey;

/// Extension trait for recording operation outcomes into spans.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for per-batch dispatch spans.
pub struct BatchSpan;

impl BatchSpan {
    /// Span covering one batch from window close to resolution.
    pub fn new(model: &ModelKey, batch_size: usize) -> Span {
        info_span!(
            "batch_dispatch",
            model = %model,
            batch_size = batch_size,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
