//! Runtime configuration loading from environment variables.
//!
//! All values come from `SERVING_*` variables with safe defaults; invalid
//! values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SERVING_MAX_BATCH_SIZE` | 8 | Requests per batch window (min 1) |
//! | `SERVING_BATCH_TIMEOUT_MS` | 100 | Batch window deadline; 0 disables coalescing |
//! | `SERVING_MAX_QUEUE_DEPTH` | 256 | Pending-request cap for readiness |
//! | `SERVING_SHUTDOWN_TIMEOUT` | 30 | Graceful drain timeout (secs, min 1) |
//! | `SERVING_LOG_LEVEL` | info | Tracing filter directive |
//! | `SERVING_LOG_FORMAT` | json | `json` or `pretty` |
//! | `SERVING_LOG_PATH` | (stderr) | Optional log file path |

use std::path::PathBuf;
use std::time::Duration;

use crate::health::HealthConfig;
use crate::scheduler::BatchConfig;
use crate::telemetry::{LogConfig, LogFormat};
use crate::RuntimeConfig;

/// Everything loaded from the environment: runtime knobs plus logging.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub runtime: RuntimeConfig,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

fn load_batch_config() -> BatchConfig {
    let max_batch_size = parse_usize("SERVING_MAX_BATCH_SIZE", 8).max(1);
    let timeout_ms = parse_u64("SERVING_BATCH_TIMEOUT_MS", 100);
    BatchConfig {
        max_batch_size,
        batch_timeout: Duration::from_millis(timeout_ms),
    }
}

fn load_health_config() -> HealthConfig {
    let max_queue_depth = parse_usize("SERVING_MAX_QUEUE_DEPTH", 256).max(1);
    HealthConfig {
        require_model_ready: false,
        max_queue_depth,
    }
}

fn load_log_config() -> LogConfig {
    let level = std::env::var("SERVING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let format = match std::env::var("SERVING_LOG_FORMAT").as_deref() {
        Ok("pretty") => LogFormat::Pretty,
        _ => LogFormat::Json,
    };
    let output_path = std::env::var("SERVING_LOG_PATH").ok().map(PathBuf::from);
    LogConfig {
        format,
        level,
        output_path,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without
/// panicking.
pub fn load() -> EnvConfig {
    let shutdown_secs = parse_u64("SERVING_SHUTDOWN_TIMEOUT", 30).max(1);

    EnvConfig {
        runtime: RuntimeConfig {
            batch: load_batch_config(),
            health: load_health_config(),
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        },
        log: load_log_config(),
    }
}
