//! Structured run logging utilities.
//!
//! Every line carries the run id and seed so a warning in a long log can be
//! traced back to the manifest it belongs to.

use tracing::{info, warn, Span};
use uuid::Uuid;

/// Run logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    seed: u64,
}

impl RunLogger {
    /// Create a logger for a new run with a fresh run id.
    pub fn new(seed: u64) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            seed,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            seed = self.seed,
            "Run started: {}", message
        );
    }

    /// Log a stage transition.
    pub fn log_progress(&self, stage: &str, message: &str) {
        info!(
            run_id = %self.run_id,
            seed = self.seed,
            stage = stage,
            "{}", message
        );
    }

    /// Log a non-fatal condition: a skip, a fallback, a mismatch or a flag.
    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            seed = self.seed,
            "Run warning: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            seed = self.seed,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Create a tracing span for this run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("run", run_id = %self.run_id, seed = self.seed)
    }
}
