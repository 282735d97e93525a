use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ColoringError, Result};
use crate::trace::TraceConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One loop over all nodes per phase.
    #[default]
    Sequential,
    /// One tokio task per node with per-node inboxes.
    Concurrent,
}

/// Settings passed explicitly to a colouring run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub trace: TraceConfig,
    /// Abort with `RoundLimitExceeded` after this many rounds. Unbounded if unset.
    pub max_rounds: Option<u64>,
    /// Seed for reproducible runs; drawn from the OS otherwise.
    pub seed: Option<u64>,
    pub mode: ExecutionMode,
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ColoringError::config(format!("failed to read config '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == Some(0) {
            return Err(ColoringError::config("max_rounds must be at least 1"));
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u64) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_trace(mut self, trace: TraceConfig) -> Self {
        self.trace = trace;
        self
    }
}
