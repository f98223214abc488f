//! Engine configuration.

use std::path::PathBuf;

use crate::models::Policy;
use crate::EngineError;

/// Tuning knobs for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Token pool size for top-level requests.
    pub jobs: usize,
    /// Policy for top-level requests.
    pub policy: Policy,
    /// Walk the graph without running external work.
    pub dry_run: bool,
    /// Where per-target log files go; no files are written when `None`.
    pub log_dir: Option<PathBuf>,
    /// Nesting level of top-level requests (non-zero inside a child process).
    pub depth: u32,
    /// Nested invocations deeper than this fail instead of recursing.
    pub max_depth: u32,
    /// argv prefix that re-invokes the engine binary, used by
    /// child-process recursion.
    pub self_command: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            policy: Policy::FailFast,
            dry_run: false,
            log_dir: None,
            depth: 0,
            max_depth: 16,
            self_command: None,
        }
    }
}

impl EngineConfig {
    /// # Errors
    /// [`EngineError::InvalidJobs`] if `jobs` is zero.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.jobs == 0 {
            return Err(EngineError::InvalidJobs(self.jobs));
        }
        Ok(())
    }
}
