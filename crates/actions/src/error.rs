//! Action-level error type.

use thiserror::Error;

/// Errors returned by a `Runnable::run` call.
///
/// None of these abort a run: the engine turns every variant into a failed
/// outcome on the owning target.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The process could not be started at all.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started but waiting on it failed.
    #[error("failed to wait on '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The action reported failure without an exit status.
    #[error("action failed: {0}")]
    Failed(String),
}
