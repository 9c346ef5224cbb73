use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unrecognized event '{0}'")]
    UnrecognizedEvent(String),

    #[error("no action configured at {}", .0.display())]
    ActionNotFound(PathBuf),

    #[error("action {} failed: {reason}", path.display())]
    ExecutionFailed { path: PathBuf, reason: String },

    #[error("action {} timed out after {}s", path.display(), timeout.as_secs())]
    ActionTimedOut { path: PathBuf, timeout: Duration },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl HookError {
    /// True for failures of the action process itself, as opposed to
    /// lookup or decoding problems.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            HookError::ExecutionFailed { .. } | HookError::ActionTimedOut { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HookError>;
