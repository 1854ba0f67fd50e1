use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to spawn {command}: {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Abnormal exit status standing in for a process that never ran,
    /// following the shell convention: 127 for a missing executable, 126
    /// for one that could not be run.
    pub fn abnormal_status(&self) -> i32 {
        match self {
            ProcessError::CommandNotFound(_) => 127,
            ProcessError::SpawnFailed { .. } => 126,
        }
    }
}
