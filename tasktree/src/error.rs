use crate::task::TaskRef;

/// Errors returned by runner operations that need a live task.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The handle points to a task that has already been swept.
    #[error("{0} no longer exists")]
    Stale(TaskRef),

    /// New children cannot be attached to a parent that already finished,
    /// they would never be cascade-aborted.
    #[error("parent {0} already finished, cannot adopt new children")]
    ParentFinished(TaskRef),

    /// The runner is tearing down and does not accept new tasks.
    #[error("runner is shutting down")]
    ShuttingDown,

    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),
}

impl TaskError {
    /// The operation targeted a task that is gone. Callers that only care
    /// about live tasks can usually ignore this.
    pub fn is_stale(&self) -> bool {
        matches!(self, TaskError::Stale(_))
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
