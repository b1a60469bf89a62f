use std::fmt;
use std::time::Duration;

use memory_pool::memory::MemoryError;
use thiserror::Error;

use crate::channel::ChannelId;
use crate::task::TaskId;

/// A failure sent through a channel in place of a value.
///
/// The sender's call succeeds; the receiver gets it back as
/// [`Error::Fault`] from `receive`, in its own context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    kind: String,
    message: String,
    origin: Option<TaskId>,
}

impl Fault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Fault {
            kind: kind.into(),
            message: message.into(),
            origin: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The task that sent the fault, `None` if it came from the main context.
    pub fn origin(&self) -> Option<TaskId> {
        self.origin
    }

    pub(crate) fn with_origin(mut self, origin: Option<TaskId>) -> Self {
        self.origin = origin;
        self
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Fault {}

#[derive(Debug, Error)]
pub enum Error {
    #[error("select called without any case")]
    EmptySelect,

    #[error("{0} is closed")]
    Closed(ChannelId),

    #[error("no runnable task")]
    NoRunnable,

    /// Tasks are still alive but nothing can run.
    #[error("deadlock: {blocked} task(s) blocked and nothing runnable")]
    Deadlock { blocked: usize },

    #[error("scheduler has been dropped")]
    Shutdown,

    #[error("select mixes channels of different schedulers")]
    MixedSchedulers,

    #[error("scheduler is already running on this context")]
    Reentrant,

    #[error("no scheduler is driving the current thread")]
    NoScheduler,

    #[error("{0} is blocked on a channel")]
    Blocked(TaskId),

    #[error("{0} has ended")]
    Dead(TaskId),

    /// A task tried to take itself off the run queue.
    #[error("{0} is the running task and cannot be removed")]
    CurrentTask(TaskId),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("failed to allocate a task stack: {0}")]
    Stack(#[from] MemoryError),

    #[error("runtime invariant violated: {0}")]
    Invariant(&'static str),
}

impl Error {
    pub fn is_deadlock(&self) -> bool {
        matches!(self, Error::Deadlock { .. })
    }
}
