use std::fmt;
use std::rc::{Rc, Weak};

use id_generator::IdGenerator;

use crate::error::Error;
use crate::scheduler::{Scheduler, Shared};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TaskId(usize);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(IdGenerator::next_id("tasklet"))
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Unwind payload raised inside a task that is being killed.
///
/// Catching it keeps the task alive; let it propagate.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TaskExit;

/// What a task entry function may return.
///
/// `Err` ends the task as failed; the error is logged and never reaches the
/// scheduler.
pub trait TaskOutput {
    fn into_outcome(self) -> Result<(), String>;
}

impl TaskOutput for () {
    fn into_outcome(self) -> Result<(), String> {
        Ok(())
    }
}

impl<E: fmt::Display> TaskOutput for Result<(), E> {
    fn into_outcome(self) -> Result<(), String> {
        self.map_err(|err| err.to_string())
    }
}

/// A handle to a spawned task. Cloning it does not clone the task.
#[derive(Clone)]
pub struct Task {
    id: TaskId,
    label: Option<Rc<str>>,
    scheduler: Weak<Shared>,
}

impl Task {
    pub(crate) fn new(id: TaskId, label: Option<Rc<str>>, scheduler: Weak<Shared>) -> Self {
        Task {
            id,
            label,
            scheduler,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn scheduler(&self) -> Option<Scheduler> {
        self.scheduler.upgrade().map(Scheduler::from_shared)
    }

    /// `false` once the entry function returned, failed, or the task was killed.
    pub fn alive(&self) -> bool {
        self.scheduler()
            .map_or(false, |scheduler| scheduler.task_alive(self.id))
    }

    /// `true` while the task waits on a channel.
    pub fn blocked(&self) -> bool {
        self.scheduler()
            .map_or(false, |scheduler| scheduler.task_blocked(self.id))
    }

    /// Terminates the task.
    ///
    /// A task that never ran is dropped. A suspended task has its pending
    /// channel operations withdrawn and unwinds with [`TaskExit`] right away;
    /// the caller continues once it is gone. Killing the calling task unwinds
    /// it and does not return. Killing a dead task does nothing.
    pub fn kill(&self) -> Result<(), Error> {
        match self.scheduler() {
            Some(scheduler) => scheduler.kill(self.id),
            None => Err(Error::Shutdown),
        }
    }

    /// Pauses the task: it stays alive but is not scheduled until
    /// [`Task::insert`] or [`Task::run`].
    ///
    /// Fails for a task blocked on a channel and for the calling task.
    /// Removing a dead task does nothing.
    pub fn remove(&self) -> Result<(), Error> {
        match self.scheduler() {
            Some(scheduler) => scheduler.remove_task(self.id),
            None => Err(Error::Shutdown),
        }
    }

    /// Puts a paused task back at the end of the run queue.
    pub fn insert(&self) -> Result<(), Error> {
        match self.scheduler() {
            Some(scheduler) => scheduler.insert_task(self.id),
            None => Err(Error::Shutdown),
        }
    }

    /// Switches to the task now; the caller is resumed right after it.
    pub fn run(&self) -> Result<(), Error> {
        match self.scheduler() {
            Some(scheduler) => scheduler.run_task(self.id),
            None => Err(Error::Shutdown),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

/// Spawns a task with non-default settings.
#[must_use]
pub struct TaskBuilder<'a> {
    scheduler: &'a Scheduler,
    label: Option<String>,
    stack_size: Option<usize>,
}

impl<'a> TaskBuilder<'a> {
    pub(crate) fn new(scheduler: &'a Scheduler) -> Self {
        TaskBuilder {
            scheduler,
            label: None,
            stack_size: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn spawn<F, R>(self, f: F) -> Result<Task, Error>
    where
        F: FnOnce() -> R + 'static,
        R: TaskOutput,
    {
        self.scheduler.spawn_entry(
            self.label,
            self.stack_size,
            Box::new(move || f().into_outcome()),
        )
    }
}
