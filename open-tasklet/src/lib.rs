//! Cooperative tasklets and rendezvous channels on a single thread.
//!
//! ```no_run
//! use open_tasklet::{Channel, Error, Scheduler};
//!
//! let scheduler = Scheduler::new();
//! let channel = Channel::new(&scheduler);
//! let tx = channel.clone();
//! scheduler.spawn(move || -> Result<(), Error> {
//!     tx.send(1)?;
//!     tx.send(2)
//! })?;
//! let rx = channel.clone();
//! scheduler.spawn(move || -> Result<(), Error> {
//!     for _ in 0..2 {
//!         println!("{}", rx.receive()?);
//!     }
//!     Ok(())
//! })?;
//! scheduler.run_until_idle()?;
//! # Ok::<(), Error>(())
//! ```

use std::time::Duration;

mod alarm;
mod buffered;
mod channel;
mod config;
mod context;
mod coroutine;
mod error;
mod hook;
mod rng;
mod scheduler;
mod select;
mod sync;
mod task;

pub use buffered::BufferedChannel;
pub use channel::{Channel, ChannelId, Direction, Iter, Message, Preference};
pub use config::{Builder, Config};
pub use error::{Error, Fault};
pub use hook::ChannelEvent;
pub use scheduler::{Scheduler, Stats};
pub use select::{select, Case, Selectable};
pub use sync::{Barrier, Semaphore};
pub use task::{Task, TaskBuilder, TaskExit, TaskId, TaskOutput};

/// 当前任务所在的调度器
fn current_scheduler() -> Result<Scheduler, Error> {
    Scheduler::current().ok_or(Error::NoScheduler)
}

/// 在当前任务的调度器上创建新任务
pub fn spawn<F, R>(f: F) -> Result<Task, Error>
where
    F: FnOnce() -> R + 'static,
    R: TaskOutput,
{
    current_scheduler()?.spawn(f)
}

/// 当前任务让出执行权
pub fn yield_now() -> Result<(), Error> {
    current_scheduler()?.yield_now()
}

/// 当前任务睡眠
pub fn sleep(duration: Duration) -> Result<(), Error> {
    current_scheduler()?.sleep(duration)
}

/// 获取当前任务
pub fn current_task() -> Option<Task> {
    Scheduler::current().and_then(|scheduler| scheduler.current_task())
}
