use std::time::Duration;

use crate::channel::Preference;
use crate::scheduler::Scheduler;

/// Upper bound on one idle sleep of the timer pump.
const DEFAULT_MAX_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Knobs shared by every task and channel of one scheduler.
#[derive(Debug, Clone)]
pub struct Config {
    /// Usable stack bytes of a task that does not ask for a size.
    pub stack_size: usize,
    /// Preference given to channels created on this scheduler.
    pub preference: Preference,
    /// `schedule_all` given to channels created on this scheduler.
    pub schedule_all: bool,
    /// Seed of the select case picker.
    pub seed: u64,
    /// Longest the timer pump sleeps the thread in one go.
    pub max_idle_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            stack_size: memory_pool::default_size(),
            preference: Preference::Receiver,
            schedule_all: false,
            seed: timer::now() | 1,
            max_idle_wait: DEFAULT_MAX_IDLE_WAIT,
        }
    }
}

/// Fluent construction of a [`Scheduler`].
///
/// ```no_run
/// use open_tasklet::{Preference, Scheduler};
///
/// let scheduler = Scheduler::builder()
///     .stack_size(64 * 1024)
///     .preference(Preference::Neutral)
///     .seed(42)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    #[must_use]
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = size;
        self
    }

    #[must_use]
    pub fn preference(mut self, preference: Preference) -> Self {
        self.config.preference = preference;
        self
    }

    #[must_use]
    pub fn schedule_all(mut self, schedule_all: bool) -> Self {
        self.config.schedule_all = schedule_all;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    #[must_use]
    pub fn max_idle_wait(mut self, wait: Duration) -> Self {
        self.config.max_idle_wait = wait;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn build(self) -> Scheduler {
        Scheduler::with_config(self.config)
    }
}
