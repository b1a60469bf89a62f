use std::cell::{Cell, RefCell};

use crate::channel::{ChannelId, Direction};
use crate::scheduler::Scheduler;
use crate::task::TaskId;

/// A completed rendezvous, as reported to the channel callback.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChannelEvent {
    pub channel: ChannelId,
    /// The side that completed the operation, `None` for the main context.
    pub task: Option<TaskId>,
    pub direction: Direction,
    /// The waiting side it completed against.
    pub peer: Option<TaskId>,
}

type ScheduleCallback = Box<dyn FnMut(Option<TaskId>, TaskId)>;
type ChannelCallback = Box<dyn FnMut(&ChannelEvent)>;

/// One replaceable callback slot.
///
/// The callback is taken out while it runs so it may call back into the
/// scheduler, replace itself or clear itself.
struct Slot<F: ?Sized> {
    callback: RefCell<Option<Box<F>>>,
    //每次设置或清除都加一，回调运行期间被替换时不再放回旧回调
    generation: Cell<u64>,
}

impl<F: ?Sized> Default for Slot<F> {
    fn default() -> Self {
        Slot {
            callback: RefCell::new(None),
            generation: Cell::new(0),
        }
    }
}

impl<F: ?Sized> Slot<F> {
    fn set(&self, callback: Option<Box<F>>) {
        self.generation.set(self.generation.get() + 1);
        *self.callback.borrow_mut() = callback;
    }

    fn is_set(&self) -> bool {
        self.callback.borrow().is_some()
    }

    fn with(&self, call: impl FnOnce(&mut F)) {
        let taken = self.callback.borrow_mut().take();
        if let Some(mut callback) = taken {
            let generation = self.generation.get();
            call(&mut callback);
            if self.generation.get() == generation {
                *self.callback.borrow_mut() = Some(callback);
            }
        }
    }
}

/// Observer callbacks of one scheduler.
#[derive(Default)]
pub(crate) struct Hooks {
    schedule: Slot<dyn FnMut(Option<TaskId>, TaskId)>,
    channel: Slot<dyn FnMut(&ChannelEvent)>,
}

impl Hooks {
    pub(crate) fn on_switch(&self, prev: Option<TaskId>, next: TaskId) {
        self.schedule.with(|callback| callback(prev, next));
    }

    pub(crate) fn on_rendezvous(&self, event: &ChannelEvent) {
        self.channel.with(|callback| callback(event));
    }

    pub(crate) fn watches_channels(&self) -> bool {
        self.channel.is_set()
    }
}

impl Scheduler {
    /// Calls `callback(prev, next)` whenever the scheduler switches into a
    /// task other than the one it ran last. `prev` is `None` before the
    /// first switch.
    pub fn set_schedule_callback<F>(&self, callback: F)
    where
        F: FnMut(Option<TaskId>, TaskId) + 'static,
    {
        let callback: ScheduleCallback = Box::new(callback);
        self.shared.hooks.schedule.set(Some(callback));
    }

    pub fn clear_schedule_callback(&self) {
        self.shared.hooks.schedule.set(None);
    }

    /// Calls `callback` for every completed rendezvous on this scheduler's
    /// channels, before either side is rescheduled.
    pub fn set_channel_callback<F>(&self, callback: F)
    where
        F: FnMut(&ChannelEvent) + 'static,
    {
        let callback: ChannelCallback = Box::new(callback);
        self.shared.hooks.channel.set(Some(callback));
    }

    pub fn clear_channel_callback(&self) {
        self.shared.hooks.channel.set(None);
    }
}
