use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use id_generator::IdGenerator;
use object_list::{Handle, ObjectList};
use tracing::{debug, trace};

use crate::error::{Error, Fault};
use crate::scheduler::{OpId, Scheduler, Shared, Waiter, Withdraw};
use crate::select::Case;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ChannelId(usize);

impl ChannelId {
    fn next() -> Self {
        ChannelId(IdGenerator::next_id("channel"))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    /// `+1` for a send, `-1` for a receive; what one pending operation adds to the balance.
    pub fn sign(self) -> isize {
        match self {
            Direction::Send => 1,
            Direction::Receive => -1,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Send => Direction::Receive,
            Direction::Receive => Direction::Send,
        }
    }
}

/// Which side of a completed rendezvous keeps running.
///
/// When an operation completes against a waiting peer on the favored side,
/// the scheduler switches into the peer at once and resumes the initiator
/// right after it. A peer on the other side is queued at the tail and the
/// initiator carries on. `Neutral` queues the peer and yields the initiator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Preference {
    #[default]
    Receiver,
    Neutral,
    Sender,
}

impl Preference {
    pub fn favored(self) -> Option<Direction> {
        match self {
            Preference::Receiver => Some(Direction::Receive),
            Preference::Neutral => None,
            Preference::Sender => Some(Direction::Send),
        }
    }

    pub(crate) fn favors(self, direction: Direction) -> bool {
        self.favored() == Some(direction)
    }
}

/// What travels through a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    Value(T),
    Fault(Fault),
}

impl<T> Message<T> {
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Message::Value(value) => Ok(value),
            Message::Fault(fault) => Err(Error::Fault(fault)),
        }
    }
}

pub(crate) type Slot<T> = Rc<RefCell<Option<Message<T>>>>;

/// A blocked operation sitting in a channel queue.
pub(crate) struct Pending<T> {
    pub(crate) op: OpId,
    pub(crate) waiter: Waiter,
    pub(crate) direction: Direction,
    //发送方的数据，或接收方的收件位置
    pub(crate) slot: Slot<T>,
}

pub(crate) struct ChannelState<T> {
    //正数为等待中的发送方数量，负数为接收方数量
    pub(crate) balance: isize,
    pub(crate) queue: ObjectList<Pending<T>>,
    pub(crate) preference: Preference,
    pub(crate) schedule_all: bool,
    pub(crate) closing: bool,
}

pub(crate) struct ChannelInner<T> {
    pub(crate) id: ChannelId,
    label: Option<String>,
    scheduler: Weak<Shared>,
    pub(crate) state: RefCell<ChannelState<T>>,
}

impl<T> Withdraw for ChannelInner<T> {
    fn withdraw(&self, handle: Handle) {
        let mut state = self.state.borrow_mut();
        if let Some(pending) = state.queue.remove(handle) {
            state.balance -= pending.direction.sign();
            trace!(channel = %self.id, balance = state.balance, "withdrew pending operation");
        }
    }
}

/// A rendezvous point between tasks.
///
/// A send completes only together with a receive. Whoever arrives first
/// waits in the channel queue; waiters are served oldest first.
pub struct Channel<T: 'static> {
    pub(crate) inner: Rc<ChannelInner<T>>,
}

impl<T: 'static> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Channel<T> {
    pub fn new(scheduler: &Scheduler) -> Self {
        Channel::create(scheduler, None)
    }

    pub fn with_label(scheduler: &Scheduler, label: impl Into<String>) -> Self {
        Channel::create(scheduler, Some(label.into()))
    }

    fn create(scheduler: &Scheduler, label: Option<String>) -> Self {
        let config = scheduler.config();
        Channel {
            inner: Rc::new(ChannelInner {
                id: ChannelId::next(),
                label,
                scheduler: scheduler.downgrade(),
                state: RefCell::new(ChannelState {
                    balance: 0,
                    queue: ObjectList::new(),
                    preference: config.preference,
                    schedule_all: config.schedule_all,
                    closing: false,
                }),
            }),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn scheduler(&self) -> Result<Scheduler, Error> {
        self.inner
            .scheduler
            .upgrade()
            .map(Scheduler::from_shared)
            .ok_or(Error::Shutdown)
    }

    pub(crate) fn shared(&self) -> Option<Rc<Shared>> {
        self.inner.scheduler.upgrade()
    }

    /// Pending senders minus pending receivers.
    pub fn balance(&self) -> isize {
        self.inner.state.borrow().balance
    }

    /// Whether an operation in `direction` would complete without blocking.
    pub fn ready(&self, direction: Direction) -> bool {
        self.balance() * direction.sign() < 0
    }

    pub fn preference(&self) -> Preference {
        self.inner.state.borrow().preference
    }

    pub fn set_preference(&self, preference: Preference) {
        self.inner.state.borrow_mut().preference = preference;
    }

    pub fn schedule_all(&self) -> bool {
        self.inner.state.borrow().schedule_all
    }

    /// When set, every rendezvous queues the peer and yields, whatever the preference.
    pub fn set_schedule_all(&self, schedule_all: bool) {
        self.inner.state.borrow_mut().schedule_all = schedule_all;
    }

    /// Refuses new waiters from now on. Waiters already queued still complete.
    pub fn close(&self) {
        self.inner.state.borrow_mut().closing = true;
        debug!(channel = %self.inner.id, "closing");
    }

    pub fn open(&self) {
        self.inner.state.borrow_mut().closing = false;
        debug!(channel = %self.inner.id, "reopened");
    }

    pub fn closing(&self) -> bool {
        self.inner.state.borrow().closing
    }

    /// Closing and drained.
    pub fn closed(&self) -> bool {
        let state = self.inner.state.borrow();
        state.closing && state.balance == 0
    }

    pub fn send(&self, value: T) -> Result<(), Error> {
        self.send_message(Message::Value(value))
    }

    pub fn send_message(&self, message: Message<T>) -> Result<(), Error> {
        let scheduler = self.scheduler()?;
        let mut case = Case::new(self.clone(), Direction::Send, Some(message));
        scheduler.select_cases(&mut [&mut case]).map(|_| ())
    }

    /// Sends `fault` instead of a value; the receiver gets it as [`Error::Fault`].
    pub fn send_fault(&self, fault: Fault) -> Result<(), Error> {
        let origin = self.scheduler()?.current_id();
        self.send_message(Message::Fault(fault.with_origin(origin)))
    }

    pub fn send_exception(
        &self,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), Error> {
        self.send_fault(Fault::new(kind, message))
    }

    /// Sends `error` as a fault whose kind is the error's type name.
    pub fn send_error<E: std::error::Error>(&self, error: &E) -> Result<(), Error> {
        self.send_exception(std::any::type_name::<E>(), error.to_string())
    }

    pub fn receive(&self) -> Result<T, Error> {
        let scheduler = self.scheduler()?;
        let mut case = self.receive_case();
        scheduler.select_cases(&mut [&mut case])?;
        case.take_received()
            .unwrap_or(Err(Error::Invariant("receive resolved without a message")))
    }

    pub fn send_case(&self, value: T) -> Case<T> {
        Case::new(self.clone(), Direction::Send, Some(Message::Value(value)))
    }

    pub fn receive_case(&self) -> Case<T> {
        Case::new(self.clone(), Direction::Receive, None)
    }

    /// Sends every item in turn; returns how many were sent.
    pub fn send_sequence<I>(&self, items: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = T>,
    {
        let mut sent = 0;
        for item in items {
            self.send(item)?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Receives until the channel is closed.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            channel: self,
            done: false,
        }
    }
}

impl<T: 'static> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Channel");
        debug.field("id", &self.inner.id).field("label", &self.inner.label);
        if let Ok(state) = self.inner.state.try_borrow() {
            debug
                .field("balance", &state.balance)
                .field("preference", &state.preference)
                .field("closing", &state.closing);
        }
        debug.finish()
    }
}

pub struct Iter<'a, T: 'static> {
    channel: &'a Channel<T>,
    done: bool,
}

impl<'a, T: 'static> Iterator for Iter<'a, T> {
    type Item = Result<T, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.channel.closed() {
            return None;
        }
        match self.channel.receive() {
            Ok(value) => Some(Ok(value)),
            Err(Error::Closed(_)) => {
                self.done = true;
                None
            }
            //故障消息不结束迭代
            Err(Error::Fault(fault)) => Some(Err(Error::Fault(fault))),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
