use std::rc::{Rc, Weak};

use object_list::Handle;
use tracing::trace;

use crate::channel::{Channel, ChannelId, Direction, Message, Pending, Slot};
use crate::error::Error;
use crate::hook::ChannelEvent;
use crate::scheduler::{OpId, Registration, Scheduler, Shared, Waiter, Withdraw};

mod private {
    use super::*;

    pub trait Sealed {
        fn shared(&self) -> Option<Rc<Shared>>;

        fn is_ready(&self) -> bool;

        /// Completes against the oldest waiting peer. Only valid when ready.
        fn perform(&mut self, scheduler: &Scheduler) -> Result<(), Error>;

        fn enqueue(&mut self, waiter: Waiter, op: OpId) -> Result<Registration, Error>;

        /// Leaves the channel queue; `true` if `resolved` is this case's operation.
        fn settle(&mut self, resolved: Option<OpId>) -> bool;
    }
}

use self::private::Sealed;

/// One operation a [`select`] may complete.
pub trait Selectable: private::Sealed {
    fn channel_id(&self) -> ChannelId;

    fn direction(&self) -> Direction;
}

/// A send or receive on one channel, prepared for [`select`].
///
/// After the select, the winning receive case holds the message
/// ([`Case::take_received`]); a losing send case still holds its value
/// ([`Case::take_unsent`]).
pub struct Case<T: 'static> {
    channel: Channel<T>,
    direction: Direction,
    message: Option<Message<T>>,
    slot: Slot<T>,
    registration: Option<(OpId, Handle)>,
}

impl<T: 'static> Case<T> {
    pub(crate) fn new(
        channel: Channel<T>,
        direction: Direction,
        message: Option<Message<T>>,
    ) -> Self {
        Case {
            channel,
            direction,
            message,
            slot: Slot::default(),
            registration: None,
        }
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    pub fn take_received(&mut self) -> Option<Result<T, Error>> {
        match self.direction {
            Direction::Receive => self.message.take().map(Message::into_result),
            Direction::Send => None,
        }
    }

    pub fn take_unsent(&mut self) -> Option<T> {
        if self.direction != Direction::Send {
            return None;
        }
        match self.message.take() {
            Some(Message::Value(value)) => Some(value),
            other => {
                self.message = other;
                None
            }
        }
    }
}

impl<T: 'static> Sealed for Case<T> {
    fn shared(&self) -> Option<Rc<Shared>> {
        self.channel.shared()
    }

    fn is_ready(&self) -> bool {
        self.channel.ready(self.direction)
    }

    fn perform(&mut self, scheduler: &Scheduler) -> Result<(), Error> {
        let inner = &self.channel.inner;
        let (peer, preference, schedule_all) = {
            let mut state = inner.state.borrow_mut();
            let peer: Pending<T> = state
                .queue
                .pop_front()
                .ok_or(Error::Invariant("ready channel with an empty queue"))?;
            state.balance -= peer.direction.sign();
            (peer, state.preference, state.schedule_all)
        };
        match self.direction {
            Direction::Send => *peer.slot.borrow_mut() = self.message.take(),
            Direction::Receive => self.message = peer.slot.borrow_mut().take(),
        }
        trace!(channel = %inner.id, direction = ?self.direction, peer = ?peer.waiter, "completed");
        let hooks = &scheduler.shared.hooks;
        if hooks.watches_channels() {
            hooks.on_rendezvous(&ChannelEvent {
                channel: inner.id,
                task: scheduler.current_id(),
                direction: self.direction,
                peer: peer.waiter.task(),
            });
        }
        scheduler.after_rendezvous(peer.waiter, peer.op, self.direction, preference, schedule_all)
    }

    fn enqueue(&mut self, waiter: Waiter, op: OpId) -> Result<Registration, Error> {
        let inner = &self.channel.inner;
        let handle = {
            let mut state = inner.state.borrow_mut();
            if state.closing {
                return Err(Error::Closed(inner.id));
            }
            if state.balance * self.direction.sign() < 0 {
                return Err(Error::Invariant("select would rendezvous with itself"));
            }
            *self.slot.borrow_mut() = match self.direction {
                Direction::Send => self.message.take(),
                Direction::Receive => None,
            };
            state.balance += self.direction.sign();
            state.queue.push_back(Pending {
                op,
                waiter,
                direction: self.direction,
                slot: self.slot.clone(),
            })
        };
        self.registration = Some((op, handle));
        let channel = Rc::downgrade(inner);
        let channel: Weak<dyn Withdraw> = channel;
        Ok(Registration {
            op,
            handle,
            channel,
        })
    }

    fn settle(&mut self, resolved: Option<OpId>) -> bool {
        let (op, handle) = match self.registration.take() {
            Some(registration) => registration,
            None => return false,
        };
        if Some(op) == resolved {
            if self.direction == Direction::Receive {
                self.message = self.slot.borrow_mut().take();
            }
            return true;
        }
        self.channel.inner.withdraw(handle);
        if let Some(message) = self.slot.borrow_mut().take() {
            //未发出的数据还给调用者
            if self.direction == Direction::Send {
                self.message = Some(message);
            }
        }
        false
    }
}

impl<T: 'static> Selectable for Case<T> {
    fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    fn direction(&self) -> Direction {
        self.direction
    }
}

impl<T: 'static> Drop for Case<T> {
    fn drop(&mut self) {
        self.settle(None);
    }
}

/// Completes exactly one of `cases` and returns its index.
///
/// If several cases are ready one is picked uniformly at random. If none is,
/// the caller waits on all of them; the first peer to arrive wins and every
/// other case is withdrawn before anything else runs.
pub fn select(cases: &mut [&mut dyn Selectable]) -> Result<usize, Error> {
    let shared = cases
        .first()
        .ok_or(Error::EmptySelect)?
        .shared()
        .ok_or(Error::Shutdown)?;
    Scheduler::from_shared(shared).select(cases)
}

impl Scheduler {
    /// [`select`] over cases that must all belong to this scheduler.
    pub fn select(&self, cases: &mut [&mut dyn Selectable]) -> Result<usize, Error> {
        for case in cases.iter() {
            match case.shared() {
                Some(shared) if self.is(&shared) => {}
                Some(_) => return Err(Error::MixedSchedulers),
                None => return Err(Error::Shutdown),
            }
        }
        self.select_cases(cases)
    }

    pub(crate) fn select_cases(&self, cases: &mut [&mut dyn Selectable]) -> Result<usize, Error> {
        if cases.is_empty() {
            return Err(Error::EmptySelect);
        }
        //蓄水池抽样，每个就绪分支被选中的概率相同
        let mut ready = 0;
        let mut chosen = None;
        for (index, case) in cases.iter().enumerate() {
            if case.is_ready() {
                ready += 1;
                if self.random_below(ready) == 0 {
                    chosen = Some(index);
                }
            }
        }
        if let Some(index) = chosen {
            cases[index].perform(self)?;
            return Ok(index);
        }

        let waiter = self.current_waiter();
        let mut registrations = Vec::with_capacity(cases.len());
        let mut closed = None;
        for index in 0..cases.len() {
            let op = self.next_op();
            match cases[index].enqueue(waiter, op) {
                Ok(registration) => registrations.push(registration),
                Err(Error::Closed(id)) => {
                    closed.get_or_insert(id);
                }
                Err(err) => {
                    for case in cases.iter_mut() {
                        case.settle(None);
                    }
                    return Err(err);
                }
            }
        }
        if registrations.is_empty() {
            return Err(closed.map_or(Error::Invariant("no case could wait"), Error::Closed));
        }
        trace!(?waiter, cases = registrations.len(), "waiting in select");
        self.register(waiter, registrations);
        if let Err(err) = self.block(waiter) {
            for case in cases.iter_mut() {
                case.settle(None);
            }
            return Err(err);
        }
        let resolved = self.take_wake(waiter);
        let mut chosen = None;
        for (index, case) in cases.iter_mut().enumerate() {
            if case.settle(resolved) {
                chosen = Some(index);
            }
        }
        chosen.ok_or(Error::Invariant("woken without a resolved case"))
    }
}
