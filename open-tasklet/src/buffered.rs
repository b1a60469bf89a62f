use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::channel::{Channel, ChannelId, Message, Preference};
use crate::error::{Error, Fault};
use crate::scheduler::Scheduler;

/// A channel whose sender never blocks.
///
/// A message goes straight to a waiting receiver when there is one;
/// otherwise it is queued and the sender carries on.
pub struct BufferedChannel<T: 'static> {
    channel: Channel<T>,
    buffer: Rc<RefCell<VecDeque<Message<T>>>>,
}

impl<T: 'static> Clone for BufferedChannel<T> {
    fn clone(&self) -> Self {
        BufferedChannel {
            channel: self.channel.clone(),
            buffer: self.buffer.clone(),
        }
    }
}

impl<T: 'static> BufferedChannel<T> {
    pub fn new(scheduler: &Scheduler) -> Self {
        let channel = Channel::new(scheduler);
        channel.set_preference(Preference::Sender);
        BufferedChannel {
            channel,
            buffer: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.channel.id()
    }

    /// Queued messages, or minus the number of waiting receivers.
    pub fn balance(&self) -> isize {
        let queued = self.buffer.borrow().len();
        if queued > 0 {
            queued as isize
        } else {
            self.channel.balance()
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.borrow().is_empty()
    }

    pub fn send(&self, value: T) -> Result<(), Error> {
        self.push(Message::Value(value))
    }

    pub fn send_fault(&self, fault: Fault) -> Result<(), Error> {
        let origin = self.channel.scheduler()?.current_id();
        self.push(Message::Fault(fault.with_origin(origin)))
    }

    pub fn send_exception(
        &self,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), Error> {
        self.send_fault(Fault::new(kind, message))
    }

    fn push(&self, message: Message<T>) -> Result<(), Error> {
        if self.channel.closing() {
            return Err(Error::Closed(self.channel.id()));
        }
        if self.channel.balance() < 0 {
            //有接收方在等，直接交给它
            return self.channel.send_message(message);
        }
        let mut buffer = self.buffer.borrow_mut();
        buffer.push_back(message);
        trace!(channel = %self.channel.id(), queued = buffer.len(), "buffered");
        Ok(())
    }

    /// Takes the oldest queued message, or waits for the next send.
    pub fn receive(&self) -> Result<T, Error> {
        let queued = self.buffer.borrow_mut().pop_front();
        match queued {
            Some(message) => message.into_result(),
            None => self.channel.receive(),
        }
    }

    /// Refuses further sends. Queued messages can still be received.
    pub fn close(&self) {
        self.channel.close();
    }

    pub fn closing(&self) -> bool {
        self.channel.closing()
    }

    /// Closing, and nothing is queued or waiting.
    pub fn closed(&self) -> bool {
        self.is_empty() && self.channel.closed()
    }
}

impl<T: 'static> fmt::Debug for BufferedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedChannel")
            .field("channel", &self.channel)
            .field("queued", &self.len())
            .finish()
    }
}
