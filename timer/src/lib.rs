use object_list::{Handle, ObjectList};
use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u64 = 1_000_000_000;

// get the current wall clock in ns
#[inline]
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |dur| dur_to_ns(dur))
}

#[inline]
pub fn dur_to_ns(dur: Duration) -> u64 {
    // Note that a duration is a (u64, u32) (seconds, nanoseconds) pair
    dur.as_secs()
        .saturating_mul(NANOS_PER_SEC)
        .saturating_add(u64::from(dur.subsec_nanos()))
}

pub fn get_timeout_time(dur: Duration) -> u64 {
    now().saturating_add(dur_to_ns(dur))
}

/// Identifies one inserted item so it can be withdrawn before it is due.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TimerKey {
    time: u64,
    handle: Handle,
}

impl TimerKey {
    pub fn time(&self) -> u64 {
        self.time
    }
}

/// All items sharing one due time, in insertion order.
#[derive(Debug)]
pub struct TimerEntry<T> {
    time: u64,
    items: ObjectList<T>,
}

impl<T> TimerEntry<T> {
    pub fn new(time: u64) -> Self {
        TimerEntry {
            time,
            items: ObjectList::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_time(&self) -> u64 {
        self.time
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn push_back(&mut self, t: T) -> Handle {
        self.items.push_back(t)
    }
}

/// Items ordered by due time; items due at the same time keep FIFO order.
#[derive(Debug)]
pub struct TimerList<T> {
    dequeue: VecDeque<TimerEntry<T>>,
    len: usize,
}

impl<T> TimerList<T> {
    pub fn new() -> Self {
        TimerList {
            dequeue: VecDeque::new(),
            len: 0,
        }
    }

    /// Number of items (not distinct due times).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, time: u64, t: T) -> TimerKey {
        let handle = match self.dequeue.binary_search_by(|x| x.time.cmp(&time)) {
            Ok(index) => self.dequeue[index].push_back(t),
            Err(index) => {
                let mut entry = TimerEntry::new(time);
                let handle = entry.push_back(t);
                self.dequeue.insert(index, entry);
                handle
            }
        };
        self.len += 1;
        TimerKey { time, handle }
    }

    /// Withdraws a previously inserted item; `None` if it was already popped or removed.
    pub fn remove(&mut self, key: &TimerKey) -> Option<T> {
        let index = self
            .dequeue
            .binary_search_by(|x| x.time.cmp(&key.time))
            .ok()?;
        let entry = &mut self.dequeue[index];
        let item = entry.items.remove(key.handle)?;
        if entry.is_empty() {
            self.dequeue.remove(index);
        }
        self.len -= 1;
        Some(item)
    }

    pub fn next_time(&self) -> Option<u64> {
        self.dequeue.front().map(TimerEntry::get_time)
    }

    pub fn front(&self) -> Option<&TimerEntry<T>> {
        self.dequeue.front()
    }

    pub fn pop_front(&mut self) -> Option<TimerEntry<T>> {
        let entry = self.dequeue.pop_front()?;
        self.len -= entry.len();
        Some(entry)
    }

    /// Pops the earliest item whose due time is `<= now`.
    pub fn pop_due(&mut self, now: u64) -> Option<T> {
        let entry = self.dequeue.front_mut()?;
        if entry.time > now {
            return None;
        }
        let item = entry.pop_front();
        if entry.is_empty() {
            self.dequeue.pop_front();
        }
        if item.is_some() {
            self.len -= 1;
        }
        item
    }
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        TimerList::new()
    }
}
