use std::cell::Cell;
use std::rc::Rc;

use tracing::trace;

use crate::buffered::BufferedChannel;
use crate::channel::{Channel, Preference};
use crate::error::Error;
use crate::scheduler::Scheduler;

/// Counting semaphore for tasks of one scheduler.
///
/// Waiters are served in arrival order.
#[derive(Clone, Debug)]
pub struct Semaphore {
    count: Rc<Cell<usize>>,
    channel: Channel<()>,
}

impl Semaphore {
    pub fn new(scheduler: &Scheduler, permits: usize) -> Self {
        let channel = Channel::with_label(scheduler, "semaphore");
        //release 不切换到被唤醒的任务
        channel.set_preference(Preference::Sender);
        Semaphore {
            count: Rc::new(Cell::new(permits)),
            channel,
        }
    }

    pub fn available(&self) -> usize {
        self.count.get()
    }

    /// Number of tasks waiting for a permit.
    pub fn waiting(&self) -> usize {
        usize::try_from(-self.channel.balance()).unwrap_or(0)
    }

    pub fn acquire(&self) -> Result<(), Error> {
        if self.try_acquire() {
            return Ok(());
        }
        trace!(channel = %self.channel.id(), "waiting for a permit");
        self.channel.receive()
    }

    pub fn try_acquire(&self) -> bool {
        match self.count.get() {
            0 => false,
            n => {
                self.count.set(n - 1);
                true
            }
        }
    }

    /// Hands the permit to the oldest waiter, if any.
    pub fn release(&self) -> Result<(), Error> {
        if self.channel.balance() < 0 {
            self.channel.send(())
        } else {
            self.count.set(self.count.get() + 1);
            Ok(())
        }
    }
}

/// Holds tasks until `parties` of them have arrived, then releases them all.
#[derive(Clone, Debug)]
pub struct Barrier {
    parties: usize,
    arrived: Rc<Cell<usize>>,
    queue: BufferedChannel<()>,
}

impl Barrier {
    pub fn new(scheduler: &Scheduler, parties: usize) -> Self {
        Barrier {
            parties: parties.max(1),
            arrived: Rc::new(Cell::new(0)),
            queue: BufferedChannel::new(scheduler),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Waits for the rest of the group. Exactly one caller per round gets `true`.
    pub fn wait(&self) -> Result<bool, Error> {
        let arrived = self.arrived.get() + 1;
        let leader = arrived == self.parties;
        if leader {
            self.arrived.set(0);
            trace!(parties = self.parties, "barrier released");
            for _ in 0..self.parties {
                self.queue.send(())?;
            }
        } else {
            self.arrived.set(arrived);
        }
        self.queue.receive()?;
        Ok(leader)
    }
}

#[cfg(test)]
mod tests {
    use super::{Barrier, Semaphore};
    use crate::error::Error;
    use crate::scheduler::Scheduler;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn semaphore_limits_concurrency() {
        let scheduler = Scheduler::new();
        let semaphore = Semaphore::new(&scheduler, 2);
        let inside = Rc::new(RefCell::new(0));
        let peak = Rc::new(RefCell::new(0));
        for _ in 0..5 {
            let (s, sem, inside, peak) = (
                scheduler.clone(),
                semaphore.clone(),
                inside.clone(),
                peak.clone(),
            );
            scheduler
                .spawn(move || -> Result<(), Error> {
                    sem.acquire()?;
                    *inside.borrow_mut() += 1;
                    let now = *inside.borrow();
                    if now > *peak.borrow() {
                        *peak.borrow_mut() = now;
                    }
                    s.yield_now()?;
                    *inside.borrow_mut() -= 1;
                    sem.release()
                })
                .unwrap();
        }
        scheduler.run_until_idle().unwrap();
        assert_eq!(2, *peak.borrow());
        assert_eq!(2, semaphore.available());
        assert_eq!(0, semaphore.waiting());
    }

    #[test]
    fn try_acquire_does_not_block() {
        let scheduler = Scheduler::new();
        let semaphore = Semaphore::new(&scheduler, 1);
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());
        semaphore.release().unwrap();
        assert_eq!(1, semaphore.available());
    }

    #[test]
    fn barrier_releases_the_whole_group() {
        let scheduler = Scheduler::new();
        let barrier = Barrier::new(&scheduler, 3);
        let log = Rc::new(RefCell::new(Vec::new()));
        let leaders = Rc::new(RefCell::new(0));
        for name in ["a", "b", "c"] {
            let (barrier, log, leaders) = (barrier.clone(), log.clone(), leaders.clone());
            scheduler
                .spawn(move || -> Result<(), Error> {
                    log.borrow_mut().push(format!("{} arrives", name));
                    if barrier.wait()? {
                        *leaders.borrow_mut() += 1;
                    }
                    log.borrow_mut().push(format!("{} leaves", name));
                    Ok(())
                })
                .unwrap();
        }
        scheduler.run_until_idle().unwrap();
        let log = log.borrow();
        assert_eq!(6, log.len());
        assert!(log[..3].iter().all(|line| line.ends_with("arrives")));
        assert!(log[3..].iter().all(|line| line.ends_with("leaves")));
        assert_eq!(1, *leaders.borrow());
        assert_eq!(3, barrier.parties());
    }
}
