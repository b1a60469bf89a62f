use std::rc::Weak;
use std::thread;
use std::time::Duration;

use timer::TimerKey;
use tracing::{debug, trace};

use crate::channel::{Channel, Direction, Preference};
use crate::error::Error;
use crate::scheduler::{Scheduler, Shared};
use crate::select::Selectable;

/// A pending wake-up: the pump sends on `channel` once the due time passes.
///
/// Dropping the alarm withdraws it from the timer list.
pub(crate) struct Alarm {
    scheduler: Weak<Shared>,
    key: TimerKey,
    channel: Channel<()>,
}

impl Alarm {
    pub(crate) fn channel(&self) -> &Channel<()> {
        &self.channel
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        if let Some(shared) = self.scheduler.upgrade() {
            if let Ok(mut state) = shared.state.try_borrow_mut() {
                state.timers.remove(&self.key);
            }
        }
    }
}

impl Scheduler {
    pub(crate) fn alarm(&self, duration: Duration) -> Result<Alarm, Error> {
        let channel = Channel::with_label(self, "alarm");
        //唤醒睡眠者时，泵继续处理其余到期的闹钟
        channel.set_preference(Preference::Sender);
        channel.set_schedule_all(false);
        let due = timer::get_timeout_time(duration);
        let key = self
            .shared
            .state
            .borrow_mut()
            .timers
            .insert(due, channel.clone());
        self.ensure_pump()?;
        Ok(Alarm {
            scheduler: self.downgrade(),
            key,
            channel,
        })
    }

    fn ensure_pump(&self) -> Result<(), Error> {
        if self.shared.state.borrow().pump.is_some() {
            return Ok(());
        }
        let scheduler = self.clone();
        let pump = self
            .task()
            .label("timer-pump")
            .spawn(move || pump(scheduler))?;
        self.shared.state.borrow_mut().pump = Some(pump.id());
        Ok(())
    }

    /// Suspends the caller for at least `duration`; other tasks keep running.
    ///
    /// A zero duration just yields.
    pub fn sleep(&self, duration: Duration) -> Result<(), Error> {
        if duration.is_zero() {
            return match self.yield_now() {
                Err(Error::NoRunnable) => Ok(()),
                other => other,
            };
        }
        let alarm = self.alarm(duration)?;
        alarm.channel().receive()
    }
}

/// Wakes sleepers whose time has come; exits once no alarm is left.
fn pump(scheduler: Scheduler) -> Result<(), Error> {
    debug!("timer pump started");
    loop {
        let now = timer::now();
        let due: Vec<Channel<()>> = {
            let mut state = scheduler.shared.state.borrow_mut();
            let mut due = Vec::new();
            while let Some(channel) = state.timers.pop_due(now) {
                due.push(channel);
            }
            due
        };
        let mut woke = 0;
        for channel in due {
            //等待者可能已经放弃
            if channel.balance() < 0 {
                channel.send(())?;
                woke += 1;
            }
        }
        let next = match scheduler.shared.state.borrow().timers.next_time() {
            Some(next) => next,
            None => break,
        };
        if woke == 0 && scheduler.run_count() <= 1 {
            //只剩泵自己可运行，睡到下一个闹钟
            let wait = Duration::from_nanos(next.saturating_sub(timer::now()))
                .min(scheduler.config().max_idle_wait);
            trace!(?wait, "timer pump idle");
            thread::sleep(wait);
        } else {
            scheduler.yield_now()?;
        }
    }
    debug!("timer pump drained");
    Ok(())
}

impl<T: 'static> Channel<T> {
    /// Like [`Channel::receive`], but gives up with [`Error::Timeout`] after `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Result<T, Error> {
        if self.ready(Direction::Receive) {
            return self.receive();
        }
        if timeout.is_zero() {
            return Err(Error::Timeout(timeout));
        }
        let scheduler = self.scheduler()?;
        let alarm = scheduler.alarm(timeout)?;
        let mut value = self.receive_case();
        let mut expired = alarm.channel().receive_case();
        let mut cases: [&mut dyn Selectable; 2] = [&mut value, &mut expired];
        match scheduler.select_cases(&mut cases)? {
            0 => value
                .take_received()
                .unwrap_or(Err(Error::Invariant("receive resolved without a message"))),
            _ => Err(Error::Timeout(timeout)),
        }
    }
}
