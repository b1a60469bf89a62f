//! Task lifecycle: kill, deadlock detection and failure isolation.

mod common;

use common::*;
use open_tasklet::{Channel, Error, Scheduler, Task, TaskExit};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

struct Guard(Log, &'static str);

impl Drop for Guard {
    fn drop(&mut self) {
        record(&self.0, format!("{} dropped", self.1));
    }
}

#[test]
fn killing_a_blocked_task_unwinds_it_and_withdraws_its_operation() {
    init_test_logging();
    let scheduler = test_scheduler();
    let channel: Channel<u8> = Channel::new(&scheduler);
    let log = new_log();
    let (rx, out) = (channel.clone(), log.clone());
    let task = scheduler
        .spawn(move || -> Result<(), Error> {
            let _guard = Guard(out.clone(), "victim");
            rx.receive()?;
            record(&out, "unreachable");
            Ok(())
        })
        .unwrap();
    scheduler.yield_now().unwrap();
    assert!(task.blocked());
    assert_eq!(-1, channel.balance());

    task.kill().unwrap();
    assert!(!task.alive());
    assert_eq!(0, channel.balance());
    assert_eq!(vec!["victim dropped"], events(&log));
    assert_eq!(1, scheduler.stats().killed);
    task.kill().unwrap();
    scheduler.run_until_idle().unwrap();
}

#[test]
fn killing_an_unstarted_task_drops_it() {
    let scheduler = test_scheduler();
    let log = new_log();
    let out = log.clone();
    let task = scheduler.spawn(move || record(&out, "ran")).unwrap();
    task.kill().unwrap();
    assert!(!task.alive());
    assert_eq!(0, scheduler.run_count());
    scheduler.run_until_idle().unwrap();
    assert!(events(&log).is_empty());
}

#[test]
fn a_task_can_kill_itself() {
    init_test_logging();
    let scheduler = test_scheduler();
    let log = new_log();
    let (s, out) = (scheduler.clone(), log.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            let _guard = Guard(out.clone(), "self");
            record(&out, "before");
            if let Some(me) = s.current_task() {
                me.kill()?;
            }
            record(&out, "after");
            Ok(())
        })
        .unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(vec!["before", "self dropped"], events(&log));
    assert_eq!(1, scheduler.stats().killed);
}

#[test]
fn killer_resumes_after_the_victim_is_gone() {
    init_test_logging();
    let scheduler = test_scheduler();
    let channel: Channel<u8> = Channel::new(&scheduler);
    let log = new_log();
    let (rx, out) = (channel.clone(), log.clone());
    let victim = scheduler
        .spawn(move || -> Result<(), Error> {
            let _guard = Guard(out.clone(), "victim");
            record(&out, "victim waits");
            rx.receive()?;
            Ok(())
        })
        .unwrap();
    let out = log.clone();
    scheduler
        .spawn(move || -> Result<(), Error> {
            record(&out, "killer kills");
            victim.kill()?;
            record(&out, format!("killer sees alive={}", victim.alive()));
            Ok(())
        })
        .unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(
        vec![
            "victim waits",
            "killer kills",
            "victim dropped",
            "killer sees alive=false"
        ],
        events(&log)
    );
    assert_eq!(0, channel.balance());
}

#[test]
fn catching_task_exit_is_visible() {
    let payload = panic::catch_unwind(AssertUnwindSafe(|| {
        panic::resume_unwind(Box::new(TaskExit));
    }))
    .unwrap_err();
    assert!(payload.is::<TaskExit>());
}

#[test]
fn all_tasks_blocked_is_a_deadlock() {
    init_test_logging();
    let scheduler = test_scheduler();
    let a: Channel<u8> = Channel::new(&scheduler);
    let b: Channel<u8> = Channel::new(&scheduler);
    let (rx, tx) = (a.clone(), b.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            rx.receive()?;
            tx.send(1)
        })
        .unwrap();
    let (rx, tx) = (b.clone(), a.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            rx.receive()?;
            tx.send(1)
        })
        .unwrap();
    let err = scheduler.run_until_idle().unwrap_err();
    assert!(matches!(err, Error::Deadlock { blocked: 2 }));
    assert!(err.is_deadlock());
    assert_eq!(2, scheduler.blocked_count());
    assert_eq!(0, scheduler.run_count());

    scheduler.kill_all().unwrap();
    assert_eq!(0, scheduler.alive_count());
    assert_eq!(0, a.balance());
    assert_eq!(0, b.balance());
    scheduler.run_until_idle().unwrap();
}

#[test]
fn failing_tasks_do_not_disturb_the_others() {
    init_test_logging();
    let scheduler = test_scheduler();
    let log = new_log();
    scheduler
        .task()
        .label("panics")
        .spawn(|| {
            if true {
                panic!("boom");
            }
        })
        .unwrap();
    scheduler
        .task()
        .label("fails")
        .spawn(|| -> Result<(), String> { Err("bad state".to_string()) })
        .unwrap();
    let (s, out) = (scheduler.clone(), log.clone());
    scheduler
        .task()
        .label("survivor")
        .spawn(move || -> Result<(), Error> {
            s.yield_now()?;
            record(&out, "survivor done");
            Ok(())
        })
        .unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(vec!["survivor done"], events(&log));
    let stats = scheduler.stats();
    assert_eq!(3, stats.spawned);
    assert_eq!(1, stats.panicked);
    assert_eq!(1, stats.failed);
    assert_eq!(1, stats.completed);
}

#[test]
fn schedulers_on_one_thread_are_independent() {
    let first = test_scheduler();
    let second = Scheduler::new();
    let log = new_log();
    let out = log.clone();
    first.spawn(move || record(&out, "first")).unwrap();
    assert_eq!(0, second.alive_count());
    second.run_until_idle().unwrap();
    assert!(events(&log).is_empty());
    first.run_until_idle().unwrap();
    assert_eq!(vec!["first"], events(&log));
}

#[test]
fn removed_task_stays_alive_until_inserted() {
    init_test_logging();
    let scheduler = test_scheduler();
    let log = new_log();
    let (s, out) = (scheduler.clone(), log.clone());
    let task = scheduler
        .spawn(move || -> Result<(), Error> {
            for i in 0..3 {
                record(&out, format!("tick {}", i));
                s.yield_now()?;
            }
            Ok(())
        })
        .unwrap();
    scheduler.yield_now().unwrap();
    task.remove().unwrap();
    assert_eq!(0, scheduler.run_count());

    scheduler.run_until_idle().unwrap();
    assert!(task.alive());
    assert!(!task.blocked());
    assert_eq!(vec!["tick 0"], events(&log));

    task.insert().unwrap();
    task.insert().unwrap();
    assert_eq!(1, scheduler.run_count());
    scheduler.run_until_idle().unwrap();
    assert!(!task.alive());
    assert_eq!(vec!["tick 0", "tick 1", "tick 2"], events(&log));
}

#[test]
fn pause_rules() {
    let scheduler = test_scheduler();
    let channel: Channel<u8> = Channel::new(&scheduler);
    let rx = channel.clone();
    let waiting = scheduler.spawn(move || rx.receive().map(|_| ())).unwrap();
    let outcome = Rc::new(RefCell::new(None));
    let seen = outcome.clone();
    let s = scheduler.clone();
    scheduler
        .spawn(move || {
            let me = s.current_task().unwrap();
            *seen.borrow_mut() = Some(me.remove());
        })
        .unwrap();
    scheduler.yield_now().unwrap();

    assert!(waiting.blocked());
    assert!(matches!(waiting.remove(), Err(Error::Blocked(id)) if id == waiting.id()));
    assert!(matches!(waiting.insert(), Err(Error::Blocked(_))));
    assert!(matches!(
        outcome.borrow_mut().take(),
        Some(Err(Error::CurrentTask(_)))
    ));

    channel.send(1).unwrap();
    scheduler.run_until_idle().unwrap();
    assert!(!waiting.alive());
    assert!(matches!(waiting.insert(), Err(Error::Dead(id)) if id == waiting.id()));
    waiting.remove().unwrap();
}

#[test]
fn run_switches_to_the_task_from_main() {
    let scheduler = test_scheduler();
    let log = new_log();
    let mut tasks = Vec::new();
    for name in ["A", "B"] {
        let out = log.clone();
        tasks.push(scheduler.spawn(move || record(&out, name)).unwrap());
    }
    tasks[1].run().unwrap();
    assert_eq!(vec!["B"], events(&log));
    scheduler.run_until_idle().unwrap();
    assert_eq!(vec!["B", "A"], events(&log));
}

#[test]
fn run_from_a_task_comes_back_after_the_target() {
    init_test_logging();
    let scheduler = test_scheduler();
    let log = new_log();
    let target: Rc<RefCell<Option<Task>>> = Rc::new(RefCell::new(None));
    let (slot, out) = (target.clone(), log.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            record(&out, "A1");
            let next = slot.borrow_mut().take();
            if let Some(task) = next {
                task.run()?;
            }
            record(&out, "A2");
            Ok(())
        })
        .unwrap();
    let out = log.clone();
    let b = scheduler.spawn(move || record(&out, "B")).unwrap();
    *target.borrow_mut() = Some(b);
    scheduler.run_until_idle().unwrap();
    assert_eq!(vec!["A1", "B", "A2"], events(&log));
    assert_eq!(2, scheduler.stats().completed);
}
