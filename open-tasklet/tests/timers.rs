//! Sleeping tasks and receive timeouts.

mod common;

use common::*;
use open_tasklet::{Channel, Error};
use std::time::{Duration, Instant};

#[test]
fn sleepers_wake_in_deadline_order_while_others_run() {
    init_test_logging();
    let scheduler = test_scheduler();
    let log = new_log();
    for millis in [40u64, 5, 25, 15] {
        let (s, out) = (scheduler.clone(), log.clone());
        scheduler
            .spawn(move || -> Result<(), Error> {
                s.sleep(Duration::from_millis(millis))?;
                record(&out, format!("slept {}", millis));
                Ok(())
            })
            .unwrap();
    }
    let (s, out) = (scheduler.clone(), log.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            for _ in 0..3 {
                s.yield_now()?;
            }
            record(&out, "busy done");
            Ok(())
        })
        .unwrap();
    let start = Instant::now();
    scheduler.run_until_idle().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(
        vec!["busy done", "slept 5", "slept 15", "slept 25", "slept 40"],
        events(&log)
    );
    assert_eq!(0, scheduler.alive_count());
}

#[test]
fn zero_sleep_only_yields() {
    let scheduler = test_scheduler();
    let log = new_log();
    for name in ["a", "b"] {
        let (s, out) = (scheduler.clone(), log.clone());
        scheduler
            .spawn(move || -> Result<(), Error> {
                record(&out, format!("{} before", name));
                s.sleep(Duration::ZERO)?;
                record(&out, format!("{} after", name));
                Ok(())
            })
            .unwrap();
    }
    scheduler.run_until_idle().unwrap();
    assert_eq!(
        vec!["a before", "b before", "a after", "b after"],
        events(&log)
    );
    assert_eq!(2, scheduler.stats().spawned);
}

#[test]
fn receive_timeout_inside_a_task() {
    init_test_logging();
    let scheduler = test_scheduler();
    let channel: Channel<u8> = Channel::new(&scheduler);
    let log = new_log();
    let (rx, out) = (channel.clone(), log.clone());
    scheduler
        .spawn(move || {
            match rx.receive_timeout(Duration::from_millis(10)) {
                Err(Error::Timeout(_)) => record(&out, "timed out"),
                other => record(&out, format!("unexpected {:?}", other)),
            }
            match rx.receive_timeout(Duration::from_secs(5)) {
                Ok(value) => record(&out, format!("got {}", value)),
                other => record(&out, format!("unexpected {:?}", other)),
            }
        })
        .unwrap();
    let (s, tx) = (scheduler.clone(), channel.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            s.sleep(Duration::from_millis(30))?;
            tx.send(9)
        })
        .unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(vec!["timed out", "got 9"], events(&log));
    assert_eq!(0, channel.balance());
}

#[test]
fn zero_timeout_never_waits() {
    let scheduler = test_scheduler();
    let channel: Channel<u8> = Channel::new(&scheduler);
    assert!(matches!(
        channel.receive_timeout(Duration::ZERO),
        Err(Error::Timeout(_))
    ));
    assert_eq!(0, scheduler.alive_count());
}

#[test]
fn killing_a_sleeper_leaves_other_sleepers_alone() {
    init_test_logging();
    let scheduler = test_scheduler();
    let log = new_log();
    let (s, out) = (scheduler.clone(), log.clone());
    let victim = scheduler
        .spawn(move || -> Result<(), Error> {
            s.sleep(Duration::from_millis(20))?;
            record(&out, "victim woke");
            Ok(())
        })
        .unwrap();
    let (s, out) = (scheduler.clone(), log.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            s.sleep(Duration::from_millis(30))?;
            record(&out, "other woke");
            Ok(())
        })
        .unwrap();
    scheduler.yield_now().unwrap();
    assert!(victim.blocked());

    let start = Instant::now();
    victim.kill().unwrap();
    scheduler.run_until_idle().unwrap();
    assert!(start.elapsed() >= Duration::from_millis(10));
    assert_eq!(vec!["other woke"], events(&log));
    assert_eq!(1, scheduler.stats().killed);
    assert_eq!(0, scheduler.alive_count());
}
