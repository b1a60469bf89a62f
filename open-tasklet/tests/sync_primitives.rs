//! Buffered channel, semaphore and barrier built on rendezvous channels.

mod common;

use common::*;
use open_tasklet::{Barrier, BufferedChannel, Error, Semaphore};

#[test]
fn producer_never_waits_for_a_slow_consumer() {
    init_test_logging();
    let scheduler = test_scheduler();
    let queue: BufferedChannel<u32> = BufferedChannel::new(&scheduler);
    let log = new_log();
    let (tx, out) = (queue.clone(), log.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            for i in 0..4 {
                tx.send(i)?;
            }
            tx.close();
            record(&out, "producer done");
            Ok(())
        })
        .unwrap();
    let (rx, out) = (queue.clone(), log.clone());
    scheduler
        .spawn(move || -> Result<(), Error> {
            while !rx.closed() {
                let value = rx.receive()?;
                record(&out, format!("consumed {}", value));
            }
            Ok(())
        })
        .unwrap();
    scheduler.run_until_idle().unwrap();
    assert_eq!(
        vec![
            "producer done",
            "consumed 0",
            "consumed 1",
            "consumed 2",
            "consumed 3"
        ],
        events(&log)
    );
    assert!(queue.closed());
}

#[test]
fn semaphore_serves_waiters_in_order() {
    init_test_logging();
    let scheduler = test_scheduler();
    let semaphore = Semaphore::new(&scheduler, 1);
    let log = new_log();
    for name in ["a", "b", "c"] {
        let (s, sem, out) = (scheduler.clone(), semaphore.clone(), log.clone());
        scheduler
            .spawn(move || -> Result<(), Error> {
                sem.acquire()?;
                record(&out, format!("{} in", name));
                s.yield_now()?;
                record(&out, format!("{} out", name));
                sem.release()
            })
            .unwrap();
    }
    scheduler.run_until_idle().unwrap();
    assert_eq!(
        vec!["a in", "a out", "b in", "b out", "c in", "c out"],
        events(&log)
    );
    assert_eq!(1, semaphore.available());
}

#[test]
fn barrier_can_be_reused() {
    init_test_logging();
    let scheduler = test_scheduler();
    let barrier = Barrier::new(&scheduler, 2);
    let log = new_log();
    for name in ["a", "b"] {
        let (barrier, out) = (barrier.clone(), log.clone());
        scheduler
            .spawn(move || -> Result<(), Error> {
                for round in 0..2 {
                    record(&out, format!("{} reaches {}", name, round));
                    barrier.wait()?;
                }
                Ok(())
            })
            .unwrap();
    }
    scheduler.run_until_idle().unwrap();
    let log = events(&log);
    assert_eq!(4, log.len());
    assert!(log[..2].iter().all(|line| line.ends_with('0')));
    assert!(log[2..].iter().all(|line| line.ends_with('1')));
}
