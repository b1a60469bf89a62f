use std::time::{Duration, Instant};

use open_tasklet::{Channel, Error, Scheduler};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let scheduler = Scheduler::new();
    let start = Instant::now();
    for millis in [300u64, 100, 200] {
        let s = scheduler.clone();
        scheduler.spawn(move || -> Result<(), Error> {
            s.sleep(Duration::from_millis(millis))?;
            println!("{:>4}ms: slept {}ms", start.elapsed().as_millis(), millis);
            Ok(())
        })?;
    }

    let never: Channel<()> = Channel::with_label(&scheduler, "never");
    match never.receive_timeout(Duration::from_millis(150)) {
        Err(Error::Timeout(after)) => {
            println!("{:>4}ms: gave up after {:?}", start.elapsed().as_millis(), after)
        }
        other => println!("unexpected: {:?}", other),
    }
    scheduler.run_until_idle()
}
