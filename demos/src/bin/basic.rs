use open_tasklet::{Channel, Error, Scheduler};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let scheduler = Scheduler::new();
    let channel = Channel::with_label(&scheduler, "numbers");
    let tx = channel.clone();
    scheduler.task().label("A").spawn(move || -> Result<(), Error> {
        tx.send(1)?;
        tx.send(2)
    })?;
    let rx = channel.clone();
    scheduler.task().label("B").spawn(move || -> Result<(), Error> {
        for _ in 0..2 {
            println!("{}", rx.receive()?);
        }
        Ok(())
    })?;
    scheduler.run_until_idle()
}
