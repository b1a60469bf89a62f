use open_tasklet::{select, Channel, Error, Preference, Scheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let scheduler = Scheduler::builder().preference(Preference::Neutral).build();
    let jobs: Channel<u32> = Channel::with_label(&scheduler, "jobs");
    let urgent: Channel<u32> = Channel::with_label(&scheduler, "urgent");
    let results: Channel<(String, u32)> = Channel::with_label(&scheduler, "results");

    for name in ["worker-1", "worker-2"] {
        let (jobs, urgent, results) = (jobs.clone(), urgent.clone(), results.clone());
        scheduler
            .task()
            .label(name)
            .spawn(move || -> Result<(), Error> {
                loop {
                    let mut normal = jobs.receive_case();
                    let mut high = urgent.receive_case();
                    let job = match select(&mut [&mut normal, &mut high])? {
                        0 => normal.take_received(),
                        _ => high.take_received(),
                    };
                    let job = match job {
                        Some(job) => job?,
                        None => continue,
                    };
                    results.send((name.to_string(), job * job))?;
                }
            })?;
    }

    let (jobs_tx, urgent_tx) = (jobs.clone(), urgent.clone());
    scheduler
        .task()
        .label("producer")
        .spawn(move || -> Result<(), Error> {
            for job in 1..=6 {
                if job % 3 == 0 {
                    urgent_tx.send(job)?;
                } else {
                    jobs_tx.send(job)?;
                }
            }
            Ok(())
        })?;

    for _ in 0..6 {
        let (worker, square) = results.receive()?;
        info!(%worker, square, "result");
        println!("{} -> {}", worker, square);
    }
    //工作者永远等待新任务，结束时全部清理
    scheduler.kill_all()?;
    scheduler.run_until_idle()
}
