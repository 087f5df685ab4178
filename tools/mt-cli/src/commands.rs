///
/// Subcommand implementations.
///
/// Both commands take their settings already merged from config file and
/// flags, so they can be driven from tests without going through clap.
///

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use tracing::info;

use mt_dining::{Dinner, DinnerReport, Narrator};
use mt_pool::{PoolStats, WorkerPool};

use crate::config::{DinnerSection, PoolSection};
use crate::errors::CliError;

/// Run a dinner until the meal limit or `duration` runs out, whichever
/// comes first. With neither it runs until the process is killed.
pub fn dine(
    section: &DinnerSection,
    duration: Option<Duration>,
    narrator: Arc<dyn Narrator>,
) -> Result<DinnerReport, CliError> {
    let dinner = Dinner::start(section.to_dinner_config(), narrator)?;

    let report = match duration {
        Some(duration) => dinner.run_for(duration),
        None => dinner.wait(),
    };
    Ok(report)
}

fn should_panic(task: usize, panic_every: usize) -> bool {
    panic_every > 0 && (task + 1) % panic_every == 0
}

/// Push `section.tasks` tasks through a fresh pool. Each task reports the
/// worker that ran it through `on_line`; every `panic_every`-th task panics
/// instead.
pub fn pool(section: &PoolSection, mut on_line: impl FnMut(String)) -> Result<PoolStats, CliError> {
    let pool = WorkerPool::new(section.workers)?;
    let (line_tx, line_rx) = mpsc::channel();

    for task in 0..section.tasks {
        let line_tx = line_tx.clone();
        let panics = should_panic(task, section.panic_every);
        pool.submit(move || {
            if panics {
                panic!("task {task} failed on purpose");
            }
            let worker = thread::current().name().unwrap_or("unnamed").to_string();
            let _ = line_tx.send(format!("task {task} ran on {worker}"));
        })?;
    }
    drop(line_tx);

    // Ends once every task closure has been dropped, run or not.
    for line in line_rx {
        on_line(line);
    }

    // Counters settle only once the workers have exited.
    let stats = pool.join();
    info!(completed = stats.completed, panicked = stats.panicked, "pool demo finished");
    Ok(stats)
}
