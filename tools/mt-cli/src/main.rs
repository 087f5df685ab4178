///
/// mt CLI - Drives the mastering-threads primitives
///
/// Provides commands for watching both primitives at work:
/// - mt dine: Seat the philosophers and print their trace lines
/// - mt pool: Push a batch of tasks through a worker pool
///
/// Logs go to stderr, filtered through `MT_LOG` (default `warn`); stdout
/// carries only the trace lines.
///

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use mt_cli::commands;
use mt_cli::{CliError, Config};
use mt_dining::StdoutNarrator;

#[derive(Parser)]
#[command(name = "mt")]
#[command(author, version, about = "Classical concurrency primitives", long_about = None)]
struct Cli {
    /// TOML file with [dinner] and [pool] settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dining philosophers
    Dine {
        /// Number of philosophers
        #[arg(short = 'n', long)]
        philosophers: Option<usize>,

        /// Meals per philosopher before the dinner ends
        #[arg(long)]
        meals: Option<u64>,

        /// Stop the dinner after this many milliseconds if the meals have not run out
        #[arg(long)]
        duration_ms: Option<u64>,

        #[arg(long)]
        think_ms: Option<u64>,

        #[arg(long)]
        eat_ms: Option<u64>,

        #[arg(long)]
        jitter_ms: Option<u64>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run a batch of tasks through a worker pool
    Pool {
        /// Number of worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Number of tasks to submit
        #[arg(short, long)]
        tasks: Option<usize>,

        /// Make every n-th task panic
        #[arg(long)]
        panic_every: Option<usize>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_env("MT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Dine {
            philosophers,
            meals,
            duration_ms,
            think_ms,
            eat_ms,
            jitter_ms,
            seed,
        } => {
            let dinner = &mut config.dinner;
            if let Some(n) = philosophers {
                dinner.philosophers = n;
            }
            if meals.is_some() {
                dinner.meals = meals;
            }
            if let Some(ms) = think_ms {
                dinner.think_ms = ms;
            }
            if let Some(ms) = eat_ms {
                dinner.eat_ms = ms;
            }
            if let Some(ms) = jitter_ms {
                dinner.jitter_ms = ms;
            }
            if seed.is_some() {
                dinner.seed = seed;
            }
            config.validate()?;

            let report = commands::dine(
                &config.dinner,
                duration_ms.map(Duration::from_millis),
                Arc::new(StdoutNarrator),
            )?;
            for (seat, meals) in report.meals.iter().enumerate() {
                eprintln!("philosopher {}: {} meals", seat, meals);
            }
            if let Some(seat) = report.hungriest() {
                eprintln!("hungriest: philosopher {}", seat);
            }
        }
        Commands::Pool {
            workers,
            tasks,
            panic_every,
        } => {
            let pool = &mut config.pool;
            if let Some(w) = workers {
                pool.workers = w;
            }
            if let Some(t) = tasks {
                pool.tasks = t;
            }
            if let Some(p) = panic_every {
                pool.panic_every = p;
            }
            config.validate()?;

            let stats = commands::pool(&config.pool, |line| println!("{}", line))?;
            eprintln!(
                "completed: {}, panicked: {}",
                stats.completed, stats.panicked
            );
        }
    }

    Ok(())
}
