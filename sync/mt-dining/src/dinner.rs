//!
//! Dinner Harness
//!
//! Starts one named OS thread per philosopher around a shared `Table`. Each
//! thread loops think → take forks → eat → put forks, checking for
//! cancellation only between full cycles.
//!

use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::errors::DiningError;
use crate::narrator::{Action, Narrator};
use crate::table::{Grant, State, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DinnerConfig {
    pub philosophers: usize,
    pub think: Duration,
    pub eat: Duration,
    /// Up to this much extra time is added to every think and eat
    pub jitter: Duration,
    /// Meals each philosopher eats before leaving; `None` runs until stopped
    pub meals: Option<u64>,
    /// Seed for the jitter; each seat derives its own stream from it
    pub seed: Option<u64>,
}

impl Default for DinnerConfig {
    fn default() -> Self {
        Self {
            philosophers: 3,
            think: Duration::from_millis(15),
            eat: Duration::from_millis(10),
            jitter: Duration::ZERO,
            meals: None,
            seed: None,
        }
    }
}

/// Meals eaten per seat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DinnerReport {
    pub meals: Vec<u64>,
}

impl DinnerReport {
    pub fn total(&self) -> u64 {
        self.meals.iter().sum()
    }

    pub fn hungriest(&self) -> Option<usize> {
        self.meals
            .iter()
            .enumerate()
            .min_by_key(|(_, meals)| **meals)
            .map(|(seat, _)| seat)
    }
}

#[derive(Debug)]
pub struct Dinner {
    table: Arc<Table>,
    /// Drained by `wait`; whatever is left is joined on drop
    philosophers: Vec<JoinHandle<u64>>,
}

impl Dinner {
    pub fn start(config: DinnerConfig, narrator: Arc<dyn Narrator>) -> Result<Self, DiningError> {
        let table = Arc::new(Table::with_narrator(config.philosophers, narrator)?);
        let mut philosophers = Vec::with_capacity(config.philosophers);

        for seat in 0..config.philosophers {
            let table_clone = Arc::clone(&table);
            let config_clone = config.clone();
            let spawned = thread::Builder::new()
                .name(format!("philosopher-{seat}"))
                .spawn(move || philosopher_loop(seat, &table_clone, &config_clone));

            match spawned {
                Ok(handle) => philosophers.push(handle),
                Err(source) => {
                    table.cancel();
                    for (started, handle) in philosophers.into_iter().enumerate() {
                        let _ = join_philosopher(started, handle);
                    }
                    return Err(DiningError::Spawn { seat, source });
                }
            }
        }

        info!(
            philosophers = config.philosophers,
            meals = ?config.meals,
            "dinner started"
        );
        Ok(Self {
            table,
            philosophers,
        })
    }

    /// The shared table, for sampling states while the dinner runs
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// True once every philosopher has left the table
    pub fn is_finished(&self) -> bool {
        self.philosophers.iter().all(JoinHandle::is_finished)
    }

    /// Cancel and wait for every philosopher to leave
    pub fn stop(self) -> DinnerReport {
        self.table.cancel();
        self.wait()
    }

    /// Let the dinner run until it ends on its own or `limit` elapses,
    /// whichever comes first, then stop it.
    pub fn run_for(self, limit: Duration) -> DinnerReport {
        let deadline = Instant::now() + limit;
        while !self.is_finished() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(FINISH_POLL));
        }
        self.stop()
    }

    /// Wait without cancelling. Only returns on its own when a meal limit
    /// was configured.
    ///
    /// A philosopher only dies on a broken invariant. The first such panic
    /// cancels the table so the others leave, and is re-raised once they
    /// have been joined.
    pub fn wait(mut self) -> DinnerReport {
        let handles = std::mem::take(&mut self.philosophers);
        let mut meals = Vec::with_capacity(handles.len());
        let mut failure = None;

        for (seat, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(eaten) => meals.push(eaten),
                Err(payload) => {
                    if failure.is_none() {
                        error!(seat, "philosopher died, clearing the table");
                        self.table.cancel();
                        failure = Some(payload);
                    }
                    meals.push(0);
                }
            }
        }

        if let Some(payload) = failure {
            panic::resume_unwind(payload);
        }

        let report = DinnerReport { meals };
        info!(total = report.total(), "dinner finished");
        report
    }
}

impl Drop for Dinner {
    fn drop(&mut self) {
        if self.philosophers.is_empty() {
            return;
        }
        self.table.cancel();
        for (seat, handle) in std::mem::take(&mut self.philosophers).into_iter().enumerate() {
            let _ = join_philosopher(seat, handle);
        }
    }
}

const FINISH_POLL: Duration = Duration::from_millis(5);

/// Join a philosopher whose outcome no longer matters, logging a panic
fn join_philosopher(seat: usize, handle: JoinHandle<u64>) -> Option<u64> {
    match handle.join() {
        Ok(meals) => Some(meals),
        Err(_) => {
            warn!(seat, "philosopher thread terminated abnormally");
            None
        }
    }
}

/// Cancels the table if its philosopher unwinds, so neighbours waiting on
/// forks it still holds are released instead of blocking forever.
struct LeaveOnPanic<'a> {
    table: &'a Table,
}

impl Drop for LeaveOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.table.cancel();
        }
    }
}

fn philosopher_loop(seat: usize, table: &Table, config: &DinnerConfig) -> u64 {
    let _guard = LeaveOnPanic { table };
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(seat as u64)),
        None => StdRng::from_entropy(),
    };
    let mut meals = 0;

    while !table.is_cancelled() && config.meals.is_none_or(|limit| meals < limit) {
        table.narrate(seat, Action::Thinking);
        thread::sleep(config.think + jitter(&mut rng, config.jitter));

        if table.take_forks(seat) == Grant::Cancelled {
            break;
        }
        assert_eq!(
            table.state(seat),
            State::Eating,
            "philosopher {seat} should be EATING"
        );

        table.narrate(seat, Action::Eating);
        thread::sleep(config.eat + jitter(&mut rng, config.jitter));

        table.put_forks(seat);
        meals += 1;
    }

    debug!(seat, meals, "philosopher left the table");
    meals
}

fn jitter(rng: &mut StdRng, max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let max_micros = u64::try_from(max.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(rng.gen_range(0..=max_micros))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;
    use std::sync::mpsc;

    use crate::narrator::{Recorder, Silent};

    /// Dies the first time `seat` sits down to eat
    struct ChokesOnEating {
        seat: usize,
    }

    impl Narrator for ChokesOnEating {
        fn narrate(&self, seat: usize, action: Action) {
            if seat == self.seat && action == Action::Eating {
                panic!("philosopher {seat} choked");
            }
        }
    }

    fn quick(philosophers: usize, meals: u64) -> DinnerConfig {
        DinnerConfig {
            philosophers,
            think: Duration::ZERO,
            eat: Duration::from_micros(200),
            jitter: Duration::from_micros(300),
            meals: Some(meals),
            seed: Some(7),
        }
    }

    #[test]
    fn test_bounded_dinner_feeds_everyone() {
        let dinner = Dinner::start(quick(5, 20), Arc::new(Silent)).unwrap();
        let report = dinner.wait();
        assert_eq!(report.meals, vec![20; 5]);
        assert_eq!(report.total(), 100);
    }

    #[test]
    fn test_trace_events_balance() {
        let recorder = Arc::new(Recorder::new());
        let dinner = Dinner::start(quick(3, 10), recorder.clone()).unwrap();
        let report = dinner.wait();

        assert_eq!(report.total(), 30);
        assert_eq!(recorder.count(Action::Thinking), 30);
        assert_eq!(recorder.count(Action::GotForks), 30);
        assert_eq!(recorder.count(Action::Eating), 30);
        assert_eq!(recorder.count(Action::ReleasingForks), 30);
    }

    #[test]
    fn test_stop_ends_unbounded_dinner() {
        let config = DinnerConfig {
            philosophers: 4,
            think: Duration::from_millis(1),
            eat: Duration::from_millis(1),
            ..DinnerConfig::default()
        };
        let dinner = Dinner::start(config, Arc::new(Silent)).unwrap();
        thread::sleep(Duration::from_millis(50));

        let table = Arc::clone(dinner.table());
        let report = dinner.stop();
        assert_eq!(report.meals.len(), 4);
        assert!(table.snapshot().iter().all(|s| *s == State::Thinking));
    }

    #[test]
    fn test_empty_dinner_is_rejected() {
        let config = DinnerConfig {
            philosophers: 0,
            ..DinnerConfig::default()
        };
        assert!(matches!(
            Dinner::start(config, Arc::new(Silent)),
            Err(DiningError::NoSeats)
        ));
    }

    #[test]
    fn test_report_hungriest() {
        let report = DinnerReport {
            meals: vec![4, 1, 3],
        };
        assert_eq!(report.hungriest(), Some(1));
        assert_eq!(DinnerReport { meals: vec![] }.hungriest(), None);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(jitter(&mut rng, Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(&mut rng, Duration::from_millis(2)) <= Duration::from_millis(2));
        }
    }

    #[test]
    fn test_jitter_saturates_huge_bound() {
        let mut rng = StdRng::seed_from_u64(3);
        let max = Duration::from_secs(u64::MAX);
        for _ in 0..10 {
            assert!(jitter(&mut rng, max) <= max);
        }
    }

    #[test]
    fn test_dead_philosopher_does_not_hang_wait() {
        let config = DinnerConfig {
            meals: Some(50),
            ..quick(3, 0)
        };
        let dinner = Dinner::start(config, Arc::new(ChokesOnEating { seat: 2 })).unwrap();
        let table = Arc::clone(dinner.table());

        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| dinner.wait()));
            let _ = done_tx.send(outcome.is_err());
        });

        let panicked = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("wait should return once a philosopher dies");
        assert!(panicked);
        assert!(table.is_cancelled());
    }

    #[test]
    fn test_drop_stops_and_joins_philosophers() {
        let config = DinnerConfig {
            philosophers: 4,
            think: Duration::from_millis(1),
            eat: Duration::from_millis(1),
            ..DinnerConfig::default()
        };
        let dinner = Dinner::start(config, Arc::new(Silent)).unwrap();
        let table = Arc::clone(dinner.table());
        thread::sleep(Duration::from_millis(20));

        drop(dinner);

        assert!(table.is_cancelled());
        assert!(table.snapshot().iter().all(|s| *s == State::Thinking));
        // Every philosopher thread has released its clone of the table.
        assert_eq!(Arc::strong_count(&table), 1);
    }

    #[test]
    fn test_run_for_returns_when_meals_run_out() {
        let dinner = Dinner::start(quick(3, 2), Arc::new(Silent)).unwrap();
        let started = Instant::now();
        let report = dinner.run_for(Duration::from_secs(30));

        assert_eq!(report.meals, vec![2; 3]);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_run_for_stops_at_deadline() {
        let dinner = Dinner::start(quick(3, u64::MAX), Arc::new(Silent)).unwrap();
        let started = Instant::now();
        let report = dinner.run_for(Duration::from_millis(30));

        assert_eq!(report.meals.len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(report.meals.iter().all(|meals| *meals < u64::MAX));
    }

    #[test]
    fn test_join_philosopher_logs_and_skips_panic() {
        let handle = thread::spawn(|| -> u64 { panic!("indigestion") });
        assert_eq!(join_philosopher(0, handle), None);

        let handle = thread::spawn(|| 4u64);
        assert_eq!(join_philosopher(1, handle), Some(4));
    }
}
