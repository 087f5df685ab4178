///
/// Dining philosophers error types.
///
/// Broken table invariants are not errors; they panic. These cover setup
/// failures and the outcomes of bounded deterministic runs.
///

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiningError {
    #[error("A table needs at least one seat")]
    NoSeats,

    #[error("Failed to spawn philosopher-{seat}: {source}")]
    Spawn {
        seat: usize,
        #[source]
        source: io::Error,
    },

    #[error("Deadlock after {steps} steps: every philosopher is waiting and none can be granted")]
    Deadlock { steps: u64 },

    #[error("Step limit of {steps} reached; never ate: {}", format_seats(starving))]
    StepLimit { steps: u64, starving: Vec<usize> },
}

fn format_seats(seats: &[usize]) -> String {
    seats
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
