///
/// Trace output for the dinner.
///
/// Every philosopher event is handed to a `Narrator`. The stdout narrator
/// keeps the classic line format:
///
/// ```text
/// Philosopher: 2		Yay! Got both forks
/// ```
///

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Thinking,
    Eating,
    ReleasingForks,
    GotForks,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Action::Thinking => "Thinking...",
            Action::Eating => "Eating...",
            Action::ReleasingForks => "Releasing forks...",
            Action::GotForks => "Yay! Got both forks",
        };
        f.write_str(text)
    }
}

pub fn trace_line(seat: usize, action: Action) -> String {
    format!("Philosopher: {seat}\t\t{action}")
}

/// Receives philosopher events. Grant and release events arrive while the
/// table mutex is held, so implementations must not call back into the table.
pub trait Narrator: Send + Sync {
    fn narrate(&self, seat: usize, action: Action);
}

/// Writes trace lines to standard output
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutNarrator;

impl Narrator for StdoutNarrator {
    fn narrate(&self, seat: usize, action: Action) {
        // A closed pipe should not take the dinner down.
        let _ = writeln!(std::io::stdout().lock(), "{}", trace_line(seat, action));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Narrator for Silent {
    fn narrate(&self, _seat: usize, _action: Action) {}
}

/// Keeps every event in arrival order
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<(usize, Action)>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(usize, Action)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|(seat, action)| trace_line(seat, action))
            .collect()
    }

    pub fn count(&self, action: Action) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, a)| *a == action)
            .count()
    }
}

impl Narrator for Recorder {
    fn narrate(&self, seat: usize, action: Action) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((seat, action));
    }
}
