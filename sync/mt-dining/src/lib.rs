//!
//! mt-dining - Dining Philosophers
//!
//! N philosophers sit around a table; each needs both neighbouring forks to
//! eat. Every state read and write goes through one mutex, and each
//! philosopher has a private counting semaphore that starts at zero.
//!
//! ## Protocol
//!
//! - `take_forks(i)` - Become HUNGRY and try to grant under the mutex, then
//!   wait on the own semaphore outside it
//! - `put_forks(i)` - Return to THINKING and try to grant both neighbours
//! - A grant needs HUNGRY and neither neighbour EATING; it flips the seat to
//!   EATING and releases one permit
//!
//! Nobody ever blocks while holding the mutex, so the table cannot deadlock.
//! Starvation remains possible, as in the classical algorithm.
//!
//! ## Drivers
//!
//! - `Dinner` - One OS thread per philosopher, stopped through a cancel token
//! - `Stepper` - Single-threaded, scheduled step by step for reproducible runs
//!

pub mod cancel;
pub mod dinner;
pub mod errors;
pub mod narrator;
pub mod semaphore;
pub mod stepper;
pub mod table;

pub use cancel::CancelToken;
pub use dinner::{Dinner, DinnerConfig, DinnerReport};
pub use errors::DiningError;
pub use narrator::{trace_line, Action, Narrator, Recorder, Silent, StdoutNarrator};
pub use semaphore::Semaphore;
pub use stepper::{Schedule, StepReport, Stepper};
pub use table::{left, right, Grant, State, Table};
