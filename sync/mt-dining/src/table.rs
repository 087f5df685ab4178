//!
//! Philosopher Table
//!
//! Owns the per-seat states, the single mutex that guards them and one
//! zero-initialised semaphore per seat. The grant decision and the permit
//! release happen together under the mutex; the matching wait happens only
//! after the mutex has been released.
//!
//! Neighbours are cyclic: `left(i) = (i + 1) % n`, `right(i) = (i + n - 1) % n`.
//!

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::errors::DiningError;
use crate::narrator::{Action, Narrator, Silent};
use crate::semaphore::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Thinking,
    Hungry,
    Eating,
}

/// Outcome of waiting for forks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Grant {
    /// Both forks are held; the seat is EATING
    Granted,
    /// The table was cancelled while waiting; the seat is back to THINKING
    Cancelled,
}

pub fn left(i: usize, n: usize) -> usize {
    (i + 1) % n
}

pub fn right(i: usize, n: usize) -> usize {
    (i + n - 1) % n
}

fn exclusion_holds_in(states: &[State]) -> bool {
    let n = states.len();
    (0..n).all(|i| {
        states[i] != State::Eating
            || (states[left(i, n)] != State::Eating && states[right(i, n)] != State::Eating)
            || n == 1
    })
}

pub struct Table {
    states: Mutex<Vec<State>>,
    signals: Vec<Semaphore>,
    cancel: CancelToken,
    narrator: Arc<dyn Narrator>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("states", &self.snapshot())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Table {
    pub fn new(seats: usize) -> Result<Self, DiningError> {
        Self::with_narrator(seats, Arc::new(Silent))
    }

    pub fn with_narrator(seats: usize, narrator: Arc<dyn Narrator>) -> Result<Self, DiningError> {
        if seats == 0 {
            return Err(DiningError::NoSeats);
        }
        Ok(Self {
            states: Mutex::new(vec![State::Thinking; seats]),
            signals: (0..seats).map(|_| Semaphore::new(0)).collect(),
            cancel: CancelToken::new(),
            narrator,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<State>> {
        // Only an invariant assertion can poison this lock; keep failing loudly.
        self.states
            .lock()
            .expect("philosopher table poisoned by a failed invariant")
    }

    fn check_seat(&self, i: usize) {
        assert!(
            i < self.signals.len(),
            "seat {i} out of range for a table of {}",
            self.signals.len()
        );
    }

    pub fn seats(&self) -> usize {
        self.signals.len()
    }

    pub fn left(&self, i: usize) -> usize {
        left(i, self.seats())
    }

    pub fn right(&self, i: usize) -> usize {
        right(i, self.seats())
    }

    pub fn state(&self, i: usize) -> State {
        self.check_seat(i);
        self.lock()[i]
    }

    pub fn snapshot(&self) -> Vec<State> {
        self.lock().clone()
    }

    /// No EATING philosopher has an EATING neighbour, sampled atomically
    pub fn exclusion_holds(&self) -> bool {
        exclusion_holds_in(&self.lock())
    }

    pub fn narrate(&self, seat: usize, action: Action) {
        trace!(seat, %action, "philosopher event");
        self.narrator.narrate(seat, action);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel the table and rouse every philosopher blocked on its signal
    pub fn cancel(&self) {
        self.cancel.cancel();
        for signal in &self.signals {
            signal.wake_all();
        }
        debug!(seats = self.seats(), "table cancelled");
    }

    pub(crate) fn signal(&self, i: usize) -> &Semaphore {
        &self.signals[i]
    }

    /// Become HUNGRY and wait for both forks.
    ///
    /// Blocks on the seat's semaphore outside the mutex. Returns
    /// `Grant::Cancelled` if the table is cancelled first.
    pub fn take_forks(&self, i: usize) -> Grant {
        self.request(i);
        if self.signals[i].acquire_unless(&self.cancel) {
            return Grant::Granted;
        }
        self.withdraw(i);
        Grant::Cancelled
    }

    /// The critical-section half of `take_forks`: mark HUNGRY and try to
    /// grant. A granted seat has one permit waiting on its semaphore.
    pub fn request(&self, i: usize) {
        self.check_seat(i);
        let mut states = self.lock();
        states[i] = State::Hungry;
        if !self.try_grant(&mut states, i) {
            trace!(seat = i, "forks busy, waiting");
        }
    }

    /// Put both forks down and offer them to the neighbours
    pub fn put_forks(&self, i: usize) {
        self.check_seat(i);
        let mut states = self.lock();
        assert_eq!(
            states[i],
            State::Eating,
            "philosopher {i} released forks without eating"
        );
        self.release(&mut states, i);
    }

    /// Caller holds the mutex; `states` is the locked table.
    fn release(&self, states: &mut [State], i: usize) {
        let n = states.len();
        states[i] = State::Thinking;
        self.narrate(i, Action::ReleasingForks);
        self.try_grant(states, left(i, n));
        self.try_grant(states, right(i, n));
    }

    /// Grant seat `i` if it is HUNGRY and neither neighbour is EATING.
    /// Only reachable with the mutex held, since `states` is the locked table.
    fn try_grant(&self, states: &mut [State], i: usize) -> bool {
        let n = states.len();
        if states[i] != State::Hungry
            || states[left(i, n)] == State::Eating
            || states[right(i, n)] == State::Eating
        {
            return false;
        }

        states[i] = State::Eating;
        debug_assert!(exclusion_holds_in(states), "neighbours eating at once: {states:?}");
        self.narrate(i, Action::GotForks);
        self.signals[i].release();
        true
    }

    /// Back out of a cancelled wait. A grant may have landed after the wait
    /// gave up; in that case the pending permit is consumed and the forks
    /// are released again so the neighbours are not stuck behind us.
    fn withdraw(&self, i: usize) {
        let mut states = self.lock();
        match states[i] {
            State::Hungry => states[i] = State::Thinking,
            State::Eating => {
                let consumed = self.signals[i].try_acquire();
                assert!(consumed, "philosopher {i} is EATING without a pending grant");
                self.release(&mut states, i);
            }
            State::Thinking => {}
        }
        debug!(seat = i, "left the table while hungry");
    }
}
