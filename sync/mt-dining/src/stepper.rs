//!
//! Deterministic Stepper
//!
//! Drives a `Table` from a single thread. Every philosopher is a three-phase
//! machine and each step advances exactly one of them:
//!
//! - Thinking → request forks (the mutex half of `take_forks`)
//! - Waiting  → take the pending permit if the grant has landed
//! - Eating   → put forks down
//!
//! The blocking wait is replaced by `Semaphore::try_acquire`, so a run is a
//! pure function of the schedule and can be replayed.
//!

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::DiningError;
use crate::narrator::{Narrator, Silent};
use crate::table::{State, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    RoundRobin,
    Seeded(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Thinking,
    Waiting,
    Eating,
}

#[derive(Debug)]
enum Order {
    RoundRobin { next: usize },
    Seeded(StdRng),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub steps: u64,
    pub meals: Vec<u64>,
}

#[derive(Debug)]
pub struct Stepper {
    table: Table,
    phases: Vec<Phase>,
    meals: Vec<u64>,
    order: Order,
    steps: u64,
}

impl Stepper {
    pub fn new(seats: usize, schedule: Schedule) -> Result<Self, DiningError> {
        Self::with_narrator(seats, schedule, Arc::new(Silent))
    }

    pub fn with_narrator(
        seats: usize,
        schedule: Schedule,
        narrator: Arc<dyn Narrator>,
    ) -> Result<Self, DiningError> {
        let table = Table::with_narrator(seats, narrator)?;
        let order = match schedule {
            Schedule::RoundRobin => Order::RoundRobin { next: 0 },
            Schedule::Seeded(seed) => Order::Seeded(StdRng::seed_from_u64(seed)),
        };
        Ok(Self {
            table,
            phases: vec![Phase::Thinking; seats],
            meals: vec![0; seats],
            order,
            steps: 0,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn meals(&self) -> &[u64] {
        &self.meals
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    fn pick(&mut self) -> usize {
        let seats = self.phases.len();
        match &mut self.order {
            Order::RoundRobin { next } => {
                let seat = *next;
                *next = (seat + 1) % seats;
                seat
            }
            Order::Seeded(rng) => rng.gen_range(0..seats),
        }
    }

    /// Advance the next scheduled philosopher by one phase and return its
    /// seat. Fails if every philosopher is waiting with no grant pending.
    pub fn step(&mut self) -> Result<usize, DiningError> {
        let seat = self.pick();
        self.advance(seat);
        self.steps += 1;

        assert!(
            self.table.exclusion_holds(),
            "neighbours eating together after step {}: {:?}",
            self.steps,
            self.table.snapshot()
        );

        if self.is_deadlocked() {
            return Err(DiningError::Deadlock { steps: self.steps });
        }
        Ok(seat)
    }

    fn advance(&mut self, seat: usize) {
        self.phases[seat] = match self.phases[seat] {
            Phase::Thinking => {
                self.table.request(seat);
                Phase::Waiting
            }
            Phase::Waiting => {
                if self.table.signal(seat).try_acquire() {
                    assert_eq!(
                        self.table.state(seat),
                        State::Eating,
                        "philosopher {seat} took a permit without a grant"
                    );
                    Phase::Eating
                } else {
                    Phase::Waiting
                }
            }
            Phase::Eating => {
                self.table.put_forks(seat);
                self.meals[seat] += 1;
                Phase::Thinking
            }
        };
    }

    fn is_deadlocked(&self) -> bool {
        self.phases
            .iter()
            .enumerate()
            .all(|(seat, phase)| *phase == Phase::Waiting && self.table.signal(seat).available() == 0)
    }

    /// Take `count` steps
    pub fn run(&mut self, count: u64) -> Result<(), DiningError> {
        for _ in 0..count {
            self.step()?;
        }
        Ok(())
    }

    /// Step until every philosopher has eaten at least once
    pub fn run_until_all_ate(&mut self, max_steps: u64) -> Result<StepReport, DiningError> {
        while self.meals.iter().any(|m| *m == 0) {
            if self.steps >= max_steps {
                let starving = self
                    .meals
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| **m == 0)
                    .map(|(seat, _)| seat)
                    .collect();
                return Err(DiningError::StepLimit {
                    steps: self.steps,
                    starving,
                });
            }
            self.step()?;
        }

        Ok(StepReport {
            steps: self.steps,
            meals: self.meals.clone(),
        })
    }
}
