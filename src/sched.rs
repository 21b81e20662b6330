//! Pluggable schedulers.
//!
//! The scheduler is the interpreter's only source of non-determinism: once
//! per step the driver hands it the runnable threads (with their lookaheads)
//! and the previous decision, and it names the thread to advance. Returning
//! a thread that is not in the runnable set aborts the run with
//! [`Failure::InternalError`](crate::Failure::InternalError).
//!
//! Exploration layers implement this trait to enumerate interleavings; the
//! schedulers provided here are the simple ones a test driver reaches for
//! directly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::rt::ident::ThreadId;
use crate::trace::{Lookahead, ThreadAction};

/// Chooses the next thread to advance, once per step.
///
/// `runnable` is never empty and is ordered by thread id. Scheduler state
/// lives in `&mut self` and is handed back by
/// [`run`](crate::run()) when the run completes.
pub trait Scheduler {
    /// Pick a member of `runnable` given the previous step's decision.
    fn schedule(
        &mut self,
        last: Option<&(ThreadId, ThreadAction)>,
        runnable: &[(ThreadId, Vec<Lookahead>)],
    ) -> ThreadId;
}

/// Always advances the runnable thread with the smallest id.
///
/// Forked threads only run once their parent blocks or terminates, which
/// makes this the scheduler of choice for deterministic smoke tests.
#[derive(Debug, Default)]
pub struct LeastId;

impl Scheduler for LeastId {
    fn schedule(
        &mut self,
        _last: Option<&(ThreadId, ThreadAction)>,
        runnable: &[(ThreadId, Vec<Lookahead>)],
    ) -> ThreadId {
        runnable[0].0
    }
}

/// Cycles through the runnable threads in id order, advancing the first
/// runnable thread after the previously scheduled one.
#[derive(Debug, Default)]
pub struct RoundRobin;

impl Scheduler for RoundRobin {
    fn schedule(
        &mut self,
        last: Option<&(ThreadId, ThreadAction)>,
        runnable: &[(ThreadId, Vec<Lookahead>)],
    ) -> ThreadId {
        match last {
            Some((prev, _)) => runnable
                .iter()
                .map(|(id, _)| *id)
                .find(|id| id > prev)
                .unwrap_or(runnable[0].0),
            None => runnable[0].0,
        }
    }
}

/// Picks uniformly among the runnable threads from a seeded generator.
///
/// A seed fully determines the run, so a failing seed can be replayed.
#[derive(Debug)]
pub struct Random {
    rng: StdRng,
}

impl Random {
    /// Create a scheduler whose choices are determined by `seed`.
    pub fn seeded(seed: u64) -> Random {
        Random {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Scheduler for Random {
    fn schedule(
        &mut self,
        _last: Option<&(ThreadId, ThreadAction)>,
        runnable: &[(ThreadId, Vec<Lookahead>)],
    ) -> ThreadId {
        runnable[self.rng.gen_range(0..runnable.len())].0
    }
}
