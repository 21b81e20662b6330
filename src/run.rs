//! Running programs to completion.
//!
//! A run takes a [`Scheduler`], a substrate, and a [`Program`], and drives
//! the program one primitive action per step until the main thread
//! terminates or no thread can run. The result comes back with the final
//! scheduler state and the full [`Trace`], which is everything an
//! exploration layer needs to enumerate other interleavings of the same
//! program.

use tracing::info;

use crate::program::Program;
use crate::rt::action::downcast;
use crate::rt::execution::Execution;
use crate::sched::Scheduler;
use crate::substrate::{Io, St, Substrate};
use crate::trace::{Failure, Trace};

/// Run `program` under `scheduler` on an explicit substrate.
pub fn run_with<T, S, H>(
    mut scheduler: S,
    mut substrate: H,
    program: Program<T>,
) -> (Result<T, Failure>, S, Trace)
where
    T: Clone + 'static,
    S: Scheduler,
    H: Substrate,
{
    let mut execution = Execution::new(program.finish());
    let result = execution.run(&mut scheduler, &mut substrate);

    match &result {
        Ok(_) => info!(steps = execution.step_no, "run complete"),
        Err(failure) => info!(steps = execution.step_no, %failure, "run failed"),
    }

    (
        result.map(|value| downcast::<T>(&value)),
        scheduler,
        execution.trace,
    )
}

/// Run `program` under `scheduler` on the pure [`St`] substrate.
pub fn run<T, S>(scheduler: S, program: Program<T>) -> (Result<T, Failure>, S, Trace)
where
    T: Clone + 'static,
    S: Scheduler,
{
    run_with(scheduler, St::new(), program)
}

/// Run `program` under `scheduler` on the effectful [`Io`] substrate.
/// `safe` is the caller's promise that the program's effects can be
/// replayed; exploration layers consume it, this interpreter does not.
pub fn run_io<T, S>(scheduler: S, safe: bool, program: Program<T>) -> (Result<T, Failure>, S, Trace)
where
    T: Clone + 'static,
    S: Scheduler,
{
    run_with(scheduler, Io::new(safe), program)
}

/// Run `program` and keep only the result, if any.
pub fn run_basic<T, S>(scheduler: S, program: Program<T>) -> Option<T>
where
    T: Clone + 'static,
    S: Scheduler,
{
    run(scheduler, program).0.ok()
}
