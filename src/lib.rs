#![deny(missing_debug_implementations, missing_docs, rust_2018_idioms)]

//! Weft is a deterministic interpreter for testing concurrent programs.
//!
//! Concurrent code is hard to test because bugs hide in rare interleavings:
//! a test can pass millions of times and still be wrong. Weft attacks the
//! problem by making scheduling a first-class input. A program is written
//! against weft's primitives — threads, synchronized variables, mutable
//! cells, asynchronous exceptions, transactions — and is *reified* into a
//! stream of primitive actions rather than executed. The interpreter then
//! advances exactly one action per step of whichever thread a pluggable
//! [`Scheduler`] picks, so the scheduler is the run's only source of
//! non-determinism: the same program under the same scheduler produces the
//! same result and the same [`Trace`], every time.
//!
//! Every step is logged together with the alternatives the scheduler did
//! not pick and a one-step [`Lookahead`] for each. A search layer built on
//! top of this crate can replay a trace, perturb one decision, and
//! systematically enumerate preemptions — that layer is deliberately not
//! part of this crate, which only interprets.
//!
//! # Example
//!
//! A thread is forked to fill a synchronized variable, and the main thread
//! takes the value out, blocking until it is there:
//!
//! ```
//! use weft::{fork, new_empty_cvar, put_cvar, run, take_cvar, LeastId};
//!
//! let program = new_empty_cvar::<u32>().and_then(|var| {
//!     fork(put_cvar(var, 42)).and_then(move |_| take_cvar(var))
//! });
//!
//! let (result, _scheduler, trace) = run(LeastId::default(), program);
//!
//! assert_eq!(result, Ok(42));
//! // New, Fork, BlockedTake, Put, Take, Stop
//! assert_eq!(trace.len(), 6);
//! ```
//!
//! Under [`LeastId`] the main thread runs until it blocks on the empty
//! variable, the child's `put` wakes it, and it takes the value. A
//! different scheduler explores a different interleaving of the *same*
//! program value.
//!
//! # Failures
//!
//! A run that cannot produce a value reports a [`Failure`] instead:
//! deadlock, transaction-only deadlock, an uncaught exception on the main
//! thread, a failed opaque sub-computation, or a scheduler that picked a
//! non-runnable thread. Failures are the run's outcome — they are never
//! thrown into the program under test, and the program's own exceptions
//! never leak out as panics.
//!
//! # Logging
//!
//! The interpreter emits a `tracing` event per step (target `weft`); wire
//! up a subscriber such as `tracing-subscriber` to see decision-by-decision
//! output when debugging a scheduler or a failing interleaving.

pub mod program;
pub mod run;
pub mod sched;
pub mod stm;
pub mod substrate;
pub mod trace;

mod rt;

pub use crate::program::{
    all_known, atomically, catch, forgets, fork, fork_with_unmask, knows_about, lift, mask,
    mask_uninterruptible, mod_cref, my_thread_id, new_cref, new_empty_cvar, no_test, put_cvar,
    read_cref, read_cvar, spawn, take_cvar, throw, throw_to, try_put_cvar, try_take_cvar, CRef,
    CVar, Exception, Program, ResourceId, Restore,
};
pub use crate::rt::ident::{CRefId, CVarId, ThreadId, TxVarId};
pub use crate::sched::{LeastId, Random, RoundRobin, Scheduler};
pub use crate::stm::{Tx, TxCtx, TxVar};
pub use crate::substrate::{Io, St, Substrate};
pub use crate::trace::{
    Decision, Failure, Lookahead, Mask, ThreadAction, Trace, TraceEntry,
};

#[doc(inline)]
pub use crate::run::run;
pub use crate::run::{run_basic, run_io, run_with};
