//! The execution trace: what the driver records about every step.
//!
//! A run produces one [`TraceEntry`] per scheduler invocation. Each entry
//! holds the [`Decision`] that was made, the alternative runnable threads at
//! that point together with their [`Lookahead`]s, and the [`ThreadAction`]
//! that was actually executed. Consumers (an exploration layer, a test
//! assertion) replay or perturb runs based on nothing but this log.

use std::error;
use std::fmt;

use crate::rt::ident::{CRefId, CVarId, ThreadId};

/// A thread's interruptibility with respect to asynchronous exceptions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Mask {
    /// Asynchronous exceptions are delivered before the next action.
    Unmasked,
    /// Asynchronous exceptions are delivered only at a blocking action.
    Interruptible,
    /// Asynchronous exceptions are never delivered.
    Uninterruptible,
}

/// A labelled scheduler choice.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Decision {
    /// The named thread was scheduled and the previous thread could not have
    /// continued (it blocked or terminated), or this is the first step.
    Start(ThreadId),
    /// The same thread as the previous step was scheduled.
    Continue,
    /// A different thread was scheduled even though the previous one could
    /// have continued: a preemption.
    SwitchTo(ThreadId),
}

/// One primitive step, as performed.
///
/// The `woken` lists on the `CVar` and STM variants name every thread moved
/// back to runnable by the step, takers before readers, FIFO within each
/// queue.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ThreadAction {
    /// Spawned the named thread.
    Fork(ThreadId),
    /// Looked up the executing thread's own id.
    MyThreadId,
    /// Allocated a new, empty `CVar`.
    New(CVarId),
    /// Filled the `CVar`, waking the listed threads.
    Put(CVarId, Vec<ThreadId>),
    /// Blocked trying to fill an already-full `CVar`.
    BlockedPut(CVarId),
    /// Attempted a non-blocking fill; the flag records success.
    TryPut(CVarId, bool, Vec<ThreadId>),
    /// Observed the value of a full `CVar` without emptying it.
    Read(CVarId),
    /// Blocked reading an empty `CVar`.
    BlockedRead(CVarId),
    /// Emptied the `CVar`, waking the listed blocked putters.
    Take(CVarId, Vec<ThreadId>),
    /// Blocked taking from an empty `CVar`.
    BlockedTake(CVarId),
    /// Attempted a non-blocking take; the flag records success.
    TryTake(CVarId, bool, Vec<ThreadId>),
    /// Allocated a new reference cell.
    NewRef(CRefId),
    /// Read a reference cell.
    ReadRef(CRefId),
    /// Atomically modified a reference cell.
    ModRef(CRefId),
    /// Executed a lifted host effect.
    Lift,
    /// Committed a transaction, waking the listed threads.
    Stm(Vec<ThreadId>),
    /// A transaction retried; the thread blocked on its read set.
    BlockedStm,
    /// Raised an exception that a handler caught.
    Throw,
    /// Delivered an exception to the named thread.
    ThrowTo(ThreadId),
    /// Blocked delivering an exception to an uninterruptible target.
    BlockedThrowTo(ThreadId),
    /// An exception propagated past every handler and killed the thread.
    Killed,
    /// Installed an exception handler.
    Catching,
    /// Left the scope of the innermost exception handler.
    PopCatching,
    /// Entered a masked scope (or re-entered one via a restore).
    SetMasking(Mask),
    /// Restored the interruptibility that was in force before a masked
    /// scope.
    ResetMasking(Mask),
    /// Ran an opaque sub-computation to completion as a single step.
    NoTest,
    /// Declared interest in a shared resource.
    KnowsAbout,
    /// Withdrew interest in a shared resource.
    Forgets,
    /// Declared the acquainted set complete.
    AllKnown,
    /// The thread finished.
    Stop,
}

/// A one-step preview of what a thread would do if scheduled.
///
/// Computed without executing anything; `Will*` variants parallel
/// [`ThreadAction`]. Acquaintance annotations are transparent to lookahead,
/// which is why a thread's lookahead is a non-empty list: the annotation
/// chain followed by the first real action.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Lookahead {
    /// Will spawn a thread.
    WillFork,
    /// Will look up its own thread id.
    WillMyThreadId,
    /// Will allocate a `CVar`.
    WillNew,
    /// Will fill (or block filling) the named `CVar`.
    WillPut(CVarId),
    /// Will attempt a non-blocking fill of the named `CVar`.
    WillTryPut(CVarId),
    /// Will read (or block reading) the named `CVar`.
    WillRead(CVarId),
    /// Will take from (or block on) the named `CVar`.
    WillTake(CVarId),
    /// Will attempt a non-blocking take from the named `CVar`.
    WillTryTake(CVarId),
    /// Will allocate a reference cell.
    WillNewRef,
    /// Will read the named reference cell.
    WillReadRef(CRefId),
    /// Will atomically modify the named reference cell.
    WillModRef(CRefId),
    /// Will execute a lifted host effect.
    WillLift,
    /// Will attempt a transaction.
    WillStm,
    /// Will raise an exception.
    WillThrow,
    /// Will deliver (or block delivering) an exception to the named thread.
    WillThrowTo(ThreadId),
    /// Will install an exception handler.
    WillCatching,
    /// Will leave the innermost handler scope.
    WillPopCatching,
    /// Will enter a masked scope.
    WillSetMasking(Mask),
    /// Will restore a previous mask.
    WillResetMasking(Mask),
    /// Will run an opaque sub-computation.
    WillNoTest,
    /// Will declare interest in a resource.
    WillKnowsAbout,
    /// Will withdraw interest in a resource.
    WillForgets,
    /// Will declare its acquainted set complete.
    WillAllKnown,
    /// Will finish.
    WillStop,
}

/// One step of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    /// The choice the scheduler made.
    pub decision: Decision,
    /// Every *other* runnable thread at the decision point, with the
    /// decision that would have selected it and its lookahead.
    pub alternatives: Vec<(Decision, Vec<Lookahead>)>,
    /// The action the chosen thread performed.
    pub action: ThreadAction,
}

/// The full ordered log of a run, one entry per scheduler invocation.
pub type Trace = Vec<TraceEntry>;

/// Terminal conditions of a run that are not a result value.
///
/// Failures are returned by the driver; they are never thrown into the
/// program under test.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Failure {
    /// The interpreter broke an internal invariant, e.g. the scheduler
    /// returned a thread that was not runnable.
    InternalError,
    /// Every live thread was blocked, at least one of them on a `CVar` or
    /// an exception delivery.
    Deadlock,
    /// Every live thread was blocked inside a retrying transaction.
    StmDeadlock,
    /// An exception propagated off the top of the main thread.
    UncaughtException,
    /// An opaque sub-computation failed to produce a value.
    FailureInNoTest,
}

impl fmt::Display for Failure {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::InternalError => "internal interpreter invariant violated".fmt(fmt),
            Failure::Deadlock => "every thread is blocked".fmt(fmt),
            Failure::StmDeadlock => "every thread is blocked inside a transaction".fmt(fmt),
            Failure::UncaughtException => "uncaught exception on the main thread".fmt(fmt),
            Failure::FailureInNoTest => "opaque sub-computation failed".fmt(fmt),
        }
    }
}

impl error::Error for Failure {}
