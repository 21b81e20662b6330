//! The primitive actions a thread can be suspended on.
//!
//! User programs are reified into a tree of `Action`s before anything runs.
//! Each variant carries the operands that identify its target resource and a
//! continuation: either a function from the operation's result to the next
//! action, or — for operations that produce nothing — the next action
//! itself, built eagerly. The driver executes exactly one action per step;
//! actions are inert data until then.

use std::any::Any;
use std::rc::Rc;

use crate::program::{Exception, ResourceId, Restore};
use crate::rt::ident::{CRefId, CVarId, ThreadId};
use crate::stm::Transaction;
use crate::trace::{Lookahead, Mask};

/// An erased program value. Values cross the untyped runtime behind `Rc` so
/// that a non-emptying `Read` can hand the same value to several readers.
pub(crate) type Value = Rc<dyn Any>;

/// An erased result continuation.
pub(crate) type Kont = Box<dyn FnOnce(Value) -> Action>;

/// A lifted host effect, run by the substrate to produce the next action.
pub(crate) type Effect = Box<dyn FnOnce() -> Action>;

/// An erased program awaiting its continuation.
pub(crate) type BodyFn = Box<dyn FnOnce(Kont) -> Action>;

/// A handler-frame matcher: given the in-flight exception, either produce
/// the handler body (to be resumed with the frame's saved continuation) or
/// hand the exception back for the next frame down.
pub(crate) type HandlerFn = Box<dyn FnOnce(Exception) -> Result<BodyFn, Exception>>;

pub(crate) enum Action {
    /// Spawn a thread. The child body receives a [`Restore`] that re-applies
    /// the parent's mask, captured by value at fork time; `k` receives the
    /// child's id.
    Fork {
        child: Box<dyn FnOnce(Restore) -> Action>,
        k: Box<dyn FnOnce(ThreadId) -> Action>,
    },
    MyThreadId {
        k: Box<dyn FnOnce(ThreadId) -> Action>,
    },
    New {
        k: Box<dyn FnOnce(CVarId) -> Action>,
    },
    Put {
        cvar: CVarId,
        value: Value,
        k: Box<Action>,
    },
    TryPut {
        cvar: CVarId,
        value: Value,
        k: Box<dyn FnOnce(bool) -> Action>,
    },
    Read {
        cvar: CVarId,
        k: Kont,
    },
    Take {
        cvar: CVarId,
        k: Kont,
    },
    TryTake {
        cvar: CVarId,
        k: Box<dyn FnOnce(Option<Value>) -> Action>,
    },
    NewRef {
        value: Value,
        k: Box<dyn FnOnce(CRefId) -> Action>,
    },
    ReadRef {
        cref: CRefId,
        k: Kont,
    },
    /// Atomic read-modify-write; `f` maps the current value to the stored
    /// replacement and the returned result.
    ModRef {
        cref: CRefId,
        f: Box<dyn FnOnce(Value) -> (Value, Value)>,
        k: Kont,
    },
    Lift {
        eff: Effect,
    },
    /// An opaque transaction, re-run from scratch on every attempt.
    Atom {
        tx: Transaction,
        k: Kont,
    },
    Throw {
        exc: Exception,
    },
    ThrowTo {
        target: ThreadId,
        exc: Exception,
        k: Box<Action>,
    },
    /// Install a handler frame around `body`. The body's terminal
    /// continuation is a `PopCatching`, which resumes the frame's saved `k`.
    Catching {
        handler: HandlerFn,
        body: Box<Action>,
        k: Kont,
    },
    PopCatching {
        result: Value,
    },
    /// Switch to `mask` for the duration of `body`. The body receives a
    /// [`Restore`] for the prior mask and the reset-wrapped continuation.
    Masking {
        mask: Mask,
        body: Box<dyn FnOnce(Restore, Kont) -> Action>,
        k: Kont,
    },
    /// Re-establish `mask`; `restore` distinguishes entering a restored
    /// region from unwinding back out of one.
    ResetMask {
        restore: bool,
        mask: Mask,
        k: Box<Action>,
    },
    NoTest {
        body: Box<Action>,
        k: Kont,
    },
    KnowsAbout {
        what: ResourceId,
        k: Box<Action>,
    },
    Forgets {
        what: ResourceId,
        k: Box<Action>,
    },
    AllKnown {
        k: Box<Action>,
    },
    Stop {
        result: Value,
    },
}

impl Action {
    /// The one-step preview of this action, without executing anything.
    ///
    /// Acquaintance annotations are transparent: the preview lists the
    /// annotation chain and then the first real action, so the result is
    /// always non-empty.
    pub(crate) fn lookahead(&self) -> Vec<Lookahead> {
        let mut out = Vec::new();
        let mut action = self;

        loop {
            match action {
                Action::KnowsAbout { k, .. } => {
                    out.push(Lookahead::WillKnowsAbout);
                    action = k;
                }
                Action::Forgets { k, .. } => {
                    out.push(Lookahead::WillForgets);
                    action = k;
                }
                Action::AllKnown { k } => {
                    out.push(Lookahead::WillAllKnown);
                    action = k;
                }
                other => {
                    out.push(other.peek());
                    return out;
                }
            }
        }
    }

    fn peek(&self) -> Lookahead {
        match self {
            Action::Fork { .. } => Lookahead::WillFork,
            Action::MyThreadId { .. } => Lookahead::WillMyThreadId,
            Action::New { .. } => Lookahead::WillNew,
            Action::Put { cvar, .. } => Lookahead::WillPut(*cvar),
            Action::TryPut { cvar, .. } => Lookahead::WillTryPut(*cvar),
            Action::Read { cvar, .. } => Lookahead::WillRead(*cvar),
            Action::Take { cvar, .. } => Lookahead::WillTake(*cvar),
            Action::TryTake { cvar, .. } => Lookahead::WillTryTake(*cvar),
            Action::NewRef { .. } => Lookahead::WillNewRef,
            Action::ReadRef { cref, .. } => Lookahead::WillReadRef(*cref),
            Action::ModRef { cref, .. } => Lookahead::WillModRef(*cref),
            Action::Lift { .. } => Lookahead::WillLift,
            Action::Atom { .. } => Lookahead::WillStm,
            Action::Throw { .. } => Lookahead::WillThrow,
            Action::ThrowTo { target, .. } => Lookahead::WillThrowTo(*target),
            Action::Catching { .. } => Lookahead::WillCatching,
            Action::PopCatching { .. } => Lookahead::WillPopCatching,
            Action::Masking { mask, .. } => Lookahead::WillSetMasking(*mask),
            Action::ResetMask { restore, mask, .. } => {
                if *restore {
                    Lookahead::WillSetMasking(*mask)
                } else {
                    Lookahead::WillResetMasking(*mask)
                }
            }
            Action::NoTest { .. } => Lookahead::WillNoTest,
            Action::KnowsAbout { .. } => Lookahead::WillKnowsAbout,
            Action::Forgets { .. } => Lookahead::WillForgets,
            Action::AllKnown { .. } => Lookahead::WillAllKnown,
            Action::Stop { .. } => Lookahead::WillStop,
        }
    }

    /// Whether this is a primitive that can suspend the executing thread.
    /// These are the interruptible points for a thread under
    /// [`Mask::Interruptible`].
    pub(crate) fn may_block(&self) -> bool {
        matches!(
            self,
            Action::Put { .. }
                | Action::Take { .. }
                | Action::Read { .. }
                | Action::ThrowTo { .. }
                | Action::Atom { .. }
        )
    }
}

/// Downcast an erased value back to the type its handle was created with.
/// The typed layer is the only source of values, so a mismatch is an
/// interpreter bug, not a user error.
pub(crate) fn downcast<T: Clone + 'static>(value: &Value) -> T {
    value
        .downcast_ref::<T>()
        .expect("value must downcast to its handle's type")
        .clone()
}
