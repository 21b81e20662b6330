//! Building concurrent programs.
//!
//! A [`Program`] is a value: a description of a concurrent computation,
//! reified as a continuation-threaded stream of primitive actions. Nothing
//! happens until it is handed to [`run`](crate::run()). The combinators
//! here are the whole construction surface — `CVar` and reference handles
//! cannot be forged, so resources cannot escape the run that created them.
//!
//! Programs compose monadically:
//!
//! ```
//! use weft::{fork, new_empty_cvar, put_cvar, take_cvar};
//!
//! let program = new_empty_cvar::<u32>().and_then(|var| {
//!     fork(put_cvar(var, 42)).and_then(move |_| take_cvar(var))
//! });
//! # drop(program);
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::rt::action::{downcast, Action, BodyFn, Kont, Value};
use crate::rt::ident::{CRefId, CVarId, ThreadId, TxVarId};
use crate::stm::{Tx, TxCtx, TxResult};
use crate::trace::Mask;

type TypedKont<T> = Box<dyn FnOnce(T) -> Action>;

/// A suspended concurrent computation producing a `T`.
///
/// Programs are inert data; they are consumed by [`run`](crate::run()) (or
/// by combinators like [`and_then`](Program::and_then)).
pub struct Program<T> {
    run: Box<dyn FnOnce(TypedKont<T>) -> Action>,
}

impl<T: 'static> Program<T> {
    /// A program that immediately produces `value` without taking a step.
    pub fn pure(value: T) -> Program<T> {
        Program {
            run: Box::new(move |k| k(value)),
        }
    }

    /// Sequence: run `self`, then the program `f` builds from its result.
    pub fn and_then<U, F>(self, f: F) -> Program<U>
    where
        U: 'static,
        F: FnOnce(T) -> Program<U> + 'static,
    {
        Program {
            run: Box::new(move |k| (self.run)(Box::new(move |t| (f(t).run)(k)))),
        }
    }

    /// Apply a pure function to the result.
    pub fn map<U, F>(self, f: F) -> Program<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.and_then(move |t| Program::pure(f(t)))
    }

    /// Sequence, discarding this program's result.
    pub fn then<U: 'static>(self, next: Program<U>) -> Program<U> {
        self.and_then(move |_| next)
    }

    fn prim(f: impl FnOnce(TypedKont<T>) -> Action + 'static) -> Program<T> {
        Program { run: Box::new(f) }
    }

    /// Terminate the program with `Stop`, yielding the runnable action
    /// stream.
    pub(crate) fn finish(self) -> Action {
        (self.run)(Box::new(|t| Action::Stop {
            result: Rc::new(t),
        }))
    }

    /// Erase the result type, producing a body awaiting an erased
    /// continuation.
    pub(crate) fn erase(self) -> BodyFn {
        Box::new(move |k: Kont| {
            (self.run)(Box::new(move |t| {
                let value: Value = Rc::new(t);
                k(value)
            }))
        })
    }
}

impl<T> fmt::Debug for Program<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("Program { .. }")
    }
}

/// A handle to a synchronized single-slot variable holding a `T`.
///
/// Only obtainable from [`new_empty_cvar`] (or [`spawn`]) inside a running
/// program, and only meaningful within that run.
pub struct CVar<T> {
    pub(crate) id: CVarId,
    _t: PhantomData<fn(T) -> T>,
}

impl<T> CVar<T> {
    /// The identifier behind this handle, as it appears in traces.
    pub fn id(&self) -> CVarId {
        self.id
    }
}

impl<T> Copy for CVar<T> {}

impl<T> Clone for CVar<T> {
    fn clone(&self) -> CVar<T> {
        *self
    }
}

impl<T> fmt::Debug for CVar<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_tuple("CVar").field(&self.id).finish()
    }
}

/// A handle to a mutable reference cell holding a `T`. Reads and atomic
/// modifications never block.
pub struct CRef<T> {
    pub(crate) id: CRefId,
    _t: PhantomData<fn(T) -> T>,
}

impl<T> CRef<T> {
    /// The identifier behind this handle, as it appears in traces.
    pub fn id(&self) -> CRefId {
        self.id
    }
}

impl<T> Copy for CRef<T> {}

impl<T> Clone for CRef<T> {
    fn clone(&self) -> CRef<T> {
        *self
    }
}

impl<T> fmt::Debug for CRef<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_tuple("CRef").field(&self.id).finish()
    }
}

/// An exception value: an erased payload matched by runtime type test.
///
/// Handlers installed with [`catch`] match on the payload type; an
/// exception that matches no handler kills its thread.
pub struct Exception {
    payload: Box<dyn Any>,
}

impl Exception {
    /// Wrap a payload.
    pub fn new<E: Any>(payload: E) -> Exception {
        Exception {
            payload: Box::new(payload),
        }
    }

    /// Whether the payload is an `E`.
    pub fn is<E: Any>(&self) -> bool {
        self.payload.is::<E>()
    }

    /// Recover the payload, or get the exception back if the type does not
    /// match.
    pub fn downcast<E: Any>(self) -> Result<E, Exception> {
        match self.payload.downcast::<E>() {
            Ok(payload) => Ok(*payload),
            Err(payload) => Err(Exception { payload }),
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str("Exception { .. }")
    }
}

/// Names a shared resource for the acquaintance annotations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceId {
    /// A synchronized variable.
    CVar(CVarId),
    /// A transactional variable.
    TxVar(TxVarId),
}

impl<T> From<CVar<T>> for ResourceId {
    fn from(var: CVar<T>) -> ResourceId {
        ResourceId::CVar(var.id)
    }
}

impl<T> From<crate::stm::TxVar<T>> for ResourceId {
    fn from(var: crate::stm::TxVar<T>) -> ResourceId {
        ResourceId::TxVar(var.id)
    }
}

/// Re-applies a saved mask inside a [`mask`]ed scope (or a forked child).
///
/// Captured by value when the scope is entered: applying it wraps a program
/// so that the scope's outer mask is in force for that program and the
/// scope's own mask is re-established afterwards.
#[derive(Debug, Copy, Clone)]
pub struct Restore {
    outer: Mask,
    inner: Mask,
}

pub(crate) fn restore(outer: Mask, inner: Mask) -> Restore {
    Restore { outer, inner }
}

impl Restore {
    /// Run `program` with the saved outer mask in force.
    pub fn apply<T: 'static>(&self, program: Program<T>) -> Program<T> {
        let Restore { outer, inner } = *self;

        Program::prim(move |k: TypedKont<T>| Action::ResetMask {
            restore: true,
            mask: outer,
            k: Box::new((program.run)(Box::new(move |t| Action::ResetMask {
                restore: false,
                mask: inner,
                k: Box::new(k(t)),
            }))),
        })
    }
}

/// Spawn a thread running `child`; the result is the child's id.
///
/// The child starts with its parent's mask and an empty handler stack.
pub fn fork(child: Program<()>) -> Program<ThreadId> {
    Program::prim(move |k| Action::Fork {
        child: Box::new(move |_| child.finish()),
        k,
    })
}

/// Like [`fork`], but the child receives a [`Restore`] for the parent's
/// mask at fork time.
pub fn fork_with_unmask<F>(child: F) -> Program<ThreadId>
where
    F: FnOnce(Restore) -> Program<()> + 'static,
{
    Program::prim(move |k| Action::Fork {
        child: Box::new(move |restore| child(restore).finish()),
        k,
    })
}

/// The id of the executing thread.
pub fn my_thread_id() -> Program<ThreadId> {
    Program::prim(|k| Action::MyThreadId { k })
}

/// Spawn `child` and collect its result: a fresh `CVar` the child fills
/// when it finishes. `take_cvar` on the handle joins the child.
pub fn spawn<T: Clone + 'static>(child: Program<T>) -> Program<CVar<T>> {
    new_empty_cvar::<T>().and_then(move |var| {
        fork(child.and_then(move |value| put_cvar(var, value))).map(move |_| var)
    })
}

/// Allocate an empty synchronized variable.
pub fn new_empty_cvar<T: 'static>() -> Program<CVar<T>> {
    Program::prim(|k| Action::New {
        k: Box::new(move |id| {
            k(CVar {
                id,
                _t: PhantomData,
            })
        }),
    })
}

/// Fill `var`, blocking while it is full. Filling an empty variable wakes
/// every blocked taker and reader; the scheduler picks who runs first.
pub fn put_cvar<T: 'static>(var: CVar<T>, value: T) -> Program<()> {
    Program::prim(move |k| Action::Put {
        cvar: var.id,
        value: Rc::new(value),
        k: Box::new(k(())),
    })
}

/// Fill `var` if it is empty; the result records success.
pub fn try_put_cvar<T: 'static>(var: CVar<T>, value: T) -> Program<bool> {
    Program::prim(move |k| Action::TryPut {
        cvar: var.id,
        value: Rc::new(value),
        k,
    })
}

/// Observe the value of `var` without emptying it, blocking while it is
/// empty.
///
/// When a fill wakes both readers and takers, a reader scheduled before any
/// taker observes the value; readers scheduled after a taker emptied the
/// variable block again. The order within a wakeup wave is the scheduler's.
pub fn read_cvar<T: Clone + 'static>(var: CVar<T>) -> Program<T> {
    Program::prim(move |k| Action::Read {
        cvar: var.id,
        k: Box::new(move |v| k(downcast::<T>(&v))),
    })
}

/// Empty `var` and return its value, blocking while it is empty. Emptying
/// wakes every blocked putter; exactly one will win the slot.
pub fn take_cvar<T: Clone + 'static>(var: CVar<T>) -> Program<T> {
    Program::prim(move |k| Action::Take {
        cvar: var.id,
        k: Box::new(move |v| k(downcast::<T>(&v))),
    })
}

/// Empty `var` if it is full; `None` means it was empty.
pub fn try_take_cvar<T: Clone + 'static>(var: CVar<T>) -> Program<Option<T>> {
    Program::prim(move |k| Action::TryTake {
        cvar: var.id,
        k: Box::new(move |v| k(v.map(|v| downcast::<T>(&v)))),
    })
}

/// Allocate a reference cell holding `value`.
pub fn new_cref<T: 'static>(value: T) -> Program<CRef<T>> {
    Program::prim(move |k| Action::NewRef {
        value: Rc::new(value),
        k: Box::new(move |id| {
            k(CRef {
                id,
                _t: PhantomData,
            })
        }),
    })
}

/// Read a reference cell. Never blocks; observes the most recent write in
/// step order.
pub fn read_cref<T: Clone + 'static>(r: CRef<T>) -> Program<T> {
    Program::prim(move |k| Action::ReadRef {
        cref: r.id,
        k: Box::new(move |v| k(downcast::<T>(&v))),
    })
}

/// Atomically modify a reference cell: `f` maps the current value to the
/// stored replacement and the returned result, all in one step.
pub fn mod_cref<T, U, F>(r: CRef<T>, f: F) -> Program<U>
where
    T: Clone + 'static,
    U: Clone + 'static,
    F: FnOnce(T) -> (T, U) + 'static,
{
    Program::prim(move |k| Action::ModRef {
        cref: r.id,
        f: Box::new(move |v| {
            let (stored, returned) = f(downcast::<T>(&v));
            (Rc::new(stored) as Value, Rc::new(returned) as Value)
        }),
        k: Box::new(move |v| k(downcast::<U>(&v))),
    })
}

/// Lift a host effect; its result becomes the program's. What "effect"
/// means is the substrate's business — see
/// [`St`](crate::substrate::St) and [`Io`](crate::substrate::Io).
pub fn lift<T, F>(effect: F) -> Program<T>
where
    T: 'static,
    F: FnOnce() -> T + 'static,
{
    Program::prim(move |k| Action::Lift {
        eff: Box::new(move || k(effect())),
    })
}

/// Run a transaction as one atomic step. The closure may run many times;
/// see [`Tx`] for commit-versus-retry.
pub fn atomically<T, F>(mut tx: F) -> Program<T>
where
    T: Clone + 'static,
    F: FnMut(&mut TxCtx<'_>) -> Tx<T> + 'static,
{
    Program::prim(move |k| Action::Atom {
        tx: Box::new(move |ctx: &mut TxCtx<'_>| match tx(ctx) {
            Tx::Done(value) => TxResult::Done(Rc::new(value)),
            Tx::Retry => TxResult::Retry,
        }),
        k: Box::new(move |v| k(downcast::<T>(&v))),
    })
}

/// Raise an exception on the executing thread. The program's result type is
/// free because control never reaches the continuation.
pub fn throw<T: 'static, E: Any>(exc: E) -> Program<T> {
    Program::prim(move |_k| Action::Throw {
        exc: Exception::new(exc),
    })
}

/// Deliver an exception to another thread, blocking until the target is
/// interruptible: immediately if it is unmasked or interruptibly masked at
/// a blocking point, never while it is uninterruptibly masked.
pub fn throw_to<E: Any>(target: ThreadId, exc: E) -> Program<()> {
    Program::prim(move |k| Action::ThrowTo {
        target,
        exc: Exception::new(exc),
        k: Box::new(k(())),
    })
}

/// Run `body` with a handler for exceptions whose payload is an `E`.
/// Non-matching exceptions keep unwinding. The handler runs under the mask
/// that was in force when it was installed.
pub fn catch<T, E, H>(body: Program<T>, handler: H) -> Program<T>
where
    T: Clone + 'static,
    E: Any,
    H: FnOnce(E) -> Program<T> + 'static,
{
    Program::prim(move |k: TypedKont<T>| Action::Catching {
        handler: Box::new(move |exc: Exception| match exc.downcast::<E>() {
            Ok(payload) => Ok(handler(payload).erase()),
            Err(exc) => Err(exc),
        }),
        body: Box::new((body.run)(Box::new(|t| Action::PopCatching {
            result: Rc::new(t),
        }))),
        k: Box::new(move |v| k(downcast::<T>(&v))),
    })
}

/// Run `body` with asynchronous exceptions deferred to blocking points.
/// The body receives a [`Restore`] that re-opens the outer interruptibility
/// for a sub-program.
pub fn mask<T, F>(body: F) -> Program<T>
where
    T: Clone + 'static,
    F: FnOnce(Restore) -> Program<T> + 'static,
{
    masking(Mask::Interruptible, body)
}

/// Run `body` with asynchronous exceptions fully deferred, blocking points
/// included.
pub fn mask_uninterruptible<T, F>(body: F) -> Program<T>
where
    T: Clone + 'static,
    F: FnOnce(Restore) -> Program<T> + 'static,
{
    masking(Mask::Uninterruptible, body)
}

fn masking<T, F>(mask: Mask, body: F) -> Program<T>
where
    T: Clone + 'static,
    F: FnOnce(Restore) -> Program<T> + 'static,
{
    Program::prim(move |k: TypedKont<T>| Action::Masking {
        mask,
        body: Box::new(move |restore, kk| body(restore).erase()(kk)),
        k: Box::new(move |v| k(downcast::<T>(&v))),
    })
}

/// Run `body` to completion as one opaque step, without exploring its
/// scheduling. The body must be self-contained: handles from the enclosing
/// program are not valid inside it. A failing body fails the whole run.
pub fn no_test<T: Clone + 'static>(body: Program<T>) -> Program<T> {
    Program::prim(move |k| Action::NoTest {
        body: Box::new(body.finish()),
        k: Box::new(move |v| k(downcast::<T>(&v))),
    })
}

/// Declare that the executing thread holds a reference to `resource`.
/// Bookkeeping for exploration layers; no runtime effect.
pub fn knows_about(resource: impl Into<ResourceId>) -> Program<()> {
    let what = resource.into();
    Program::prim(move |k| Action::KnowsAbout {
        what,
        k: Box::new(k(())),
    })
}

/// Withdraw a [`knows_about`] declaration.
pub fn forgets(resource: impl Into<ResourceId>) -> Program<()> {
    let what = resource.into();
    Program::prim(move |k| Action::Forgets {
        what,
        k: Box::new(k(())),
    })
}

/// Declare the executing thread's acquainted set complete.
pub fn all_known() -> Program<()> {
    Program::prim(|k| Action::AllKnown {
        k: Box::new(k(())),
    })
}
