//! The host-effect substrate a run executes against.
//!
//! The interpreter is generic over a capability record that backs mutable
//! reference cells and runs lifted host effects. Two instantiations are
//! provided: [`St`], whose effects are restricted by construction to the
//! in-process run (repeated runs are reproducible), and [`Io`], which admits
//! arbitrary side effects. The `safe` flag on [`Io`] is a user promise that
//! its effects are replay-safe; it is consumed by exploration layers, never
//! by this interpreter.
//!
//! Reference handles are only obtainable inside a running program and the
//! backing store lives behind [`Host`], which cannot be constructed outside
//! this crate — that is what keeps references from escaping a run.

use crate::rt::action::{Action, Effect, Value};
use crate::rt::cref;
use crate::rt::ident::CRefId;

/// The capability record itself: reference-cell storage plus effect
/// execution. Opaque outside the crate, which seals [`Substrate`].
#[derive(Debug)]
pub struct Host {
    refs: cref::Store,
}

impl Host {
    pub(crate) fn new() -> Host {
        Host {
            refs: cref::Store::new(),
        }
    }

    pub(crate) fn alloc_ref(&mut self, id: CRefId, value: Value) {
        self.refs.alloc(id, value);
    }

    pub(crate) fn read_ref(&self, id: CRefId) -> Value {
        self.refs.read(id)
    }

    pub(crate) fn write_ref(&mut self, id: CRefId, value: Value) {
        self.refs.write(id, value);
    }

    pub(crate) fn lift(&mut self, eff: Effect) -> Action {
        eff()
    }
}

/// A host-effect substrate. Implemented by [`St`] and [`Io`]; not
/// implementable outside the crate because [`Host`] is unconstructible.
pub trait Substrate: 'static {
    #[doc(hidden)]
    fn host(&mut self) -> &mut Host;

    /// True when re-running the same program under the same scheduler is
    /// guaranteed to repeat the same effects.
    fn reproducible(&self) -> bool;
}

/// The pure substrate: lifted effects may only touch state created inside
/// the run, so a run can be repeated in-process with identical results.
/// That restriction is by construction of the program, not enforced by the
/// type system.
#[derive(Debug)]
pub struct St {
    host: Host,
}

impl St {
    /// Create a pure substrate.
    pub fn new() -> St {
        St { host: Host::new() }
    }
}

impl Default for St {
    fn default() -> St {
        St::new()
    }
}

impl Substrate for St {
    fn host(&mut self) -> &mut Host {
        &mut self.host
    }

    fn reproducible(&self) -> bool {
        true
    }
}

/// The effectful substrate: lifted effects may do arbitrary IO.
#[derive(Debug)]
pub struct Io {
    host: Host,
    safe: bool,
}

impl Io {
    /// Create an IO substrate. `safe` is the caller's promise that the
    /// program's effects can be replayed; exploration layers refuse to
    /// re-run programs whose substrate is not safe.
    pub fn new(safe: bool) -> Io {
        Io {
            host: Host::new(),
            safe,
        }
    }

    /// The user-supplied replay-safety flag.
    pub fn safe(&self) -> bool {
        self.safe
    }
}

impl Substrate for Io {
    fn host(&mut self) -> &mut Host {
        &mut self.host
    }

    fn reproducible(&self) -> bool {
        self.safe
    }
}
