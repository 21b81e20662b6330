//! Opaque atomic transactions.
//!
//! The interpreter treats a transaction as a single atomic step: the closure
//! handed to [`atomically`](crate::program::atomically) runs against a
//! [`TxCtx`] with buffered writes and a read log. Returning [`Tx::Done`]
//! commits the buffer and wakes every thread blocked on a written variable;
//! returning [`Tx::Retry`] discards the buffer and blocks the thread until
//! some variable it read is written. The transaction sub-language itself is
//! deliberately not modelled here — the closure is re-run from scratch on
//! every attempt.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::rt::action::{downcast, Value};
use crate::rt::ident::{IdSource, TxVarId};

/// A handle to a transactional variable.
///
/// Handles are created inside a transaction and are only meaningful within
/// the run that created them.
pub struct TxVar<T> {
    pub(crate) id: TxVarId,
    _t: PhantomData<fn(T) -> T>,
}

impl<T> TxVar<T> {
    /// The identifier behind this handle.
    pub fn id(&self) -> TxVarId {
        self.id
    }
}

impl<T> Copy for TxVar<T> {}

impl<T> Clone for TxVar<T> {
    fn clone(&self) -> TxVar<T> {
        *self
    }
}

impl<T> fmt::Debug for TxVar<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_tuple("TxVar").field(&self.id).finish()
    }
}

/// The outcome of one transaction attempt.
#[derive(Debug)]
pub enum Tx<T> {
    /// Commit the buffered writes and return the value.
    Done(T),
    /// Abandon this attempt; block until a variable read by the attempt is
    /// written, then re-run.
    Retry,
}

/// The view a transaction body has of the transactional store: reads are
/// logged, writes are buffered until commit.
pub struct TxCtx<'a> {
    store: &'a mut Store,
    ids: &'a mut IdSource,
    reads: Vec<TxVarId>,
    writes: HashMap<TxVarId, Value>,
}

impl TxCtx<'_> {
    /// Allocate a transactional variable. The variable only becomes visible
    /// to other transactions if this attempt commits.
    pub fn new_var<T: 'static>(&mut self, value: T) -> TxVar<T> {
        let id = self.ids.fresh_txvar();
        self.writes.insert(id, Rc::new(value));
        TxVar {
            id,
            _t: PhantomData,
        }
    }

    /// Read a variable, observing this attempt's own buffered writes.
    pub fn read<T: Clone + 'static>(&mut self, var: TxVar<T>) -> T {
        self.reads.push(var.id);
        let value = self
            .writes
            .get(&var.id)
            .cloned()
            .or_else(|| self.store.vars.get(&var.id).cloned())
            .expect("transaction read an unknown variable");
        downcast::<T>(&value)
    }

    /// Buffer a write, visible to later reads in the same attempt.
    pub fn write<T: 'static>(&mut self, var: TxVar<T>, value: T) {
        self.writes.insert(var.id, Rc::new(value));
    }
}

impl fmt::Debug for TxCtx<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("TxCtx")
            .field("reads", &self.reads)
            .field("writes", &self.writes.len())
            .finish()
    }
}

/// An erased, re-runnable transaction body.
pub(crate) type Transaction = Box<dyn FnMut(&mut TxCtx<'_>) -> TxResult>;

pub(crate) enum TxResult {
    Done(Value),
    Retry,
}

/// The committed store of transactional variables.
pub(crate) struct Store {
    vars: HashMap<TxVarId, Value>,
}

impl Store {
    pub(crate) fn new() -> Store {
        Store {
            vars: HashMap::new(),
        }
    }
}

pub(crate) enum Commit {
    Done {
        value: Value,
        written: Vec<TxVarId>,
    },
    Retry {
        watch: Vec<TxVarId>,
    },
}

/// Run one attempt of `tx`. Commits on `Done`; on `Retry` reports the
/// deduplicated, sorted read set to block on. Written sets are sorted so a
/// run never observes map iteration order.
pub(crate) fn attempt(tx: &mut Transaction, store: &mut Store, ids: &mut IdSource) -> Commit {
    let mut ctx = TxCtx {
        store,
        ids,
        reads: Vec::new(),
        writes: HashMap::new(),
    };

    match tx(&mut ctx) {
        TxResult::Done(value) => {
            let TxCtx { store, writes, .. } = ctx;

            let mut written: Vec<_> = writes.keys().copied().collect();
            written.sort();

            for (id, value) in writes {
                store.vars.insert(id, value);
            }

            Commit::Done { value, written }
        }
        TxResult::Retry => {
            let mut watch = ctx.reads;
            watch.sort();
            watch.dedup();
            Commit::Retry { watch }
        }
    }
}
