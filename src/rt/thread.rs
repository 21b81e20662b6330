//! Per-thread state and the set of all threads in a run.

use std::collections::HashSet;
use std::fmt;
use std::ops;

use crate::program::{Exception, ResourceId};
use crate::rt::action::{Action, HandlerFn, Kont};
use crate::rt::ident::{CVarId, ThreadId, TxVarId};
use crate::trace::Mask;

/// An installed exception handler.
///
/// Both exits of a `Catching` scope need the saved continuation: the normal
/// path pops the frame and resumes `k` with the body's result, and the throw
/// path feeds `k` to the matched handler. Storing `k` in the frame is what
/// lets a single-use continuation serve both.
pub(crate) struct Frame {
    pub(crate) handler: HandlerFn,
    pub(crate) k: Kont,
    /// The mask in force when the handler was installed; re-established on
    /// handler entry.
    pub(crate) mask: Mask,
}

pub(crate) struct Thread {
    pub(crate) id: ThreadId,

    /// If the thread is runnable, blocked, or terminated.
    pub(crate) state: State,

    /// The next action to execute. `None` only when terminated.
    pub(crate) cont: Option<Action>,

    /// Installed handler frames, innermost last.
    pub(crate) frames: Vec<Frame>,

    pub(crate) mask: Mask,

    /// An asynchronous exception awaiting an interruptible point.
    pub(crate) pending: Option<Exception>,

    /// Resources this thread has declared interest in. Maintained for the
    /// exploration layer; the interpreter itself never reads it.
    pub(crate) acquainted: HashSet<ResourceId>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum State {
    Runnable,
    Blocked(Blocking),
    Terminated(Cause),
}

/// Why a thread is blocked, carrying the resource it waits on.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Blocking {
    Take(CVarId),
    Read(CVarId),
    Put(CVarId),
    ThrowTo(ThreadId),
    /// Blocked inside a retrying transaction; woken when any watched
    /// variable is written.
    Stm(Vec<TxVarId>),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Cause {
    Stopped,
    Killed,
}

impl Thread {
    pub(crate) fn new(id: ThreadId, cont: Action, mask: Mask) -> Thread {
        Thread {
            id,
            state: State::Runnable,
            cont: Some(cont),
            frames: Vec::new(),
            mask,
            pending: None,
            acquainted: HashSet::new(),
        }
    }

    pub(crate) fn is_runnable(&self) -> bool {
        matches!(self.state, State::Runnable)
    }

    pub(crate) fn is_blocked(&self) -> bool {
        matches!(self.state, State::Blocked(..))
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.state, State::Terminated(..))
    }

    pub(crate) fn set_runnable(&mut self) {
        debug_assert!(!self.is_terminated());
        self.state = State::Runnable;
    }

    pub(crate) fn set_blocked(&mut self, on: Blocking) {
        self.state = State::Blocked(on);
    }

    pub(crate) fn set_terminated(&mut self, cause: Cause) {
        self.cont = None;
        self.state = State::Terminated(cause);
    }

    /// Whether an asynchronous exception can be lodged with this thread
    /// right now: unmasked, or interruptibly masked at a blocking point.
    pub(crate) fn interruptible(&self) -> bool {
        match self.mask {
            Mask::Unmasked => true,
            Mask::Interruptible => self.is_blocked(),
            Mask::Uninterruptible => false,
        }
    }
}

impl fmt::Debug for Thread {
    // Manual impl because the continuation and handler frames hold closures.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("frames", &self.frames.len())
            .field("mask", &self.mask)
            .field("pending", &self.pending.is_some())
            .field("acquainted", &self.acquainted)
            .finish()
    }
}

/// All threads of a run, ordered by id.
///
/// Threads are appended with strictly increasing ids and never removed, so
/// lookups are a binary search. The first thread is the main thread.
pub(crate) struct Set {
    threads: Vec<Thread>,
}

impl Set {
    pub(crate) fn new(main: Action) -> Set {
        Set {
            threads: vec![Thread::new(ThreadId(0), main, Mask::Unmasked)],
        }
    }

    pub(crate) fn add(&mut self, thread: Thread) {
        if let Some(last) = self.threads.last() {
            assert!(last.id < thread.id, "thread ids must increase");
        }
        self.threads.push(thread);
    }

    pub(crate) fn main(&self) -> &Thread {
        &self.threads[0]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Thread> + '_ {
        self.threads.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Thread> + '_ {
        self.threads.iter_mut()
    }

    fn pos(&self, id: ThreadId) -> Option<usize> {
        self.threads.binary_search_by_key(&id, |th| th.id).ok()
    }
}

impl ops::Index<ThreadId> for Set {
    type Output = Thread;

    fn index(&self, index: ThreadId) -> &Thread {
        let pos = self.pos(index).expect("unknown thread");
        &self.threads[pos]
    }
}

impl ops::IndexMut<ThreadId> for Set {
    fn index_mut(&mut self, index: ThreadId) -> &mut Thread {
        let pos = self.pos(index).expect("unknown thread");
        &mut self.threads[pos]
    }
}
