use std::fmt;

macro_rules! ids {
    ($($(#[$attr:meta])* $name:ident),*) => {
        $(
            $(#[$attr])*
            #[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
            pub struct $name(pub(crate) usize);

            impl $name {
                /// Returns the raw integer behind this identifier.
                pub fn as_usize(self) -> usize {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.0.fmt(fmt)
                }
            }
        )*
    };
}

ids! {
    /// Identifies a thread within a run. The initial thread is always
    /// `ThreadId` 0; forked threads count up from 1.
    ThreadId,
    /// Identifies a synchronized variable within a run.
    CVarId,
    /// Identifies a mutable reference cell within a run.
    CRefId,
    /// Identifies a transactional variable within a run.
    TxVarId
}

/// Source of fresh identifiers for a run.
///
/// Four disjoint spaces, each counting up from zero. Allocation is
/// increment-then-return, so the first identifier handed out in every space
/// is 1; the initial thread's id 0 is given, never allocated. Identifiers
/// are never reused within a run.
#[derive(Debug, Clone, Default)]
pub(crate) struct IdSource {
    thread: usize,
    cvar: usize,
    cref: usize,
    txvar: usize,
}

impl IdSource {
    pub(crate) fn new() -> IdSource {
        IdSource::default()
    }

    pub(crate) fn fresh_thread(&mut self) -> ThreadId {
        self.thread += 1;
        ThreadId(self.thread)
    }

    pub(crate) fn fresh_cvar(&mut self) -> CVarId {
        self.cvar += 1;
        CVarId(self.cvar)
    }

    pub(crate) fn fresh_cref(&mut self) -> CRefId {
        self.cref += 1;
        CRefId(self.cref)
    }

    pub(crate) fn fresh_txvar(&mut self) -> TxVarId {
        self.txvar += 1;
        TxVarId(self.txvar)
    }
}
