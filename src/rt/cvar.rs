//! The synchronized single-slot variable.

use std::collections::VecDeque;

use crate::rt::action::Value;
use crate::rt::ident::ThreadId;

/// A single-slot, multi-waiter cell.
///
/// Waiter queues hold thread ids only: a blocked thread keeps its whole
/// suspended action and retries it when next scheduled, so a wakeup wave
/// makes every waiter runnable and the scheduler decides who wins. Losers
/// re-block by re-executing.
pub(crate) struct CVar {
    slot: Option<Value>,
    takers: VecDeque<ThreadId>,
    readers: VecDeque<ThreadId>,
    putters: VecDeque<ThreadId>,
}

impl CVar {
    pub(crate) fn new() -> CVar {
        CVar {
            slot: None,
            takers: VecDeque::new(),
            readers: VecDeque::new(),
            putters: VecDeque::new(),
        }
    }

    /// Fill the slot. On success the woken takers and readers are returned,
    /// takers first, FIFO within each queue; when already full the value is
    /// handed back so the caller can stash the suspended action.
    pub(crate) fn put(&mut self, value: Value) -> Result<Vec<ThreadId>, Value> {
        if self.slot.is_some() {
            return Err(value);
        }

        self.slot = Some(value);

        let mut woken: Vec<_> = self.takers.drain(..).collect();
        woken.extend(self.readers.drain(..));
        Ok(woken)
    }

    /// Empty the slot, waking every blocked putter.
    pub(crate) fn take(&mut self) -> Option<(Value, Vec<ThreadId>)> {
        let value = self.slot.take()?;
        let woken = self.putters.drain(..).collect();
        Some((value, woken))
    }

    /// Observe the value without emptying the slot.
    pub(crate) fn read(&self) -> Option<Value> {
        self.slot.clone()
    }

    pub(crate) fn block_taker(&mut self, id: ThreadId) {
        self.takers.push_back(id);
    }

    pub(crate) fn block_reader(&mut self, id: ThreadId) {
        self.readers.push_back(id);
    }

    pub(crate) fn block_putter(&mut self, id: ThreadId) {
        self.putters.push_back(id);
    }
}
