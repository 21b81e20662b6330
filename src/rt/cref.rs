//! Backing storage for mutable reference cells.
//!
//! A reference cell never blocks; `ModRef` is atomic because an action is
//! one driver step. Under the sequentially consistent baseline a read
//! observes the most recent write in global step order, which is exactly
//! what a single map updated in step order provides.

use std::collections::HashMap;
use std::fmt;

use crate::rt::action::Value;
use crate::rt::ident::CRefId;

pub(crate) struct Store {
    cells: HashMap<CRefId, Value>,
}

impl Store {
    pub(crate) fn new() -> Store {
        Store {
            cells: HashMap::new(),
        }
    }

    pub(crate) fn alloc(&mut self, id: CRefId, value: Value) {
        let prev = self.cells.insert(id, value);
        assert!(prev.is_none(), "reference cell {} allocated twice", id);
    }

    pub(crate) fn read(&self, id: CRefId) -> Value {
        self.cells
            .get(&id)
            .expect("read from unknown reference cell")
            .clone()
    }

    pub(crate) fn write(&mut self, id: CRefId, value: Value) {
        let prev = self.cells.insert(id, value);
        assert!(prev.is_some(), "write to unknown reference cell");
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Store")
            .field("cells", &self.cells.len())
            .finish()
    }
}
