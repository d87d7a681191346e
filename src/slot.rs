//! Slot identifiers shared between the allocator and slot lists

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a data slot
///
/// Issued by a [`SlotAllocator`](crate::SlotAllocator) and used as a direct index into every
/// [`SlotList`](crate::SlotList) that stores data under it. An identifier only has meaning
/// together with the allocator that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(usize);

impl SlotId {
    /// Wrap a raw slot index
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of this slot in allocator tables and slot lists
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl From<SlotId> for usize {
    fn from(id: SlotId) -> usize {
        id.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}
