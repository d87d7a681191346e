//! Slot identifier allocator

use crate::config::SlotConfig;
use crate::error::{Error, Result};
use crate::slot::SlotId;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Allocation table guarded by the allocator lock
///
/// Entry `i` is `Some(SlotId(i))` while slot `i` is in use and `None` once it has been freed.
#[derive(Debug, Default)]
struct SlotTable {
    slots: Vec<Option<SlotId>>,
    n_used: usize,
}

impl SlotTable {
    fn is_live(&self, slot: SlotId) -> bool {
        self.slots.get(slot.index()).copied().flatten() == Some(slot)
    }
}

/// Shared registry of slot identifiers
///
/// Hands out small integer identifiers with a first-fit policy and reclaims them on
/// [`free`](Self::free). The allocator is safe to share between threads; every operation takes
/// the internal lock for its whole duration.
///
/// Once every identifier has been freed the table is released and numbering restarts at 0, so an
/// identifier value must not be treated as meaningful after it has been freed.
#[derive(Debug)]
pub struct SlotAllocator {
    table: Mutex<SlotTable>,
    max_slots: Option<usize>,
}

impl SlotAllocator {
    /// Create an empty allocator with no limit on the number of slots
    pub fn new() -> Self {
        Self::with_config(&SlotConfig::default())
    }

    /// Create an empty allocator honouring `config.max_slots`
    pub fn with_config(config: &SlotConfig) -> Self {
        info!("Initializing slot allocator (max_slots: {:?})", config.max_slots);
        Self {
            table: Mutex::new(SlotTable::default()),
            max_slots: config.max_slots,
        }
    }

    /// Allocate a slot identifier
    ///
    /// Reuses the lowest freed identifier if there is one, otherwise grows the table by exactly
    /// one entry. A failed growth leaves every existing allocation untouched.
    pub fn allocate(&self) -> Result<SlotId> {
        let mut table = self.table.lock();

        let free = if table.n_used < table.slots.len() {
            table.slots.iter().position(Option::is_none)
        } else {
            None
        };
        debug_assert_eq!(free.is_some(), table.n_used < table.slots.len());

        if let Some(index) = free {
            let slot = SlotId::new(index);
            table.slots[index] = Some(slot);
            table.n_used += 1;
            debug!("Allocated {} (reused)", slot);
            return Ok(slot);
        }

        let index = table.slots.len();
        if let Some(limit) = self.max_slots {
            if index >= limit {
                warn!("Slot allocator is full ({} slots)", limit);
                return Err(Error::CapacityExceeded {
                    what: "slot allocator",
                    limit,
                });
            }
        }
        table.slots.try_reserve_exact(1).map_err(|e| {
            Error::OutOfMemory(format!("Failed to grow slot table to {}: {}", index + 1, e))
        })?;

        let slot = SlotId::new(index);
        table.slots.push(Some(slot));
        table.n_used += 1;
        debug!("Allocated {}", slot);
        Ok(slot)
    }

    /// Release a slot identifier
    ///
    /// Data stored under `slot` in any [`SlotList`](crate::SlotList) is left alone; it is dropped
    /// when that list is destroyed or the slot is overwritten.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not currently allocated from this allocator, including a double free.
    pub fn free(&self, slot: SlotId) {
        let mut table = self.table.lock();

        assert!(
            table.is_live(slot),
            "{} freed but not allocated from this allocator",
            slot
        );

        table.slots[slot.index()] = None;
        table.n_used -= 1;
        debug!("Freed {}", slot);

        if table.n_used == 0 {
            table.slots = Vec::new();
            debug!("Released slot table, no slots in use");
        }
    }

    /// Whether `slot` is currently allocated from this allocator
    pub fn is_allocated(&self, slot: SlotId) -> bool {
        self.table.lock().is_live(slot)
    }

    /// Current size of the allocation table (in-use plus freed entries)
    pub fn allocated_count(&self) -> usize {
        self.table.lock().slots.len()
    }

    /// Number of identifiers currently in use
    pub fn used_count(&self) -> usize {
        self.table.lock().n_used
    }

    /// Get a consistent snapshot of the allocation table
    pub fn stats(&self) -> AllocatorStats {
        let table = self.table.lock();
        AllocatorStats {
            allocated_slots: table.slots.len(),
            used_slots: table.n_used,
            free_slots: table.slots.len() - table.n_used,
        }
    }

    /// Panic unless `slot` is live; checked by slot lists on every access.
    pub(crate) fn assert_allocated(&self, slot: SlotId) {
        assert!(
            self.is_allocated(slot),
            "{} used but not allocated from this allocator",
            slot
        );
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a slot allocator
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    pub allocated_slots: usize,
    pub used_slots: usize,
    pub free_slots: usize,
}
