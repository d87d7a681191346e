//! Per-object storage of data slots
//!
//! A [`SlotList`] is a sparse array indexed by [`SlotId`]. Each entry holds a value and an
//! optional destructor which the list runs when it is destroyed. Overwriting an entry hands the
//! previous value and destructor back to the caller instead of running the destructor, so the
//! caller decides when (and on which thread) cleanup happens.
//!
//! ```text
//! SlotAllocator         (shared)   ids: 0 1 2 3
//!
//! SlotList (object A)   [ a0 | -- | a2 ]
//! SlotList (object B)   [ b0 | b1 | -- | b3 ]
//! ```

use crate::allocator::SlotAllocator;
use crate::config::SlotConfig;
use crate::error::{Error, Result};
use crate::slot::SlotId;
use std::fmt;
use tracing::trace;

/// Cleanup procedure stored alongside a value
pub type Destructor<T> = Box<dyn FnOnce(T) + Send>;

struct SlotEntry<T> {
    value: Option<T>,
    destructor: Option<Destructor<T>>,
}

impl<T> Default for SlotEntry<T> {
    fn default() -> Self {
        Self {
            value: None,
            destructor: None,
        }
    }
}

/// Value and destructor handed back when a slot is overwritten or cleared
///
/// The list no longer owns either of them. Dropping this without calling
/// [`finalize`](Self::finalize) drops the value without running its destructor.
pub struct Replaced<T> {
    pub value: Option<T>,
    pub destructor: Option<Destructor<T>>,
}

impl<T> Replaced<T> {
    /// Whether the slot held nothing before
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.destructor.is_none()
    }

    /// Run the destructor on the value, if both are present
    pub fn finalize(self) {
        if let (Some(value), Some(destructor)) = (self.value, self.destructor) {
            destructor(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Replaced<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replaced")
            .field("value", &self.value)
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}

/// Sparse per-object storage keyed by slot identifier
///
/// The list is only as long as the highest slot ever set on it and never shrinks until it is
/// destroyed. It has no internal locking; every mutation takes `&mut self`.
///
/// Every access must pass the allocator that issued the slot identifiers used with this list.
pub struct SlotList<T> {
    slots: Vec<SlotEntry<T>>,
    max_len: Option<usize>,
}

impl<T> SlotList<T> {
    /// Create an empty list without allocating
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            max_len: None,
        }
    }

    /// Create an empty list honouring `config.max_list_len`
    pub fn with_config(config: &SlotConfig) -> Self {
        Self {
            slots: Vec::new(),
            max_len: config.max_list_len,
        }
    }

    /// Number of entries, i.e. one past the highest slot ever set
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store `value` and its `destructor` under `slot`
    ///
    /// Grows the list to exactly `slot + 1` entries if needed. On failure the list is left
    /// unchanged. On success the previous value and destructor are returned; the destructor is
    /// not run.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not currently allocated from `allocator`.
    pub fn set(
        &mut self,
        allocator: &SlotAllocator,
        slot: SlotId,
        value: T,
        destructor: Option<Destructor<T>>,
    ) -> Result<Replaced<T>> {
        allocator.assert_allocated(slot);

        let index = slot.index();
        if index >= self.slots.len() {
            self.grow_to(index + 1)?;
        }

        let entry = &mut self.slots[index];
        Ok(Replaced {
            value: entry.value.replace(value),
            destructor: std::mem::replace(&mut entry.destructor, destructor),
        })
    }

    /// Get the value stored under `slot`
    ///
    /// Never grows the list.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not currently allocated from `allocator`.
    pub fn get(&self, allocator: &SlotAllocator, slot: SlotId) -> Option<&T> {
        allocator.assert_allocated(slot);
        self.slots.get(slot.index())?.value.as_ref()
    }

    /// Get a mutable reference to the value stored under `slot`
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not currently allocated from `allocator`.
    pub fn get_mut(&mut self, allocator: &SlotAllocator, slot: SlotId) -> Option<&mut T> {
        allocator.assert_allocated(slot);
        self.slots.get_mut(slot.index())?.value.as_mut()
    }

    /// Take the value and destructor out of `slot`, leaving it empty
    ///
    /// The list keeps its length. The destructor is not run.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not currently allocated from `allocator`.
    pub fn clear(&mut self, allocator: &SlotAllocator, slot: SlotId) -> Replaced<T> {
        allocator.assert_allocated(slot);
        match self.slots.get_mut(slot.index()) {
            Some(entry) => Replaced {
                value: entry.value.take(),
                destructor: entry.destructor.take(),
            },
            None => Replaced {
                value: None,
                destructor: None,
            },
        }
    }

    /// Run every stored destructor in ascending slot order and empty the list
    ///
    /// Called automatically when the list is dropped.
    pub fn destroy(&mut self) {
        let slots = std::mem::take(&mut self.slots);
        trace!("Destroying slot list with {} entries", slots.len());

        for entry in slots {
            if let (Some(value), Some(destructor)) = (entry.value, entry.destructor) {
                destructor(value);
            }
        }
    }

    fn grow_to(&mut self, new_len: usize) -> Result<()> {
        if let Some(limit) = self.max_len {
            if new_len > limit {
                return Err(Error::CapacityExceeded {
                    what: "slot list",
                    limit,
                });
            }
        }

        self.slots
            .try_reserve_exact(new_len - self.slots.len())
            .map_err(|e| Error::OutOfMemory(format!("Failed to grow slot list to {}: {}", new_len, e)))?;
        trace!("Growing slot list from {} to {}", self.slots.len(), new_len);
        self.slots.resize_with(new_len, SlotEntry::default);
        Ok(())
    }
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SlotList<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<T> fmt::Debug for SlotList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotList")
            .field("len", &self.slots.len())
            .field("max_len", &self.max_len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<u32>>>) -> Destructor<u32> {
        let log = log.clone();
        Box::new(move |v: u32| log.lock().unwrap().push(v))
    }

    #[test]
    fn test_new_list_is_empty() {
        let list: SlotList<u32> = SlotList::new();
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
    }

    #[test]
    fn test_set_grows_to_minimum() -> Result<()> {
        let allocator = SlotAllocator::new();
        let slots: Vec<_> = (0..4).map(|_| allocator.allocate()).collect::<Result<_>>()?;
        let mut list = SlotList::new();

        let old = list.set(&allocator, slots[3], 30u32, None)?;
        assert!(old.is_empty());
        assert_eq!(list.len(), 4);

        // Lower slots were zero-filled
        assert_eq!(list.get(&allocator, slots[0]), None);
        assert_eq!(list.get(&allocator, slots[2]), None);
        assert_eq!(list.get(&allocator, slots[3]), Some(&30));

        // Setting a lower slot does not change the length
        list.set(&allocator, slots[1], 10, None)?;
        assert_eq!(list.len(), 4);
        Ok(())
    }

    #[test]
    fn test_get_never_grows() -> Result<()> {
        let allocator = SlotAllocator::new();
        let a = allocator.allocate()?;
        let b = allocator.allocate()?;
        let mut list = SlotList::new();

        list.set(&allocator, a, 1u32, None)?;
        assert_eq!(list.get(&allocator, b), None);
        assert_eq!(list.len(), 1);
        Ok(())
    }

    #[test]
    fn test_set_hands_back_old_pair() -> Result<()> {
        let allocator = SlotAllocator::new();
        let slot = allocator.allocate()?;
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SlotList::new();

        list.set(&allocator, slot, 1u32, Some(recorder(&log)))?;
        let old = list.set(&allocator, slot, 2, Some(recorder(&log)))?;

        assert_eq!(old.value, Some(1));
        assert!(old.destructor.is_some());
        // Nothing ran yet
        assert!(log.lock().unwrap().is_empty());

        old.finalize();
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert_eq!(list.get(&allocator, slot), Some(&2));
        Ok(())
    }

    #[test]
    fn test_dropping_replaced_skips_destructor() -> Result<()> {
        let allocator = SlotAllocator::new();
        let slot = allocator.allocate()?;
        let calls = Arc::new(AtomicUsize::new(0));
        let mut list = SlotList::new();

        let counter = calls.clone();
        list.set(
            &allocator,
            slot,
            1u32,
            Some(Box::new(move |_: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )?;
        let old = list.set(&allocator, slot, 2, None)?;
        drop(old);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_get_mut() -> Result<()> {
        let allocator = SlotAllocator::new();
        let slot = allocator.allocate()?;
        let mut list = SlotList::new();

        list.set(&allocator, slot, vec![1u8], None)?;
        if let Some(v) = list.get_mut(&allocator, slot) {
            v.push(2);
        }
        assert_eq!(list.get(&allocator, slot), Some(&vec![1, 2]));
        Ok(())
    }

    #[test]
    fn test_clear_keeps_length() -> Result<()> {
        let allocator = SlotAllocator::new();
        let a = allocator.allocate()?;
        let b = allocator.allocate()?;
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SlotList::new();

        list.set(&allocator, b, 7u32, Some(recorder(&log)))?;
        let old = list.clear(&allocator, b);
        assert_eq!(old.value, Some(7));
        assert!(old.destructor.is_some());
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(&allocator, b), None);

        // Clearing beyond the end does not grow
        let mut short = SlotList::<u32>::new();
        assert!(short.clear(&allocator, a).is_empty());
        assert_eq!(short.len(), 0);

        list.destroy();
        assert!(log.lock().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn test_destroy_runs_in_ascending_order() -> Result<()> {
        let allocator = SlotAllocator::new();
        let slots: Vec<_> = (0..5).map(|_| allocator.allocate()).collect::<Result<_>>()?;
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SlotList::new();

        for &i in &[4usize, 0, 2] {
            list.set(&allocator, slots[i], i as u32, Some(recorder(&log)))?;
        }
        // No destructor: must not be called
        list.set(&allocator, slots[3], 3, None)?;

        list.destroy();
        assert_eq!(*log.lock().unwrap(), vec![0, 2, 4]);
        assert!(list.is_empty());

        // A second destroy is a no-op
        list.destroy();
        assert_eq!(log.lock().unwrap().len(), 3);
        Ok(())
    }

    #[test]
    fn test_drop_destroys() -> Result<()> {
        let allocator = SlotAllocator::new();
        let slot = allocator.allocate()?;
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let mut list = SlotList::new();
            list.set(&allocator, slot, 9u32, Some(recorder(&log)))?;
        }

        assert_eq!(*log.lock().unwrap(), vec![9]);
        Ok(())
    }

    #[test]
    fn test_list_limit_leaves_list_unchanged() -> Result<()> {
        let allocator = SlotAllocator::new();
        let slots: Vec<_> = (0..4).map(|_| allocator.allocate()).collect::<Result<_>>()?;
        let config = SlotConfig {
            max_list_len: Some(2),
            ..Default::default()
        };
        let mut list = SlotList::with_config(&config);

        list.set(&allocator, slots[1], 1u32, None)?;
        let err = list.set(&allocator, slots[3], 3, None).unwrap_err();

        assert!(matches!(
            err,
            Error::CapacityExceeded {
                limit: 2,
                ..
            }
        ));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(&allocator, slots[1]), Some(&1));
        assert_eq!(list.get(&allocator, slots[0]), None);
        Ok(())
    }

    #[test]
    fn test_data_outlives_freed_slot() -> Result<()> {
        let allocator = SlotAllocator::new();
        let keep = allocator.allocate()?;
        let slot = allocator.allocate()?;
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SlotList::new();

        list.set(&allocator, slot, 5u32, Some(recorder(&log)))?;
        allocator.free(slot);
        assert!(log.lock().unwrap().is_empty());

        drop(list);
        assert_eq!(*log.lock().unwrap(), vec![5]);
        allocator.free(keep);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "not allocated")]
    fn test_set_unallocated_slot_panics() {
        let allocator = SlotAllocator::new();
        let mut list = SlotList::new();
        let _ = list.set(&allocator, SlotId::new(0), 1u32, None);
    }

    #[test]
    #[should_panic(expected = "not allocated")]
    fn test_get_freed_slot_panics() {
        let allocator = SlotAllocator::new();
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        allocator.free(b);
        let list: SlotList<u32> = SlotList::new();
        let _ = list.get(&allocator, a);
        let _ = list.get(&allocator, b);
    }
}
