//! Fixed-size arena of transfer records.
//!
//! [`SlotPool`] never grows after construction: its capacity is a memory
//! budget, not a hint. Records are addressed by [`SlotHandle`], which pairs
//! the slot index with the generation the slot had when the record was
//! stored. A handle kept past a release (for instance by a timer) no longer
//! resolves once the slot is reused, so stale callbacks become no-ops.

use std::num::NonZeroUsize;

use derive_more::Display;

/// Stable identity of one occupied slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display("slot {index}#{generation}")]
pub struct SlotHandle {
    index: usize,
    generation: u32,
}

impl SlotHandle {
    /// Position of the slot in its pool.
    #[must_use]
    pub const fn index(self) -> usize { self.index }

    /// Generation of the slot when the handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 { self.generation }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Fixed-capacity pool with generation-checked handles.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use meshfrag::SlotPool;
///
/// let mut pool = SlotPool::new(NonZeroUsize::new(1).expect("non-zero"));
/// let handle = pool.allocate("first").expect("free slot");
/// assert!(pool.allocate("second").is_none());
/// assert_eq!(pool.release(handle), Some("first"));
/// assert!(pool.get(handle).is_none());
/// ```
#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Box<[Slot<T>]>,
}

impl<T> SlotPool<T> {
    /// Create a pool of `capacity` empty slots.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        let slots = (0..capacity.get())
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();
        Self { slots }
    }

    /// Number of slots in the pool.
    #[must_use]
    pub fn capacity(&self) -> usize { self.slots.len() }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize { self.slots.iter().filter(|s| s.value.is_some()).count() }

    /// Whether no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.slots.iter().all(|s| s.value.is_none()) }

    /// Store `value` in the first free slot.
    ///
    /// Returns `None` when every slot is occupied; `value` is dropped.
    pub fn allocate(&mut self, value: T) -> Option<SlotHandle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.value.is_none())?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = Some(value);
        Some(SlotHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Borrow the record behind `handle` if the handle is still current.
    #[must_use]
    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutably borrow the record behind `handle` if the handle is still current.
    #[must_use]
    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Free the slot behind `handle`, returning its record.
    ///
    /// Stale handles leave the pool untouched and return `None`.
    pub fn release(&mut self, handle: SlotHandle) -> Option<T> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.take())
    }

    /// Return the handle of the first record matching `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<SlotHandle> {
        self.iter()
            .find(|(_, value)| predicate(value))
            .map(|(handle, _)| handle)
    }

    /// Iterate over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (SlotHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    SlotHandle {
                        index,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Mutably iterate over occupied slots.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (SlotHandle { index, generation }, value))
        })
    }
}
