//! Generational slot arena
//!
//! Backing storage for pipeline nodes, layer nodes and textures. Handles
//! carry a slot index and a generation counter so that a handle kept past
//! the release of its slot is detected instead of silently aliasing the
//! slot's next occupant.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed arena handle
pub trait ArenaId: Copy + Eq {
    fn from_parts(idx: u32, generation: u32) -> Self;
    fn idx(self) -> u32;
    fn generation(self) -> u32;
}

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            idx: u32,
            generation: u32,
        }

        impl $name {
            /// Returns the raw slot index (for diagnostics only).
            #[inline]
            #[must_use]
            pub const fn index(self) -> u32 {
                self.idx
            }
        }

        impl $crate::arena::ArenaId for $name {
            fn from_parts(idx: u32, generation: u32) -> Self {
                Self { idx, generation }
            }

            fn idx(self) -> u32 {
                self.idx
            }

            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({}@gen{})", stringify!($name), self.idx, self.generation)
            }
        }
    };
}

pub(crate) use arena_id;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with a free list
pub(crate) struct Arena<I, T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
    _id: PhantomData<I>,
}

impl<I: ArenaId, T> Arena<I, T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            _id: PhantomData,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> I {
        self.live += 1;
        if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.value = Some(value);
            return I::from_parts(idx, slot.generation);
        }

        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        I::from_parts(idx, 0)
    }

    /// Frees the slot and returns its value.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    pub(crate) fn remove(&mut self, id: I) -> T {
        let slot = self.live_slot_mut(id);
        let value = slot.value.take();
        // Bump generation so old handles immediately fail validation.
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.idx());
        self.live -= 1;
        match value {
            Some(value) => value,
            None => unreachable!("live slot without a value"),
        }
    }

    pub(crate) fn contains(&self, id: I) -> bool {
        self.slots
            .get(id.idx() as usize)
            .is_some_and(|slot| slot.generation == id.generation() && slot.value.is_some())
    }

    pub(crate) fn get(&self, id: I) -> Option<&T> {
        self.slots
            .get(id.idx() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    /// Number of occupied slots
    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.value
                .as_ref()
                .map(|value| (I::from_parts(idx as u32, slot.generation), value))
        })
    }

    fn live_slot_mut(&mut self, id: I) -> &mut Slot<T> {
        match self.slots.get_mut(id.idx() as usize) {
            Some(slot) if slot.generation == id.generation() && slot.value.is_some() => slot,
            _ => panic!("stale arena handle (slot {})", id.idx()),
        }
    }
}

impl<I: ArenaId + fmt::Debug, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("stale arena handle {:?}", id),
        }
    }
}

impl<I: ArenaId + fmt::Debug, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        match self.live_slot_mut(id).value.as_mut() {
            Some(value) => value,
            None => unreachable!("live slot without a value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    arena_id!(TestId);

    #[test]
    fn test_insert_and_remove() {
        let mut arena: Arena<TestId, &str> = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena[a], "a");

        assert_eq!(arena.remove(a), "a");
        assert_eq!(arena.len(), 1);
        assert!(!arena.contains(a));
        assert!(arena.contains(b));
    }

    #[test]
    fn test_generation_prevents_stale_access() {
        let mut arena: Arena<TestId, u32> = Arena::new();
        let first = arena.insert(1);
        arena.remove(first);

        // Reuses the slot under a new generation
        let second = arena.insert(2);
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert_eq!(arena[second], 2);
    }

    #[test]
    #[should_panic(expected = "stale arena handle")]
    fn test_stale_index_panics() {
        let mut arena: Arena<TestId, u32> = Arena::new();
        let id = arena.insert(1);
        arena.remove(id);
        let _ = arena[id];
    }

    #[test]
    fn test_debug_format() {
        let mut arena: Arena<TestId, u32> = Arena::new();
        let id = arena.insert(7);
        assert_eq!(format!("{:?}", id), "TestId(0@gen0)");
    }
}
