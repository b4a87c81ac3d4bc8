//! String store (component C2): a small bank of size-class free lists over
//! the workspace arena, plus a large-string path that falls through to
//! `Arena::alloc` directly (spec.md §4.2).
//!
//! Grounded on `memory::RAM`'s flat-array-with-bounds-checking pattern via
//! `arena.rs`'s `Arena::alloc`, bucketed here into size classes with a
//! free list per class instead of `arena.rs`'s single topmost cursor — the
//! same budget-accounting-only stance `arena.rs` takes for scalar cells:
//! string bytes live in `Value::Str`'s owned `Vec<u8>`, and this store
//! tracks the `{ptr, len, cap}` descriptor and workspace charge a
//! byte-backed implementation would have to pay.

use crate::arena::{Arena, ArenaPtr};
use crate::error::Result;

/// Longest string BASIC will construct (spec.md §4.2: "implementation
/// constant, ≥256"; spec.md §8 boundary case: "length capped at 65535").
pub const MAX_STRING: u32 = 65535;

/// Size classes a short string rounds up to, matching `arena.rs`'s 8-byte
/// alignment at the bottom end. Anything longer than the last class takes
/// the large-string path and allocates its exact length.
pub const SHORT_STRING_CLASSES: &[u32] = &[8, 16, 32, 64, 128, 256];

fn class_for(len: u32) -> Option<usize> {
    SHORT_STRING_CLASSES.iter().position(|&cap| len <= cap)
}

/// A string descriptor (spec.md §4.2: "`ptr,len,cap`... `0 ≤ len ≤ cap ≤
/// MAXSTRING`"). `class` is `None` for a large-string block, which can only
/// be reclaimed by a wholesale reset, never an individual free.
#[derive(Debug, Clone, Copy)]
pub struct StringHandle {
    pub ptr: ArenaPtr,
    pub len: u32,
    pub cap: u32,
    class: Option<usize>,
}

/// Owns one free list per size class. Holds no bytes itself — `Arena` backs
/// every live and free block by address.
pub struct StringStore {
    free_lists: Vec<Vec<ArenaPtr>>,
}

impl StringStore {
    pub fn new() -> Self {
        StringStore { free_lists: vec![Vec::new(); SHORT_STRING_CLASSES.len()] }
    }

    /// `string_alloc(len)`: reuses a free block of the right class if one
    /// exists, otherwise bumps the arena for a fresh one.
    pub fn string_alloc(&mut self, arena: &mut Arena, len: u32) -> Result<StringHandle> {
        match class_for(len) {
            Some(class) => {
                if let Some(ptr) = self.free_lists[class].pop() {
                    return Ok(StringHandle { ptr, len, cap: SHORT_STRING_CLASSES[class], class: Some(class) });
                }
                let cap = SHORT_STRING_CLASSES[class];
                let ptr = arena.alloc(cap)?;
                Ok(StringHandle { ptr, len, cap, class: Some(class) })
            }
            None => {
                let ptr = arena.alloc(len)?;
                Ok(StringHandle { ptr, len, cap: len, class: None })
            }
        }
    }

    /// `string_free(s)`: links a short-string block back into its class's
    /// free list. Large-string blocks aren't individually freeable (spec.md
    /// §4.1: "No fragmentation-reclaiming; arbitrary-order free is not
    /// supported") — they're only released by [`Self::strings_clear`].
    pub fn string_free(&mut self, handle: StringHandle) {
        if let Some(class) = handle.class {
            self.free_lists[class].push(handle.ptr);
        }
    }

    /// `string_resize(ptr, oldlen, newlen)`: grows or shrinks in place when
    /// the new length still fits the current block's capacity; otherwise
    /// allocates a fresh block sized for `new_len` and frees the old one.
    pub fn string_resize(&mut self, arena: &mut Arena, handle: StringHandle, new_len: u32) -> Result<StringHandle> {
        if new_len <= handle.cap {
            return Ok(StringHandle { len: new_len, ..handle });
        }
        let grown = self.string_alloc(arena, new_len)?;
        self.string_free(handle);
        Ok(grown)
    }

    /// `strings_discard_above(addr)`: drops every free-list entry at or
    /// above `watermark` — blocks that were allocated since a `PROC`/`FN`
    /// activation began and so cannot outlive it (spec.md §4.2: "used on
    /// PROC/FN return to release locals").
    pub fn strings_discard_above(&mut self, watermark: u32) {
        for list in &mut self.free_lists {
            list.retain(|ptr| ptr.offset < watermark);
        }
    }

    /// `strings_clear()`: `CLEAR`/`NEW` — every live descriptor is about to
    /// be invalidated by `Arena::clear_vars` anyway, so the free lists are
    /// simply dropped rather than walked.
    pub fn strings_clear(&mut self) {
        for list in &mut self.free_lists {
            list.clear();
        }
    }
}

impl Default for StringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_rounds_up_to_the_next_size_class() {
        let mut arena = Arena::new(Arena::MIN_SIZE);
        let mut store = StringStore::new();
        let handle = store.string_alloc(&mut arena, 5).unwrap();
        assert_eq!(handle.cap, 8);
        assert_eq!(handle.len, 5);
    }

    #[test]
    fn free_then_alloc_of_the_same_class_reuses_the_block() {
        let mut arena = Arena::new(Arena::MIN_SIZE);
        let mut store = StringStore::new();
        let first = store.string_alloc(&mut arena, 3).unwrap();
        let vartop_after_first = arena.vartop;
        store.string_free(first);
        let second = store.string_alloc(&mut arena, 6).unwrap();
        assert_eq!(second.ptr, first.ptr);
        assert_eq!(arena.vartop, vartop_after_first);
    }

    #[test]
    fn resize_within_capacity_does_not_reallocate() {
        let mut arena = Arena::new(Arena::MIN_SIZE);
        let mut store = StringStore::new();
        let handle = store.string_alloc(&mut arena, 3).unwrap();
        let grown = store.string_resize(&mut arena, handle, 7).unwrap();
        assert_eq!(grown.ptr, handle.ptr);
        assert_eq!(grown.len, 7);
    }

    #[test]
    fn resize_beyond_capacity_allocates_a_new_block() {
        let mut arena = Arena::new(Arena::MIN_SIZE);
        let mut store = StringStore::new();
        let handle = store.string_alloc(&mut arena, 3).unwrap();
        let grown = store.string_resize(&mut arena, handle, 300).unwrap();
        assert_ne!(grown.ptr, handle.ptr);
        assert_eq!(grown.cap, 300);
    }

    #[test]
    fn discard_above_drops_only_high_free_entries() {
        let mut arena = Arena::new(Arena::MIN_SIZE);
        let mut store = StringStore::new();
        let low = store.string_alloc(&mut arena, 3).unwrap();
        let high = store.string_alloc(&mut arena, 3).unwrap();
        store.string_free(low);
        store.string_free(high);
        store.strings_discard_above(high.ptr.offset);
        let reused = store.string_alloc(&mut arena, 3).unwrap();
        assert_eq!(reused.ptr, low.ptr);
    }

    #[test]
    fn clear_empties_every_free_list() {
        let mut arena = Arena::new(Arena::MIN_SIZE);
        let mut store = StringStore::new();
        let handle = store.string_alloc(&mut arena, 3).unwrap();
        store.string_free(handle);
        store.strings_clear();
        let fresh = store.string_alloc(&mut arena, 3).unwrap();
        assert_ne!(fresh.ptr, handle.ptr);
    }
}
