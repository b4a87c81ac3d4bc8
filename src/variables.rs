//! Variable table (component C5): named scalars and arrays, `PROC`/`FN`
//! local scoping via `LOCAL`, and the generation counter that invalidates
//! cached slot references after `CLEAR`/`NEW`.
//!
//! Grounded on `processor::CPU`'s register file: a small fixed address
//! space (`D0..D7`/`A0..A7`) looked up by a compact key, generalized here to
//! an open-ended name table. The generation counter is the redesign named in
//! `spec.md` §9: a resolved `Token::Var{generation, slot}` is only trusted
//! when its generation matches the table's current one, exactly the pattern
//! `fields::Field` conversions use a typed wrapper instead of re-deriving
//! bits on every access.

use crate::arena::Arena;
use crate::error::{BasicError, ErrorKind, Result};
use crate::strings::{StringHandle, StringStore};
use crate::value::{ArrayValue, TypeTag, Value};
use std::collections::HashMap;

/// Rough per-cell accounting charge used to debit the workspace arena when a
/// scalar or array element is written. The variable table does not actually
/// store bytes in the arena — values live in native Rust containers — but
/// every write still has to pass the same `VARTOP`/`STACKLIMIT` budget check
/// a real allocation would, so `DIM` and string growth raise `NoRoom` at the
/// same workspace size an arena-backed implementation would (spec.md §4.1).
const CELL_CHARGE: u32 = 8;

#[derive(Debug, Clone)]
enum Slot {
    Scalar(Value),
    Array(ArrayValue),
}

impl Slot {
    fn type_tag(&self) -> TypeTag {
        match self {
            Slot::Scalar(v) => v.type_tag(),
            Slot::Array(a) => a.elements.first().map(Value::type_tag).unwrap_or(TypeTag::Numeric),
        }
    }
}

/// One `PROC`/`FN` activation's `LOCAL` bookkeeping: the prior value of each
/// name declared local within this frame, restored when the frame pops
/// (spec.md §4.6).
#[derive(Default)]
struct Frame {
    saved: Vec<(String, Option<Slot>)>,
}

/// The complete variable namespace: 27 fast static slots (`A%`..`Z%`,
/// `@%`), a flat global table, and a stack of `LOCAL` frames.
pub struct VariableTable {
    generation: u32,
    statics: [i32; 27],
    globals: HashMap<String, Slot>,
    slots: Vec<String>,
    frames: Vec<Frame>,
    /// `arena.vartop` at each frame's `push_frame`, so `pop_frame` can call
    /// [`StringStore::strings_discard_above`] for the frame it's leaving.
    frame_watermarks: Vec<u32>,
    arena: Arena,
    /// Scalar string variables' backing blocks (component C2). Array string
    /// elements are charged through [`Self::charge`] like any other cell and
    /// don't get individual descriptors — only named scalars do.
    strings: StringStore,
    string_handles: HashMap<String, StringHandle>,
}

/// A cached reference into the global table (`spec.md` §9's
/// `{generation, slot}` pair). Stale handles (generation mismatch) must be
/// re-resolved by name; `VariableTable` never panics on a stale handle, it
/// returns `None` from [`VariableTable::get_cached`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarHandle {
    pub generation: u32,
    pub slot: u32,
}

impl VariableTable {
    pub fn new() -> Self {
        VariableTable::with_arena(Arena::new(Arena::MIN_SIZE))
    }

    pub fn with_arena(arena: Arena) -> Self {
        VariableTable {
            generation: 0,
            statics: [0; 27],
            globals: HashMap::new(),
            slots: Vec::new(),
            frames: Vec::new(),
            frame_watermarks: Vec::new(),
            arena,
            strings: StringStore::new(),
            string_handles: HashMap::new(),
        }
    }

    /// Charges `cells` worth of workspace against the arena, surfacing
    /// `NoRoom` at the same point a byte-backed store would run out
    /// (spec.md §4.1). The charge is never released on overwrite — matching
    /// the no-fragmentation contract — but is reset wholesale on
    /// [`Self::clear`].
    fn charge(&mut self, cells: u32) -> Result<()> {
        self.arena.alloc(cells.saturating_mul(CELL_CHARGE)).map(|_| ())
    }

    /// Allocates or grows/shrinks `name`'s string-store block to hold
    /// `new_len` bytes (spec.md §4.2's `string_alloc`/`string_resize`),
    /// charging the same arena budget a byte-backed string would pay.
    fn charge_string(&mut self, name: &str, new_len: u32) -> Result<()> {
        if new_len > crate::strings::MAX_STRING {
            return Err(BasicError::new(ErrorKind::StringLen, None));
        }
        let handle = match self.string_handles.remove(name) {
            Some(handle) => self.strings.string_resize(&mut self.arena, handle, new_len)?,
            None => self.strings.string_alloc(&mut self.arena, new_len)?,
        };
        self.string_handles.insert(name.to_string(), handle);
        Ok(())
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn get_static(&self, index: u8) -> i32 {
        self.statics[index as usize]
    }

    pub fn set_static(&mut self, index: u8, value: i32) {
        self.statics[index as usize] = value;
    }

    /// `CLEAR`/`NEW`: drops every variable and bumps the generation so any
    /// cached `VarHandle` fails its next lookup instead of aliasing a
    /// reused slot.
    pub fn clear(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.globals.clear();
        self.slots.clear();
        self.frames.clear();
        self.frame_watermarks.clear();
        self.string_handles.clear();
        self.statics = [0; 27];
        self.arena.clear_vars();
        self.strings.strings_clear();
    }

    fn type_check(name: &str, value: &Value) -> Result<()> {
        let wants_string = name.ends_with('$');
        if wants_string != value.is_string() {
            return Err(BasicError::new(if wants_string { ErrorKind::TypeString } else { ErrorKind::TypeNum }, None));
        }
        Ok(())
    }

    /// Resolves `name` to a stable slot index, creating the name's map
    /// entry (but not a value) if this is the first reference. Used so
    /// `Token::XVar` can be upgraded to `Token::Var` on first use.
    pub fn handle_for(&mut self, name: &str) -> VarHandle {
        let slot = self.slots.iter().position(|s| s == name).unwrap_or_else(|| {
            self.slots.push(name.to_string());
            self.slots.len() - 1
        });
        VarHandle { generation: self.generation, slot: slot as u32 }
    }

    fn name_in_scope(&self, name: &str) -> Option<&Slot> {
        if let Some(frame) = self.frames.last() {
            if frame.saved.iter().any(|(n, _)| n == name) {
                return self.globals.get(name);
            }
        }
        self.globals.get(name)
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        match self.name_in_scope(name) {
            Some(Slot::Scalar(v)) => Ok(v.clone()),
            Some(Slot::Array(_)) => Err(BasicError::new(ErrorKind::TypeMismatch, None)),
            None => Ok(Value::default_for_suffix(name)),
        }
    }

    /// Fast path for an already-resolved `Token::Var` whose generation still
    /// matches. Returns `None` on a stale handle so the caller falls back to
    /// [`Self::get`] by name.
    pub fn get_cached(&self, handle: VarHandle, name: &str) -> Option<Value> {
        if handle.generation != self.generation {
            return None;
        }
        self.get(name).ok()
    }

    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        Self::type_check(name, &value)?;
        match &value {
            Value::Str(bytes) => self.charge_string(name, bytes.len() as u32)?,
            _ => {
                if !self.globals.contains_key(name) {
                    self.charge(1)?;
                }
            }
        }
        self.globals.insert(name.to_string(), Slot::Scalar(value));
        Ok(())
    }

    pub fn dim(&mut self, name: &str, dims: Vec<u32>, fill: Value) -> Result<()> {
        Self::type_check(name, &fill)?;
        if dims.is_empty() || dims.len() > 10 {
            return Err(BasicError::new(ErrorKind::BadDim, None));
        }
        let total: u32 = dims.iter().map(|d| d + 1).product();
        self.charge(total)?;
        let array = ArrayValue::new(dims, fill);
        self.globals.insert(name.to_string(), Slot::Array(array));
        Ok(())
    }

    pub fn array_get(&self, name: &str, indices: &[u32]) -> Result<Value> {
        match self.globals.get(name) {
            Some(Slot::Array(a)) => {
                let idx = a.index_of(indices)?;
                Ok(a.elements[idx].clone())
            }
            Some(Slot::Scalar(_)) => Err(BasicError::new(ErrorKind::TypeMismatch, None)),
            None => Err(BasicError::new(ErrorKind::ArrayIndex, None)),
        }
    }

    pub fn array_set(&mut self, name: &str, indices: &[u32], value: Value) -> Result<()> {
        Self::type_check(name, &value)?;
        match self.globals.get_mut(name) {
            Some(Slot::Array(a)) => {
                let idx = a.index_of(indices)?;
                a.elements[idx] = value;
                Ok(())
            }
            Some(Slot::Scalar(_)) => Err(BasicError::new(ErrorKind::TypeMismatch, None)),
            None => Err(BasicError::new(ErrorKind::ArrayIndex, None)),
        }
    }

    pub fn array_dims(&self, name: &str) -> Result<&[u32]> {
        match self.globals.get(name) {
            Some(Slot::Array(a)) => Ok(&a.dims),
            _ => Err(BasicError::new(ErrorKind::ArrayIndex, None)),
        }
    }

    /// Enters a new `PROC`/`FN` activation (spec.md §4.6).
    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
        self.frame_watermarks.push(self.arena.vartop);
    }

    /// `LOCAL name`: saves the current global value of `name` (or its
    /// absence) into the active frame, so it can be restored on
    /// [`Self::pop_frame`].
    pub fn declare_local(&mut self, name: &str) -> Result<()> {
        let frame = self.frames.last_mut().ok_or(BasicError::new(ErrorKind::NotProc, None))?;
        let prior = self.globals.get(name).cloned();
        frame.saved.push((name.to_string(), prior));
        Ok(())
    }

    /// Leaves the current `PROC`/`FN` activation, restoring every `LOCAL`
    /// declared within it to its pre-call value.
    pub fn pop_frame(&mut self) -> Result<()> {
        let frame = self.frames.pop().ok_or(BasicError::new(ErrorKind::NotProc, None))?;
        let watermark = self.frame_watermarks.pop().unwrap_or(0);
        for (name, prior) in frame.saved.into_iter().rev() {
            // This local's string block (if any) is scratch space for the
            // activation that's exiting; release it before the prior value
            // takes its place (spec.md §4.2: "used on PROC/FN return to
            // release locals").
            if let Some(handle) = self.string_handles.remove(&name) {
                self.strings.string_free(handle);
            }
            match prior {
                Some(slot) => {
                    self.globals.insert(name, slot);
                }
                None => {
                    self.globals.remove(&name);
                }
            }
        }
        self.strings.strings_discard_above(watermark);
        Ok(())
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Pops frames down to `depth`, used by `ON ERROR`'s stack-unwind
    /// (spec.md §4.13) when an error is trapped from deeper inside nested
    /// `PROC`/`FN` calls than the handler's installation point.
    pub fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            let _ = self.pop_frame();
        }
    }

    pub fn type_tag_of(&self, name: &str) -> Option<TypeTag> {
        self.globals.get(name).map(Slot::type_tag)
    }

    /// Backs the `HIMEM`/`LOMEM`/`PAGE`/`TOP`/`FREE` introspection functions
    /// (spec.md §4.1): bytes of workspace still available between `VARTOP`
    /// and the stack guard.
    pub fn free_bytes(&self) -> u32 {
        self.arena.stacklimit.saturating_sub(self.arena.vartop)
    }

    pub fn himem(&self) -> u32 {
        self.arena.himem
    }
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut table = VariableTable::new();
        table.set("X", Value::Int32(42)).unwrap();
        assert!(matches!(table.get("X").unwrap(), Value::Int32(42)));
    }

    #[test]
    fn unset_numeric_defaults_to_zero() {
        let table = VariableTable::new();
        assert!(matches!(table.get("X").unwrap(), Value::Int32(0)));
    }

    #[test]
    fn unset_string_defaults_to_empty() {
        let table = VariableTable::new();
        assert!(matches!(table.get("A$").unwrap(), Value::Str(ref s) if s.is_empty()));
    }

    #[test]
    fn type_mismatch_on_suffix_violation() {
        let mut table = VariableTable::new();
        assert!(table.set("A$", Value::Int32(1)).is_err());
    }

    #[test]
    fn clear_bumps_generation_and_invalidates_handle() {
        let mut table = VariableTable::new();
        table.set("X", Value::Int32(1)).unwrap();
        let handle = table.handle_for("X");
        table.clear();
        assert!(table.get_cached(handle, "X").is_none());
    }

    #[test]
    fn local_restores_prior_value_on_frame_pop() {
        let mut table = VariableTable::new();
        table.set("X", Value::Int32(1)).unwrap();
        table.push_frame();
        table.declare_local("X").unwrap();
        table.set("X", Value::Int32(2)).unwrap();
        assert!(matches!(table.get("X").unwrap(), Value::Int32(2)));
        table.pop_frame().unwrap();
        assert!(matches!(table.get("X").unwrap(), Value::Int32(1)));
    }

    #[test]
    fn dim_exhausting_the_arena_raises_no_room() {
        let mut arena = Arena::new(Arena::MIN_SIZE);
        arena.stacktop = 64;
        let mut table = VariableTable::with_arena(arena);
        assert!(table.dim("A", vec![1_000_000], Value::Int32(0)).is_err());
    }

    #[test]
    fn array_bounds_are_checked() {
        let mut table = VariableTable::new();
        table.dim("A", vec![4], Value::Int32(0)).unwrap();
        assert!(table.array_get("A", &[10]).is_err());
        table.array_set("A", &[2], Value::Int32(9)).unwrap();
        assert!(matches!(table.array_get("A", &[2]).unwrap(), Value::Int32(9)));
    }

    #[test]
    fn growing_a_string_variable_reuses_its_store_entry() {
        let mut table = VariableTable::new();
        table.set("A$", Value::Str(b"hi".to_vec())).unwrap();
        assert!(table.string_handles.contains_key("A$"));
        table.set("A$", Value::Str(b"a much longer greeting".to_vec())).unwrap();
        assert!(matches!(table.get("A$").unwrap(), Value::Str(ref s) if s == b"a much longer greeting"));
    }

    #[test]
    fn local_string_block_is_freed_on_frame_pop() {
        let mut table = VariableTable::new();
        table.push_frame();
        table.declare_local("A$").unwrap();
        table.set("A$", Value::Str(b"scratch".to_vec())).unwrap();
        assert!(table.string_handles.contains_key("A$"));
        table.pop_frame().unwrap();
        assert!(!table.string_handles.contains_key("A$"));
        assert!(matches!(table.get("A$").unwrap(), Value::Str(ref s) if s.is_empty()));
    }

    #[test]
    fn clear_drops_every_string_store_entry() {
        let mut table = VariableTable::new();
        table.set("A$", Value::Str(b"hello".to_vec())).unwrap();
        table.clear();
        assert!(table.string_handles.is_empty());
    }
}
