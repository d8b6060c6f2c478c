//! Sequence edits: insert, append and change
//!
//! One algorithm shared by arrays and byte series. Every entry point
//! returns the index just past the inserted material, except append,
//! which returns 0.

pub mod array;
pub mod string;

use bitflags::bitflags;

use crate::{
    error::{CoreError, CoreResult},
    memory::heap::Heap,
    value::{cell::Cell, kind::Kind},
};

pub use array::modify_array;
pub use string::modify_string_or_binary;

/// Edit operation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verb {
    /// Insert at the target's index
    Insert,
    /// Insert at the tail, whatever the index
    Append,
    /// Overwrite from the target's index
    Change,
}

bitflags! {
    #[derive(Default)]
    pub struct ModifyFlags: u8 {
        /// An array source contributes its elements, not itself
        const SPLICE = 0b001;
        /// `part` limits the source (insert, append) or the region
        /// replaced (change)
        const PART = 0b010;
        /// Follow each duplicate with a line break
        const LINE = 0b100;
    }
}

/// Edit the series `target` refers to, at its index.
///
/// `part` only counts when `PART` is set. A `dups` below one makes
/// the call a no-op.
pub fn modify(
    heap: &mut Heap,
    target: &Cell,
    verb: Verb,
    source: &Cell,
    flags: ModifyFlags,
    part: usize,
    dups: i64,
) -> CoreResult<usize> {
    let kind = target.kind();
    if kind.is_any_array() {
        let node = target.series_node().ok_or(CoreError::BadTarget(kind))?;
        modify_array(heap, node, target.index(), verb, source, flags, part, dups)
    } else if kind.is_any_string() || kind == Kind::Binary {
        modify_string_or_binary(heap, target, verb, source, flags, part, dups)
    } else {
        Err(CoreError::BadTarget(kind))
    }
}
