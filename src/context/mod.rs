//! Contexts: paired keylist and varlist
//!
//! A context is identified by its varlist node. Slot 0 of the varlist
//! is the archetype, a context cell naming the varlist itself; slots
//! from 1 hold variables, parallel to the keys of the keylist linked
//! from the varlist. Frames on the call stack keep only the archetype
//! in the varlist and hold their variables in the frame record.

pub mod collect;
pub mod frame;
pub mod keylist;
pub mod make;
pub mod ops;
pub mod resolve;

use crate::{
    error::{CoreError, CoreResult},
    memory::{
        heap::{Heap, NodeId},
        series::{Link, SeriesFlags},
    },
    options::TypesetPolicy,
    value::{cell::Cell, kind::Kind},
};

use keylist::{Key, Keylist, KeylistRef, EMPTY_KEYLIST};

pub use collect::{collect_keylist, collect_words, Binder, CollectFlags, CollectSession};
pub use frame::{make_action, pop_frame, push_frame};
pub use make::{construct_context, make_selfish_context_detect, merge_contexts_selfish};
pub use ops::{
    alloc_context, append_context, append_context_bind_word, append_context_core,
    bind_values_shallow,
    context_to_array, copy_context_shallow_extra, ensure_keylist_unique, expand_context,
    find_word_in_context, find_word_value, lock_context, ToArrayMode,
};
pub use resolve::{resolve_context, OnlyWords};

/// Handle to a context
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Context(NodeId);

impl Context {
    pub fn from_varlist(varlist: NodeId) -> Self {
        Context(varlist)
    }

    /// The context referenced by a context cell
    pub fn from_cell(cell: &Cell) -> Option<Self> {
        cell.context_varlist().map(Context)
    }

    pub fn varlist(self) -> NodeId {
        self.0
    }

    pub fn keylist_ref(self, heap: &Heap) -> Option<&KeylistRef> {
        match heap.try_get(self.0)?.link() {
            Link::Keylist(k) => Some(k),
            _ => None,
        }
    }

    pub(crate) fn keylist_ref_mut(self, heap: &mut Heap) -> Option<&mut KeylistRef> {
        match heap.try_get_mut(self.0)?.link_mut() {
            Link::Keylist(k) => Some(k),
            _ => None,
        }
    }

    pub fn keylist(self, heap: &Heap) -> &Keylist {
        self.keylist_ref(heap).map_or(&EMPTY_KEYLIST, |k| k.get())
    }

    /// Number of keys
    pub fn len(self, heap: &Heap) -> usize {
        self.keylist(heap).len()
    }

    pub fn is_empty(self, heap: &Heap) -> bool {
        self.len(heap) == 0
    }

    pub fn key(self, heap: &Heap, n: usize) -> Option<&Key> {
        self.keylist(heap).key(n)
    }

    /// The context cell in slot 0
    pub fn archetype(self, heap: &Heap) -> Cell {
        heap.try_get(self.0)
            .and_then(|s| s.cells().first().copied())
            .unwrap_or_else(Cell::nulled)
    }

    pub fn kind(self, heap: &Heap) -> Kind {
        self.archetype(heap).kind_unchecked()
    }

    /// Frame whose variables live on the call stack
    pub fn is_stack(self, heap: &Heap) -> bool {
        heap.try_get(self.0)
            .map_or(false, |s| s.has_flag(SeriesFlags::STACK))
    }

    pub fn is_accessible(self, heap: &Heap) -> bool {
        heap.try_get(self.0)
            .map_or(false, |s| !s.has_flag(SeriesFlags::INACCESSIBLE))
    }

    pub fn is_locked(self, heap: &Heap) -> bool {
        heap.try_get(self.0)
            .map_or(false, |s| s.has_flag(SeriesFlags::IMMUTABLE))
    }

    /// Variable `n` (1-based)
    pub fn var(self, heap: &Heap, n: usize) -> Option<&Cell> {
        if n == 0 {
            return None;
        }
        let series = heap.try_get(self.0)?;
        if series.has_flag(SeriesFlags::STACK) {
            heap.frame_for(self.0)?.args.get(n - 1)
        } else {
            series.cells().get(n)
        }
    }

    pub fn var_mut(self, heap: &mut Heap, n: usize) -> Option<&mut Cell> {
        if n == 0 {
            return None;
        }
        if self.is_stack(heap) {
            heap.frame_for_mut(self.0)?.args.get_mut(n - 1)
        } else {
            heap.try_get_mut(self.0)?.cells_mut().get_mut(n)
        }
    }

    /// Write variable `n`, honouring locks and the typeset policy
    pub fn set_var(self, heap: &mut Heap, n: usize, value: Cell) -> CoreResult<()> {
        if self.is_locked(heap) {
            return Err(CoreError::LockedContext);
        }
        let key = *self.key(heap, n).ok_or(CoreError::BadIndex(n))?;
        if key.is_locked() {
            return Err(CoreError::LockedKey(heap.spelling(key.spelling()).to_string()));
        }
        check_typeset(heap, &key, &value)?;
        let var = self.var_mut(heap, n).ok_or(CoreError::BadIndex(n))?;
        *var = value.copied();
        Ok(())
    }
}

/// Under the enforcing policy, fail if `key` does not accept `value`
pub(crate) fn check_typeset(heap: &Heap, key: &Key, value: &Cell) -> CoreResult<()> {
    if heap.options().typeset_policy() == TypesetPolicy::Enforce
        && !value.is_unreadable()
        && !key.typeset().contains(value.kind())
    {
        return Err(CoreError::TypeCheck {
            key: heap.spelling(key.spelling()).to_string(),
            kind: value.kind(),
        });
    }
    Ok(())
}
