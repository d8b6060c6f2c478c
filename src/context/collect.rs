//! Key collection
//!
//! Scanning a body for the words that become a context's keys needs a
//! transient map from canon symbol to slot number so every distinct
//! word contributes exactly one key. The map and its scratch key buffer
//! live in a [`Binder`] owned by the caller. A pass borrows them through
//! a [`CollectSession`], which empties both when it is dropped, so an
//! early return with `?` leaves nothing behind for the next pass.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;

use crate::{
    error::{CoreError, CoreResult},
    memory::{
        heap::{Heap, NodeId},
        symbol::Symbol,
    },
    value::{
        cell::Cell,
        kind::{Kind, Typeset},
    },
};

use super::{
    find_word_in_context,
    keylist::{Key, KeyFlags, Keylist, KeylistRef},
    Context,
};

bitflags! {
    /// What a collection pass picks up. With no flags set only
    /// set-words become keys.
    #[derive(Default)]
    pub struct CollectFlags: u8 {
        /// Any word, not just set-words
        const ANY_WORD = 0b0001;
        /// Recurse into nested blocks and groups
        const DEEP = 0b0010;
        /// A repeated word is an error
        const NO_DUP = 0b0100;
        /// Guarantee a hidden `self` key
        const ENSURE_SELF = 0b1000;
    }
}

/// Canon symbol to slot map plus the keys collected so far
#[derive(Debug, Default)]
pub struct Binder {
    table: HashMap<Symbol, i32>,
    buf: Vec<Key>,
}

impl Binder {
    pub fn new() -> Self {
        Binder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty() && self.buf.is_empty()
    }

    /// Begin a collection pass.
    ///
    /// Passes do not nest: the binder must be empty on entry.
    pub fn start(&mut self) -> CollectSession<'_> {
        debug_assert!(self.is_empty(), "collection pass started on a dirty binder");
        CollectSession { binder: self }
    }
}

/// A collection pass in progress; resets the binder when dropped
pub struct CollectSession<'a> {
    binder: &'a mut Binder,
}

impl<'a> CollectSession<'a> {
    pub fn get(&self, canon: Symbol) -> Option<i32> {
        self.binder.table.get(&canon).copied()
    }

    /// Record a slot for `canon`; false if it already had one
    pub fn set(&mut self, canon: Symbol, index: i32) -> bool {
        if self.binder.table.contains_key(&canon) {
            return false;
        }
        self.binder.table.insert(canon, index);
        true
    }

    /// Record a slot for `canon`, replacing any earlier one
    pub fn put(&mut self, canon: Symbol, index: i32) {
        self.binder.table.insert(canon, index);
    }

    pub fn remove(&mut self, canon: Symbol) -> Option<i32> {
        self.binder.table.remove(&canon)
    }

    /// Append a key to the scratch buffer; returns its 1-based index
    pub fn push_key(&mut self, key: Key) -> usize {
        self.binder.buf.push(key);
        self.binder.buf.len()
    }

    pub fn key_count(&self) -> usize {
        self.binder.buf.len()
    }

    pub fn keys(&self) -> &[Key] {
        &self.binder.buf
    }

    pub fn take_keys(&mut self) -> Vec<Key> {
        std::mem::take(&mut self.binder.buf)
    }

    /// Seed the pass with an existing keylist's keys.
    ///
    /// When checking duplicates, a key whose canon is already present
    /// is skipped and keeps its earlier slot.
    pub fn collect_context_keys(&mut self, keylist: &Keylist, check_dups: bool) {
        for key in keylist.iter() {
            let index = self.key_count() as i32 + 1;
            if !self.set(key.canon(), index) && check_dups {
                continue;
            }
            self.push_key(*key);
        }
    }

    /// Scan cells for words qualifying under `flags`
    pub fn inner_loop(&mut self, heap: &Heap, cells: &[Cell], flags: CollectFlags) -> CoreResult<()> {
        let mut visited = HashSet::new();
        self.scan(heap, cells, flags, &mut visited)
    }

    fn scan(
        &mut self,
        heap: &Heap,
        cells: &[Cell],
        flags: CollectFlags,
        visited: &mut HashSet<NodeId>,
    ) -> CoreResult<()> {
        for cell in cells.iter().filter(|c| !c.is_unreadable()) {
            let kind = cell.kind();
            if kind.is_any_word() {
                let spelling = match cell.word_spelling() {
                    Some(s) => s,
                    None => continue,
                };
                let canon = heap.canon(spelling);
                match self.get(canon) {
                    None => {
                        if kind == Kind::SetWord || flags.contains(CollectFlags::ANY_WORD) {
                            let index = self.push_key(Key::new(
                                spelling,
                                canon,
                                Typeset::all_but_void(),
                            ));
                            self.set(canon, index as i32);
                        }
                    }
                    Some(_) if flags.contains(CollectFlags::NO_DUP) => {
                        return Err(CoreError::DuplicateKey(heap.spelling(spelling).to_string()));
                    }
                    Some(_) => {}
                }
                continue;
            }

            if flags.contains(CollectFlags::DEEP) && kind.is_any_eval_block() {
                if let Some(node) = cell.series_node() {
                    if visited.insert(node) {
                        let inner = heap.get(node).cells();
                        let from = cell.index().min(inner.len());
                        self.scan(heap, &inner[from..], flags, visited)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a> Drop for CollectSession<'a> {
    fn drop(&mut self) {
        self.binder.table.clear();
        self.binder.buf.clear();
    }
}

/// Result of `collect_keylist`
#[derive(Debug)]
pub struct Collected {
    pub keylist: KeylistRef,
    /// Index of the `self` key when one was requested
    pub self_index: Option<usize>,
    /// The prior context's keylist came back unchanged
    pub reused: bool,
}

/// Collect the keys a context built from `body` needs.
///
/// Keys of `prior` come first and keep their slots. If the body adds
/// nothing to them the prior keylist itself is returned, shared.
pub fn collect_keylist(
    heap: &mut Heap,
    binder: &mut Binder,
    body: &[Cell],
    prior: Option<Context>,
    flags: CollectFlags,
) -> CoreResult<Collected> {
    let mut session = binder.start();

    let mut self_index = None;
    if flags.contains(CollectFlags::ENSURE_SELF) {
        let self_sym = heap.self_symbol();
        self_index = prior.and_then(|p| find_word_in_context(heap, p, self_sym, true));
        if self_index.is_none() {
            let key = Key::new(self_sym, heap.canon(self_sym), Typeset::ALL)
                .with_flag(KeyFlags::HIDDEN);
            let index = session.push_key(key);
            session.set(key.canon(), index as i32);
            self_index = Some(index);
        }
    }

    if let Some(p) = prior {
        session.collect_context_keys(p.keylist(heap), false);
    }

    session.inner_loop(heap, body, flags)?;

    let count = session.key_count();
    if let Some(p) = prior {
        if count == p.len(heap) {
            if let Some(k) = p.keylist_ref_mut(heap) {
                return Ok(Collected {
                    keylist: KeylistRef::Shared(k.share()),
                    self_index,
                    reused: true,
                });
            }
        }
    }

    Ok(Collected {
        keylist: KeylistRef::Unique(Keylist::from_keys(session.take_keys())),
        self_index,
        reused: false,
    })
}

/// Collect unbound words from `body` into a new array.
///
/// Words in `prior` are treated as already seen and left out.
pub fn collect_words(
    heap: &mut Heap,
    binder: &mut Binder,
    body: &[Cell],
    prior: Option<&[Cell]>,
    flags: CollectFlags,
) -> CoreResult<NodeId> {
    let words: Vec<Cell> = {
        let mut session = binder.start();
        for spelling in prior
            .unwrap_or(&[])
            .iter()
            .filter(|c| !c.is_unreadable() && c.kind().is_any_word())
            .filter_map(|c| c.word_spelling())
        {
            session.set(heap.canon(spelling), -1);
        }
        session.inner_loop(heap, body, flags)?;
        session
            .keys()
            .iter()
            .map(|k| Cell::word(Kind::Word, k.spelling()))
            .collect()
    };
    heap.make_array(words)
}
