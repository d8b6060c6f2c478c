//! Keylists: the symbol half of a context
//!
//! A keylist may be shared by several contexts (shallow copies, or a
//! child that added no keys to its parent's). Sharing is visible in
//! the type: a context holds either a unique keylist it may grow in
//! place or a shared one it must copy before growing.

use std::rc::Rc;

use bitflags::bitflags;

use crate::{memory::symbol::Symbol, value::kind::Typeset};

bitflags! {
    #[derive(Default)]
    pub struct KeyFlags: u8 {
        /// Not enumerated by words-of and friends
        const HIDDEN = 0b001;
        /// Variable may not be written
        const LOCKED = 0b010;
        /// Bound action dispatches infix
        const LOOKBACK = 0b100;
    }
}

/// A key: symbol, canon symbol and the kinds its variable accepts
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    spelling: Symbol,
    canon: Symbol,
    typeset: Typeset,
    flags: KeyFlags,
}

impl Key {
    pub fn new(spelling: Symbol, canon: Symbol, typeset: Typeset) -> Self {
        Key {
            spelling,
            canon,
            typeset,
            flags: KeyFlags::empty(),
        }
    }

    pub fn spelling(&self) -> Symbol {
        self.spelling
    }

    pub fn canon(&self) -> Symbol {
        self.canon
    }

    pub fn typeset(&self) -> Typeset {
        self.typeset
    }

    pub fn set_typeset(&mut self, typeset: Typeset) {
        self.typeset = typeset;
    }

    pub fn flags(&self) -> KeyFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: KeyFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: KeyFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: KeyFlags) {
        self.flags.remove(flag);
    }

    pub fn set_flag_to(&mut self, flag: KeyFlags, on: bool) {
        self.flags.set(flag, on);
    }

    pub fn with_flag(mut self, flag: KeyFlags) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.has_flag(KeyFlags::HIDDEN)
    }

    pub fn is_locked(&self) -> bool {
        self.has_flag(KeyFlags::LOCKED)
    }
}

/// Ordered keys of a context.
///
/// Slot 0 of a context is its root (the archetype in the varlist), so
/// keys are numbered from 1 and `len()` counts keys only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Keylist {
    keys: Vec<Key>,
}

impl Keylist {
    pub fn new() -> Self {
        Keylist { keys: vec![] }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Keylist {
            keys: Vec::with_capacity(capacity),
        }
    }

    pub fn from_keys(keys: Vec<Key>) -> Self {
        Keylist { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key `n` (1-based)
    pub fn key(&self, n: usize) -> Option<&Key> {
        n.checked_sub(1).and_then(|i| self.keys.get(i))
    }

    pub fn key_mut(&mut self, n: usize) -> Option<&mut Key> {
        n.checked_sub(1).and_then(move |i| self.keys.get_mut(i))
    }

    pub fn push(&mut self, key: Key) {
        self.keys.push(key);
    }

    pub fn reserve(&mut self, extra: usize) {
        self.keys.reserve(extra);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.keys.iter()
    }

    /// Index (1-based) of the key with this canon
    pub fn find_canon(&self, canon: Symbol) -> Option<usize> {
        self.keys
            .iter()
            .position(|k| k.canon == canon)
            .map(|i| i + 1)
    }
}

/// Keys of a node that has no keylist
pub(crate) static EMPTY_KEYLIST: Keylist = Keylist { keys: Vec::new() };

/// A context's hold on its keylist
#[derive(Clone, Debug)]
pub enum KeylistRef {
    /// Owned by exactly one context; may grow in place
    Unique(Keylist),
    /// Possibly held by several contexts; copy before growing
    Shared(Rc<Keylist>),
}

impl KeylistRef {
    pub fn get(&self) -> &Keylist {
        match self {
            KeylistRef::Unique(k) => k,
            KeylistRef::Shared(rc) => rc,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, KeylistRef::Shared(_))
    }

    /// Hand out a shared reference, converting a unique keylist into a
    /// shared one in place.
    pub fn share(&mut self) -> Rc<Keylist> {
        if let KeylistRef::Unique(k) = self {
            let rc = Rc::new(std::mem::take(k));
            *self = KeylistRef::Shared(rc);
        }
        match self {
            KeylistRef::Shared(rc) => rc.clone(),
            KeylistRef::Unique(_) => unreachable!(),
        }
    }

    /// Mutable access, copying a shared keylist first.
    ///
    /// Returns whether a copy was made: if so, any keylist obtained
    /// from this context beforehand is no longer the one it uses.
    pub fn make_unique(&mut self) -> (&mut Keylist, bool) {
        let copied = match self {
            KeylistRef::Unique(_) => false,
            KeylistRef::Shared(rc) => {
                let rc = std::mem::take(rc);
                match Rc::try_unwrap(rc) {
                    Ok(keylist) => {
                        *self = KeylistRef::Unique(keylist);
                        false
                    }
                    Err(rc) => {
                        *self = KeylistRef::Unique((*rc).clone());
                        true
                    }
                }
            }
        };
        match self {
            KeylistRef::Unique(k) => (k, copied),
            KeylistRef::Shared(_) => unreachable!(),
        }
    }
}
