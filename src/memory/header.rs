//! Header for all heap nodes
//!
//! Supports garbage collection: a mark bit read against the heap's
//! current mark state and a managed bit saying whether the collector
//! owns the node at all.

use bitmaps::Bitmap;

use super::mark::MarkState;

#[derive(Debug, Clone, Copy)]
pub struct HeaderBits(Bitmap<2>);

const MARK_BIT: usize = 0;
const MANAGED_BIT: usize = 1;

impl HeaderBits {
    /// Return 'unmarked' header bits according to the current value
    /// of unmarked (which flips on each collection)
    fn unmarked(state: MarkState) -> HeaderBits {
        let mut m = HeaderBits(Bitmap::default());
        m.unmark(state);
        m
    }

    fn mark(&mut self, state: MarkState) {
        self.0.set(MARK_BIT, state.current());
    }

    fn unmark(&mut self, state: MarkState) {
        self.0.set(MARK_BIT, !state.current());
    }

    fn is_marked(&self, state: MarkState) -> bool {
        self.0.get(MARK_BIT) == state.current()
    }

    fn set_managed(&mut self) {
        self.0.set(MANAGED_BIT, true);
    }

    fn is_managed(&self) -> bool {
        self.0.get(MANAGED_BIT)
    }
}

/// Node header
///
/// Only managed nodes are swept. Unmanaged nodes belong to whoever
/// allocated them and are freed or handed to the collector explicitly.
#[derive(Debug, Clone, Copy)]
pub struct NodeHeader {
    bits: HeaderBits,
}

impl NodeHeader {
    pub fn new(state: MarkState, managed: bool) -> Self {
        let mut bits = HeaderBits::unmarked(state);
        if managed {
            bits.set_managed();
        }
        NodeHeader { bits }
    }

    pub fn mark(&mut self, state: MarkState) {
        self.bits.mark(state)
    }

    pub fn unmark(&mut self, state: MarkState) {
        self.bits.unmark(state)
    }

    pub fn is_marked(&self, state: MarkState) -> bool {
        self.bits.is_marked(state)
    }

    pub fn manage(&mut self) {
        self.bits.set_managed()
    }

    pub fn is_managed(&self) -> bool {
        self.bits.is_managed()
    }
}

#[cfg(test)]
pub mod tests {
    use std::mem::size_of;

    use super::*;

    #[test]
    pub fn test_expected_bitmap_size() {
        assert_eq!(size_of::<HeaderBits>(), 1);
    }

    #[test]
    pub fn test_mark_follows_state() {
        let mut state = MarkState::default();
        let mut header = NodeHeader::new(state, true);
        assert!(!header.is_marked(state));
        header.mark(state);
        assert!(header.is_marked(state));
        state.flip();
        assert!(!header.is_marked(state));
        assert!(header.is_managed());
    }

    #[test]
    pub fn test_unmanaged() {
        let header = NodeHeader::new(MarkState::default(), false);
        assert!(!header.is_managed());
    }
}
