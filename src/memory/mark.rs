//! Mark state
//!
//! Per-heap setting of whether true or false indicates a mark. This is
//! flipped after every trace so as to avoid blanking out all marks.
//!

/// The boolean value that indicates marked (known live) nodes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MarkState(bool);

impl MarkState {
    /// Current boolean value that represents marked live nodes.
    pub fn current(&self) -> bool {
        self.0
    }

    /// Flip the boolean value that represents marked live nodes.
    pub fn flip(&mut self) {
        self.0 = !self.0;
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_flip() {
        let mut state = MarkState::default();
        assert!(!state.current());
        state.flip();
        assert!(state.current());
        state.flip();
        assert!(!state.current());
    }
}
