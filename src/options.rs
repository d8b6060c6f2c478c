//! Heap and editing options
//!
//! Built up with `with_*` methods in the same way as any other
//! settings struct handed to the heap at construction.

/// Whether key typesets constrain the values stored through them
/// when contexts are inherited, merged or resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypesetPolicy {
    /// Keys accept any value (historical object behaviour)
    #[default]
    Ignore,
    /// A value whose kind is outside the key's typeset fails with
    /// `CoreError::TypeCheck`
    Enforce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreOptions {
    /// Text series shorter than this (in codepoints) carry no bookmark
    bookmark_threshold: usize,
    typeset_policy: TypesetPolicy,
    /// Audit every reachable cell after the mark phase
    check_reachability: bool,
    /// Cap on live nodes; allocation beyond it fails
    node_limit: Option<usize>,
    /// Trace-log the node table around each collection
    dump_heap: bool,
}

impl Default for CoreOptions {
    fn default() -> Self {
        CoreOptions {
            bookmark_threshold: 32,
            typeset_policy: TypesetPolicy::default(),
            check_reachability: cfg!(debug_assertions),
            node_limit: None,
            dump_heap: false,
        }
    }
}

impl CoreOptions {
    pub fn bookmark_threshold(&self) -> usize {
        self.bookmark_threshold
    }

    pub fn typeset_policy(&self) -> TypesetPolicy {
        self.typeset_policy
    }

    pub fn check_reachability(&self) -> bool {
        self.check_reachability
    }

    pub fn node_limit(&self) -> Option<usize> {
        self.node_limit
    }

    pub fn dump_heap(&self) -> bool {
        self.dump_heap
    }

    pub fn with_bookmark_threshold(mut self, threshold: usize) -> Self {
        self.bookmark_threshold = threshold;
        self
    }

    pub fn with_typeset_policy(mut self, policy: TypesetPolicy) -> Self {
        self.typeset_policy = policy;
        self
    }

    pub fn with_reachability_checks(mut self) -> Self {
        self.check_reachability = true;
        self
    }

    pub fn without_reachability_checks(mut self) -> Self {
        self.check_reachability = false;
        self
    }

    pub fn with_node_limit(mut self, limit: usize) -> Self {
        self.node_limit = Some(limit);
        self
    }

    pub fn with_heap_dump(mut self) -> Self {
        self.dump_heap = true;
        self
    }
}
