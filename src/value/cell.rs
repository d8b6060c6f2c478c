//! The value cell
//!
//! A cell is a small `Copy` record: kind, per-cell flags, a payload
//! that is either inline data or a node reference, and a binding.
//! Whether the payload references a node is recorded in the flags at
//! construction time. The collector reads those flags rather than
//! matching on the kind, so constructors here are the only place the
//! two are brought into agreement.

use bitflags::bitflags;
use ordered_float::OrderedFloat;

use crate::memory::{heap::NodeId, symbol::Symbol};

use super::kind::{Kind, Typeset};

bitflags! {
    /// Per-cell bits
    #[derive(Default)]
    pub struct CellFlags: u8 {
        /// First payload slot holds a node the collector must mark
        const FIRST_IS_NODE = 0b0000_0001;
        /// Second payload slot (phase) holds a node
        const SECOND_IS_NODE = 0b0000_0010;
        /// Formatting: a line break precedes this cell in its array
        const NEWLINE_BEFORE = 0b0000_0100;
        /// Cell lives on the stack; binding to unmanaged nodes is legal
        const STACK_LIFETIME = 0b0000_1000;
    }
}

/// Flags that survive copying a cell into an array slot
const COPY_MASK: CellFlags = CellFlags::from_bits_truncate(
    CellFlags::FIRST_IS_NODE.bits()
        | CellFlags::SECOND_IS_NODE.bits()
        | CellFlags::NEWLINE_BEFORE.bits(),
);

/// What a word, array or frame is lexically attached to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Unbound,
    /// The varlist node of a context
    Context(NodeId),
}

impl Binding {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Binding::Unbound => None,
            Binding::Context(n) => Some(*n),
        }
    }
}

/// Cell payload
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Payload {
    None,
    Logic(bool),
    /// Integers; also nanoseconds for times and days for dates
    Integer(i64),
    /// Decimals, percents and money
    Decimal(OrderedFloat<f64>),
    Char(char),
    Tuple { len: u8, data: [u8; 7] },
    Typeset(Typeset),
    Datatype { kind: Kind, spec: Option<NodeId> },
    /// `singular` is the shared node of a managed handle
    Handle { data: usize, singular: Option<NodeId> },
    /// Single backing node (pairs, maps, bitsets, custom kinds)
    Node(NodeId),
    Event(Option<NodeId>),
    Series { node: NodeId, index: u32 },
    /// `index` is the 1-based slot when bound, -1 otherwise
    Word { spelling: Symbol, index: i32 },
    Context { varlist: NodeId, phase: Option<NodeId> },
    Varargs { phase: Option<NodeId> },
    Action { paramlist: NodeId },
    Quoted { node: NodeId, depth: u32 },
    Param { spelling: Symbol, typeset: Typeset },
    Xyf(OrderedFloat<f32>, OrderedFloat<f32>),
    VectorSign { signed: bool, integral: bool, wide: u8 },
}

impl Payload {
    /// The node in the first slot, if any
    pub fn first_node(&self) -> Option<NodeId> {
        match *self {
            Payload::Datatype { spec, .. } => spec,
            Payload::Handle { singular, .. } => singular,
            Payload::Node(n) => Some(n),
            Payload::Event(n) => n,
            Payload::Series { node, .. } => Some(node),
            Payload::Word { spelling, .. } => Some(spelling.node()),
            Payload::Context { varlist, .. } => Some(varlist),
            Payload::Action { paramlist } => Some(paramlist),
            Payload::Quoted { node, .. } => Some(node),
            Payload::Param { spelling, .. } => Some(spelling.node()),
            _ => None,
        }
    }

    /// The node in the second slot (the phase of a frame), if any
    pub fn second_node(&self) -> Option<NodeId> {
        match *self {
            Payload::Context { phase, .. } => phase,
            Payload::Varargs { phase } => phase,
            _ => None,
        }
    }
}

/// A runtime value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cell {
    kind: Kind,
    flags: CellFlags,
    payload: Payload,
    binding: Binding,
}

impl Default for Cell {
    fn default() -> Self {
        Cell::nulled()
    }
}

impl Cell {
    fn init(kind: Kind, payload: Payload, binding: Binding) -> Self {
        let mut flags = CellFlags::empty();
        if payload.first_node().is_some() {
            flags |= CellFlags::FIRST_IS_NODE;
        }
        if payload.second_node().is_some() {
            flags |= CellFlags::SECOND_IS_NODE;
        }
        Cell {
            kind,
            flags,
            payload,
            binding,
        }
    }

    fn inline(kind: Kind, payload: Payload) -> Self {
        Cell::init(kind, payload, Binding::Unbound)
    }

    pub fn nulled() -> Self {
        Cell::inline(Kind::Nulled, Payload::None)
    }

    pub fn void() -> Self {
        Cell::inline(Kind::Void, Payload::None)
    }

    pub fn blank() -> Self {
        Cell::inline(Kind::Blank, Payload::None)
    }

    pub fn logic(b: bool) -> Self {
        Cell::inline(Kind::Logic, Payload::Logic(b))
    }

    pub fn integer(i: i64) -> Self {
        Cell::inline(Kind::Integer, Payload::Integer(i))
    }

    pub fn decimal(d: f64) -> Self {
        Cell::inline(Kind::Decimal, Payload::Decimal(OrderedFloat(d)))
    }

    pub fn percent(d: f64) -> Self {
        Cell::inline(Kind::Percent, Payload::Decimal(OrderedFloat(d)))
    }

    pub fn money(d: f64) -> Self {
        Cell::inline(Kind::Money, Payload::Decimal(OrderedFloat(d)))
    }

    pub fn char(c: char) -> Self {
        Cell::inline(Kind::Char, Payload::Char(c))
    }

    pub fn time(nanos: i64) -> Self {
        Cell::inline(Kind::Time, Payload::Integer(nanos))
    }

    pub fn date(days: i64) -> Self {
        Cell::inline(Kind::Date, Payload::Integer(days))
    }

    /// A tuple of up to seven bytes (extra bytes are dropped)
    pub fn tuple(bytes: &[u8]) -> Self {
        let mut data = [0u8; 7];
        let len = bytes.len().min(7);
        data[..len].copy_from_slice(&bytes[..len]);
        Cell::inline(
            Kind::Tuple,
            Payload::Tuple {
                len: len as u8,
                data,
            },
        )
    }

    pub fn typeset(ts: Typeset) -> Self {
        Cell::inline(Kind::Typeset, Payload::Typeset(ts))
    }

    pub fn datatype(kind: Kind, spec: Option<NodeId>) -> Self {
        Cell::inline(Kind::Datatype, Payload::Datatype { kind, spec })
    }

    /// A handle with no GC interaction
    pub fn handle_simple(data: usize) -> Self {
        Cell::inline(
            Kind::Handle,
            Payload::Handle {
                data,
                singular: None,
            },
        )
    }

    /// A handle whose data lives in a shared singular node
    pub fn handle_managed(data: usize, singular: NodeId) -> Self {
        Cell::inline(
            Kind::Handle,
            Payload::Handle {
                data,
                singular: Some(singular),
            },
        )
    }

    /// Any-series reference at a position
    pub fn series(kind: Kind, node: NodeId, index: usize) -> Self {
        debug_assert!(kind.is_series());
        Cell::inline(
            kind,
            Payload::Series {
                node,
                index: index as u32,
            },
        )
    }

    pub fn block(node: NodeId) -> Self {
        Cell::series(Kind::Block, node, 0)
    }

    pub fn text(node: NodeId) -> Self {
        Cell::series(Kind::Text, node, 0)
    }

    pub fn binary(node: NodeId) -> Self {
        Cell::series(Kind::Binary, node, 0)
    }

    /// Kinds backed by exactly one node (pair, map, bitset, gob...)
    pub fn node(kind: Kind, node: NodeId) -> Self {
        Cell::inline(kind, Payload::Node(node))
    }

    pub fn event(node: Option<NodeId>) -> Self {
        Cell::inline(Kind::Event, Payload::Event(node))
    }

    /// An unbound word
    pub fn word(kind: Kind, spelling: Symbol) -> Self {
        debug_assert!(kind.is_any_word());
        Cell::inline(kind, Payload::Word { spelling, index: -1 })
    }

    /// A word bound to slot `index` of the context whose varlist is `ctx`
    pub fn bound_word(kind: Kind, spelling: Symbol, ctx: NodeId, index: usize) -> Self {
        debug_assert!(kind.is_any_word() && index > 0);
        Cell::init(
            kind,
            Payload::Word {
                spelling,
                index: index as i32,
            },
            Binding::Context(ctx),
        )
    }

    pub fn context(kind: Kind, varlist: NodeId, phase: Option<NodeId>) -> Self {
        debug_assert!(kind.is_any_context());
        Cell::inline(kind, Payload::Context { varlist, phase })
    }

    pub fn varargs(binding: NodeId, phase: Option<NodeId>) -> Self {
        Cell::init(
            Kind::Varargs,
            Payload::Varargs { phase },
            Binding::Context(binding),
        )
    }

    pub fn action(paramlist: NodeId, binding: Binding) -> Self {
        Cell::init(Kind::Action, Payload::Action { paramlist }, binding)
    }

    pub fn quoted(node: NodeId, depth: u32, binding: Binding) -> Self {
        Cell::init(Kind::Quoted, Payload::Quoted { node, depth }, binding)
    }

    pub fn param(kind: Kind, spelling: Symbol, typeset: Typeset) -> Self {
        debug_assert!(kind.is_param());
        Cell::inline(kind, Payload::Param { spelling, typeset })
    }

    pub fn gob_xyf(x: f32, y: f32) -> Self {
        Cell::inline(Kind::GobXyf, Payload::Xyf(OrderedFloat(x), OrderedFloat(y)))
    }

    pub fn vector_sign(signed: bool, integral: bool, wide: u8) -> Self {
        Cell::inline(
            Kind::VectorSign,
            Payload::VectorSign {
                signed,
                integral,
                wide,
            },
        )
    }

    /// A slot reserved for a later fill-in.
    ///
    /// Inert to the collector. Asking its kind trips an assertion in
    /// debug builds; callers that knowingly hold one must test with
    /// [`Cell::is_unreadable`].
    pub fn unreadable() -> Self {
        Cell::inline(Kind::Unreadable, Payload::None)
    }

    /// The kind of a readable cell
    pub fn kind(&self) -> Kind {
        debug_assert!(
            self.kind != Kind::Unreadable,
            "kind() of an unreadable placeholder cell"
        );
        self.kind
    }

    /// Same payload under any kind, however inconsistent
    #[cfg(test)]
    pub(crate) fn with_kind_unchecked(&self, kind: Kind) -> Cell {
        Cell { kind, ..*self }
    }

    /// The kind with no readability check (collector, checker)
    pub fn kind_unchecked(&self) -> Kind {
        self.kind
    }

    pub fn is_unreadable(&self) -> bool {
        self.kind == Kind::Unreadable
    }

    pub fn flags(&self) -> CellFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: CellFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: CellFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: CellFlags) {
        self.flags.remove(flag);
    }

    /// A copy suitable for storing into an array slot
    pub fn copied(&self) -> Cell {
        Cell {
            flags: self.flags & COPY_MASK,
            ..*self
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    pub fn set_binding(&mut self, binding: Binding) {
        self.binding = binding;
    }

    pub fn is_nulled(&self) -> bool {
        self.kind == Kind::Nulled
    }

    pub fn is_void(&self) -> bool {
        self.kind == Kind::Void
    }

    pub fn is_blank(&self) -> bool {
        self.kind == Kind::Blank
    }

    pub fn as_integer(&self) -> Option<i64> {
        match (self.kind, self.payload) {
            (Kind::Integer, Payload::Integer(i)) => Some(i),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<char> {
        match self.payload {
            Payload::Char(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_logic(&self) -> Option<bool> {
        match self.payload {
            Payload::Logic(b) => Some(b),
            _ => None,
        }
    }

    /// Series node of an any-series cell
    pub fn series_node(&self) -> Option<NodeId> {
        match self.payload {
            Payload::Series { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Position of an any-series cell
    pub fn index(&self) -> usize {
        match self.payload {
            Payload::Series { index, .. } => index as usize,
            _ => 0,
        }
    }

    /// Same series reference at a different position
    pub fn at(&self, index: usize) -> Cell {
        match self.payload {
            Payload::Series { node, .. } => Cell {
                payload: Payload::Series {
                    node,
                    index: index as u32,
                },
                ..*self
            },
            _ => *self,
        }
    }

    /// Same cell referencing a different series (deep copies)
    pub fn with_series_node(&self, node: NodeId) -> Cell {
        match self.payload {
            Payload::Series { index, .. } => Cell {
                payload: Payload::Series { node, index },
                ..*self
            },
            _ => *self,
        }
    }

    /// The same cell re-tagged as a different kind of the same class
    /// (e.g. word to set-word, block to group)
    pub fn with_kind(&self, kind: Kind) -> Cell {
        debug_assert!(
            (kind.is_any_word() && self.kind.is_any_word())
                || (kind.is_series() && self.kind.is_series())
                || (kind.is_any_context() && self.kind.is_any_context())
        );
        Cell { kind, ..*self }
    }

    pub fn word_spelling(&self) -> Option<Symbol> {
        match self.payload {
            Payload::Word { spelling, .. } => Some(spelling),
            Payload::Param { spelling, .. } => Some(spelling),
            _ => None,
        }
    }

    /// Raw slot index of a word (-1 when unbound)
    pub fn word_index(&self) -> Option<i32> {
        match self.payload {
            Payload::Word { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn is_word_bound(&self) -> bool {
        self.kind.is_any_word() && self.binding != Binding::Unbound
    }

    /// Attach a word to slot `index` of the context with varlist `ctx`
    pub fn bind_word(&mut self, ctx: NodeId, index: usize) {
        if let Payload::Word { spelling, .. } = self.payload {
            self.payload = Payload::Word {
                spelling,
                index: index as i32,
            };
            self.binding = Binding::Context(ctx);
        }
    }

    pub fn unbind_word(&mut self) {
        if let Payload::Word { spelling, .. } = self.payload {
            self.payload = Payload::Word {
                spelling,
                index: -1,
            };
            self.binding = Binding::Unbound;
        }
    }

    pub fn context_varlist(&self) -> Option<NodeId> {
        match self.payload {
            Payload::Context { varlist, .. } => Some(varlist),
            _ => None,
        }
    }

    pub fn phase(&self) -> Option<NodeId> {
        self.payload.second_node()
    }

    pub fn action_paramlist(&self) -> Option<NodeId> {
        match self.payload {
            Payload::Action { paramlist } => Some(paramlist),
            _ => None,
        }
    }

    pub fn param_typeset(&self) -> Option<Typeset> {
        match self.payload {
            Payload::Param { typeset, .. } => Some(typeset),
            _ => None,
        }
    }

    pub fn num_quotes(&self) -> u32 {
        match self.payload {
            Payload::Quoted { depth, .. } if self.kind == Kind::Quoted => depth,
            _ => 0,
        }
    }
}

/// Turn a null into a void, leaving anything else alone
pub fn voidify_if_nulled(cell: &mut Cell) -> &mut Cell {
    if cell.is_nulled() {
        *cell = Cell::void();
    }
    cell
}

/// Loops reserve null for BREAK and blank for "body never ran"
pub fn voidify_if_nulled_or_blank(cell: &mut Cell) -> &mut Cell {
    if cell.is_nulled() || cell.is_blank() {
        *cell = Cell::void();
    }
    cell
}
