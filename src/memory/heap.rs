//! The node heap
//!
//! An arena of series addressed by [`NodeId`]. Nodes are never moved;
//! a freed slot is recycled for a later allocation. Alongside the
//! nodes the heap owns everything the collector treats as a root: the
//! symbol table's built-in spellings, the guard stack and the frame
//! stack.

use std::fmt;

use crate::{
    error::{AllocError, CoreResult},
    options::CoreOptions,
    value::cell::{Binding, Cell},
};

use super::{
    header::NodeHeader,
    mark::MarkState,
    series::{Link, Series},
    symbol::{Symbol, SymbolTable},
};

/// Handle to a heap node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    header: NodeHeader,
    series: Option<Series>,
}

/// A call in progress.
///
/// The frame's varlist holds only its archetype; argument cells live
/// here for as long as the call is on the stack.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub varlist: NodeId,
    pub binding: Binding,
    /// Paramlist of the running action
    pub phase: NodeId,
    pub args: Vec<Cell>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    pub live: usize,
    pub managed: usize,
    pub free_slots: usize,
    pub collections: usize,
    pub last_swept: usize,
}

pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    mark: MarkState,
    symbols: SymbolTable,
    guarded: Vec<Cell>,
    frames: Vec<FrameRecord>,
    options: CoreOptions,
    self_symbol: Symbol,
    live: usize,
    collections: usize,
    last_swept: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap::with_options(CoreOptions::default())
    }

    pub fn with_options(options: CoreOptions) -> Self {
        let mut heap = Heap {
            slots: vec![],
            free: vec![],
            mark: MarkState::default(),
            symbols: SymbolTable::new(),
            guarded: vec![],
            frames: vec![],
            options,
            self_symbol: Symbol::from_node(NodeId(0)),
            live: 0,
            collections: 0,
            last_swept: 0,
        };
        let node = heap.place(Series::spelling("self"), true);
        heap.get_mut(node).set_link(Link::Canon(node));
        heap.self_symbol = Symbol::from_node(node);
        heap.symbols.insert("self", heap.self_symbol);
        heap
    }

    pub fn options(&self) -> &CoreOptions {
        &self.options
    }

    fn place(&mut self, series: Series, managed: bool) -> NodeId {
        let slot = Slot {
            header: NodeHeader::new(self.mark, managed),
            series: Some(series),
        };
        self.live += 1;
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = slot;
                NodeId(i)
            }
            None => {
                self.slots.push(slot);
                NodeId((self.slots.len() - 1) as u32)
            }
        }
    }

    fn check_limit(&self) -> Result<(), AllocError> {
        match self.options.node_limit() {
            Some(limit) if self.live >= limit => Err(AllocError::OutOfMemory(limit)),
            _ => Ok(()),
        }
    }

    /// Allocate a node owned by the collector
    pub fn alloc(&mut self, series: Series) -> Result<NodeId, AllocError> {
        self.check_limit()?;
        Ok(self.place(series, true))
    }

    /// Allocate a node the caller must free or manage explicitly
    pub fn alloc_unmanaged(&mut self, series: Series) -> Result<NodeId, AllocError> {
        self.check_limit()?;
        Ok(self.place(series, false))
    }

    /// Hand an unmanaged node to the collector
    pub fn manage(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            slot.header.manage();
        }
    }

    pub fn is_managed(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index())
            .map_or(false, |s| s.series.is_some() && s.header.is_managed())
    }

    /// Release an unmanaged node
    pub fn free(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            if slot.series.take().is_some() {
                self.live -= 1;
                self.free.push(id.0);
            }
        }
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.try_get(id).is_some()
    }

    pub fn try_get(&self, id: NodeId) -> Option<&Series> {
        self.slots.get(id.index()).and_then(|s| s.series.as_ref())
    }

    pub fn try_get_mut(&mut self, id: NodeId) -> Option<&mut Series> {
        self.slots
            .get_mut(id.index())
            .and_then(|s| s.series.as_mut())
    }

    /// Series of a live node.
    ///
    /// # Panics
    ///
    /// Panics if the node has been freed: a dangling id means
    /// reachability bookkeeping is already broken.
    pub fn get(&self, id: NodeId) -> &Series {
        self.try_get(id)
            .unwrap_or_else(|| panic!("Heap::get: node {id} already freed"))
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Series {
        self.try_get_mut(id)
            .unwrap_or_else(|| panic!("Heap::get_mut: node {id} already freed"))
    }

    /// Allocate a managed array of cells
    pub fn make_array(&mut self, cells: Vec<Cell>) -> CoreResult<NodeId> {
        Ok(self.alloc(Series::array(cells))?)
    }

    pub fn make_text(&mut self, s: &str) -> CoreResult<NodeId> {
        Ok(self.alloc(Series::text(s))?)
    }

    pub fn make_binary(&mut self, bytes: &[u8]) -> CoreResult<NodeId> {
        Ok(self.alloc(Series::binary(bytes.to_vec()))?)
    }

    /// Freeze a series; later edits fail with `LockedTarget`
    pub fn lock_series(&mut self, id: NodeId) {
        self.get_mut(id).lock();
    }

    /// Intern a spelling, returning its symbol.
    ///
    /// A spelling that is not already lower case is linked to the
    /// interned lower-case spelling as its canon.
    pub fn intern(&mut self, s: &str) -> CoreResult<Symbol> {
        if let Some(sym) = self.symbols.lookup(s) {
            return Ok(sym);
        }
        let lower = s.to_lowercase();
        let canon = if lower != s {
            Some(self.intern(&lower)?)
        } else {
            None
        };
        let node = self.alloc(Series::spelling(s))?;
        let canon_node = canon.map_or(node, |c| c.node());
        self.get_mut(node).set_link(Link::Canon(canon_node));
        let sym = Symbol::from_node(node);
        self.symbols.insert(s, sym);
        Ok(sym)
    }

    pub fn spelling(&self, sym: Symbol) -> &str {
        self.try_get(sym.node())
            .and_then(|s| s.as_str())
            .unwrap_or("")
    }

    pub fn canon(&self, sym: Symbol) -> Symbol {
        match self.try_get(sym.node()).map(|s| s.link()) {
            Some(Link::Canon(c)) => Symbol::from_node(*c),
            _ => sym,
        }
    }

    pub fn self_symbol(&self) -> Symbol {
        self.self_symbol
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Keep a cell alive across collections until unguarded
    pub fn guard(&mut self, cell: Cell) {
        self.guarded.push(cell);
    }

    pub fn unguard(&mut self) -> Option<Cell> {
        self.guarded.pop()
    }

    pub fn guarded(&self) -> &[Cell] {
        &self.guarded
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub(crate) fn frames_mut(&mut self) -> &mut Vec<FrameRecord> {
        &mut self.frames
    }

    /// The frame record for a varlist still on the stack
    pub fn frame_for(&self, varlist: NodeId) -> Option<&FrameRecord> {
        self.frames.iter().rev().find(|f| f.varlist == varlist)
    }

    pub(crate) fn frame_for_mut(&mut self, varlist: NodeId) -> Option<&mut FrameRecord> {
        self.frames.iter_mut().rev().find(|f| f.varlist == varlist)
    }

    pub fn mark_state(&self) -> MarkState {
        self.mark
    }

    pub fn is_marked(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index())
            .map_or(false, |s| s.series.is_some() && s.header.is_marked(self.mark))
    }

    /// Mark a live node; returns whether it was newly marked
    pub(crate) fn mark_node(&mut self, id: NodeId) -> bool {
        let state = self.mark;
        match self.slots.get_mut(id.index()) {
            Some(slot) if slot.series.is_some() && !slot.header.is_marked(state) => {
                slot.header.mark(state);
                true
            }
            _ => false,
        }
    }

    /// Ids of every node currently holding a series
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.series.is_some())
            .map(|(i, _)| NodeId(i as u32))
    }

    /// Free every managed node left unmarked; returns the count
    pub(crate) fn sweep(&mut self) -> usize {
        let state = self.mark;
        let mut swept = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.series.is_some() && slot.header.is_managed() && !slot.header.is_marked(state)
            {
                slot.series = None;
                self.free.push(i as u32);
                swept += 1;
            }
        }
        self.live -= swept;

        let slots = &self.slots;
        let dropped = self.symbols.retain_live(|sym| {
            slots
                .get(sym.node().index())
                .map_or(false, |s| s.series.is_some())
        });
        if dropped > 0 {
            log::trace!("dropped {dropped} unreachable spellings");
        }

        self.last_swept = swept;
        swept
    }

    /// After collection, flip mark state ready for next collection
    pub(crate) fn finish_collection(&mut self) {
        self.mark.flip();
        self.collections += 1;
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live: self.live,
            managed: self
                .slots
                .iter()
                .filter(|s| s.series.is_some() && s.header.is_managed())
                .count(),
            free_slots: self.free.len(),
            collections: self.collections,
            last_swept: self.last_swept,
        }
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(series) = &slot.series {
                writeln!(
                    f,
                    "#{i} {}{} {:?}",
                    if slot.header.is_managed() { "M" } else { "-" },
                    if slot.header.is_marked(self.mark) { "*" } else { " " },
                    series
                )?;
            }
        }
        Ok(())
    }
}
