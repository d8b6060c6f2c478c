//! Collector support
//!
//! Marking starts from the roots passed in plus the roots the heap
//! owns: guarded cells, the frame stack, built-in spellings and the
//! contents of every unmanaged node. Reached nodes are queued and
//! scanned breadth first. Once marking is done the reachability
//! checker may audit the result before unmarked managed nodes are
//! swept.

use std::collections::VecDeque;

use crate::{
    error::InvariantViolation,
    value::cell::{Cell, CellFlags},
};

use super::{
    check::{assert_reachable_and_consistent, audit},
    heap::{FrameRecord, Heap, HeapStats, NodeId},
    series::{Link, Series},
};

/// Anything that holds references to heap nodes
pub trait GcScannable {
    /// Push every node referenced directly
    fn scan(&self, out: &mut Vec<NodeId>);

    /// Check held cells with the reachability checker
    fn audit(&self, _heap: &Heap) -> Result<(), InvariantViolation> {
        Ok(())
    }
}

impl GcScannable for Cell {
    fn scan(&self, out: &mut Vec<NodeId>) {
        if self.is_unreadable() {
            return;
        }
        let payload = self.payload();
        if self.has_flag(CellFlags::FIRST_IS_NODE) {
            out.extend(payload.first_node());
        }
        if self.has_flag(CellFlags::SECOND_IS_NODE) {
            out.extend(payload.second_node());
        }
        if self.kind().is_bindable() {
            out.extend(self.binding().node());
        }
    }

    fn audit(&self, heap: &Heap) -> Result<(), InvariantViolation> {
        assert_reachable_and_consistent(heap, self)
    }
}

impl GcScannable for [Cell] {
    fn scan(&self, out: &mut Vec<NodeId>) {
        for cell in self {
            cell.scan(out);
        }
    }

    fn audit(&self, heap: &Heap) -> Result<(), InvariantViolation> {
        self.iter().try_for_each(|c| c.audit(heap))
    }
}

impl GcScannable for Vec<Cell> {
    fn scan(&self, out: &mut Vec<NodeId>) {
        self.as_slice().scan(out)
    }

    fn audit(&self, heap: &Heap) -> Result<(), InvariantViolation> {
        self.as_slice().audit(heap)
    }
}

impl GcScannable for Series {
    fn scan(&self, out: &mut Vec<NodeId>) {
        self.cells().scan(out);
        match self.link() {
            Link::None => {}
            Link::Canon(canon) => out.push(*canon),
            Link::Keylist(keys) => {
                for key in keys.get().iter() {
                    out.push(key.spelling().node());
                    out.push(key.canon().node());
                }
            }
        }
    }
}

impl GcScannable for FrameRecord {
    fn scan(&self, out: &mut Vec<NodeId>) {
        out.push(self.varlist);
        out.push(self.phase);
        out.extend(self.binding.node());
        self.args.scan(out);
    }
}

/// View of the heap available to the collector
pub struct CollectorHeapView<'guard> {
    heap: &'guard mut Heap,
}

impl CollectorHeapView<'_> {
    /// Mark node if not already marked and return whether marked
    pub fn mark(&mut self, id: NodeId) -> bool {
        self.heap.mark_node(id)
    }

    pub fn is_marked(&self, id: NodeId) -> bool {
        self.heap.is_marked(id)
    }

    pub fn sweep(&mut self) -> usize {
        self.heap.sweep()
    }

    /// Nodes the heap itself keeps alive, plus what unmanaged nodes hold
    fn heap_roots(&self, out: &mut Vec<NodeId>) {
        let heap = &*self.heap;
        out.push(heap.self_symbol().node());
        heap.guarded().scan(out);
        for frame in heap.frames() {
            frame.scan(out);
        }
        for id in heap.node_ids().filter(|id| !heap.is_managed(*id)) {
            heap.get(id).scan(out);
        }
    }

    fn trace(&mut self, roots: &dyn GcScannable) -> usize {
        let mut grey = vec![];
        roots.scan(&mut grey);
        self.heap_roots(&mut grey);

        let mut queue = VecDeque::default();
        let mut marked = 0;
        loop {
            for id in grey.drain(..) {
                if self.mark(id) {
                    marked += 1;
                    queue.push_back(id);
                }
            }
            match queue.pop_front() {
                Some(id) => self.heap.get(id).scan(&mut grey),
                None => break,
            }
        }
        marked
    }
}

/// Mark everything reachable without sweeping
pub(crate) fn mark_from(heap: &mut Heap, roots: &dyn GcScannable) -> usize {
    CollectorHeapView { heap }.trace(roots)
}

/// Collect garbage: free every managed node not reachable from
/// `roots` or from the heap's own roots.
///
/// # Panics
///
/// With reachability checks enabled, panics if the checker finds a
/// reached cell that breaks the collector's invariants.
pub fn collect(roots: &dyn GcScannable, heap: &mut Heap) -> HeapStats {
    let mut heap_view = CollectorHeapView { heap };

    let marked = heap_view.trace(roots);
    log::debug!("gc: marked {marked} nodes");

    if heap_view.heap.options().dump_heap() {
        log::trace!("heap after mark:\n\n{:?}", &heap_view.heap);
    }

    if heap_view.heap.options().check_reachability() {
        if let Err(violation) = audit(heap_view.heap, roots) {
            panic!("reachability check failed: {violation}");
        }
    }

    let swept = heap_view.sweep();

    if heap_view.heap.options().dump_heap() {
        log::trace!("heap after sweep:\n\n{:?}", &heap_view.heap);
    }

    heap_view.heap.finish_collection();
    let stats = heap_view.heap.stats();
    log::debug!("gc: swept {swept} nodes, {} live", stats.live);
    stats
}
