//! Reachability checker
//!
//! An audit run by the collector after marking and before sweeping.
//! Every cell the collector reached is checked against the rules for
//! its kind: any node it references must carry the current mark and
//! be shaped the way the kind expects. A failure means reachability
//! bookkeeping is already broken, so the collector treats it as fatal.
//! The checks themselves only read the heap and report through
//! `Result` so that they can be exercised directly.

use crate::{
    context::Context,
    error::InvariantViolation,
    value::{
        cell::{Binding, Cell, CellFlags, Payload},
        kind::{Kind, NodeUse},
    },
};

use super::{
    collect::GcScannable,
    heap::{Heap, NodeId},
    series::{Link, Series, SeriesFlags},
};

type Check = Result<(), InvariantViolation>;

fn fail(kind: Kind, reason: impl Into<String>) -> Check {
    Err(InvariantViolation::new(kind, reason))
}

fn ensure(ok: bool, kind: Kind, reason: &str) -> Check {
    if ok {
        Ok(())
    } else {
        fail(kind, reason)
    }
}

/// The node must be live and marked; returns its series
fn marked(heap: &Heap, kind: Kind, node: NodeId) -> Result<&Series, InvariantViolation> {
    match heap.try_get(node) {
        Some(series) if heap.is_marked(node) => Ok(series),
        Some(_) => Err(InvariantViolation::new(
            kind,
            format!("node {node} not marked"),
        )),
        None => Err(InvariantViolation::new(kind, format!("node {node} is freed"))),
    }
}

fn first(kind: Kind, cell: &Cell) -> Result<NodeId, InvariantViolation> {
    cell.payload()
        .first_node()
        .ok_or_else(|| InvariantViolation::new(kind, "missing node reference"))
}

/// Flag bits, payload and binding agree before any per-kind rule
fn check_common(heap: &Heap, kind: Kind, cell: &Cell) -> Check {
    let payload = cell.payload();
    ensure(
        cell.has_flag(CellFlags::FIRST_IS_NODE) == payload.first_node().is_some(),
        kind,
        "first-is-node flag disagrees with payload",
    )?;
    ensure(
        cell.has_flag(CellFlags::SECOND_IS_NODE) == payload.second_node().is_some(),
        kind,
        "second-is-node flag disagrees with payload",
    )?;
    match kind.node_use() {
        NodeUse::Never => ensure(
            payload.first_node().is_none(),
            kind,
            "inline kind carries a node",
        )?,
        NodeUse::Always => ensure(
            payload.first_node().is_some(),
            kind,
            "node kind carries no node",
        )?,
        NodeUse::Optional => {}
    }

    match cell.binding() {
        Binding::Unbound => Ok(()),
        Binding::Context(node) => {
            ensure(kind.is_bindable(), kind, "binding on an unbindable kind")?;
            marked(heap, kind, node).map(|_| ())
        }
    }
}

fn check_array<'h>(
    heap: &'h Heap,
    kind: Kind,
    cell: &Cell,
) -> Result<&'h Series, InvariantViolation> {
    let series = marked(heap, kind, first(kind, cell)?)?;
    ensure(series.is_array(), kind, "backing node is not an array")?;
    Ok(series)
}

fn check_bytes<'h>(
    heap: &'h Heap,
    kind: Kind,
    cell: &Cell,
) -> Result<&'h Series, InvariantViolation> {
    let series = marked(heap, kind, first(kind, cell)?)?;
    ensure(!series.is_array(), kind, "backing node is not a byte series")?;
    Ok(series)
}

fn check_text(heap: &Heap, kind: Kind, cell: &Cell) -> Check {
    let series = check_bytes(heap, kind, cell)?;
    ensure(series.is_utf8(), kind, "string node not flagged UTF-8")?;
    if let Some(bm) = series.bookmark() {
        ensure(
            bm.offset <= series.len() && bm.index <= series.codepoint_len(),
            kind,
            "bookmark past end of string",
        )?;
    }
    Ok(())
}

fn check_spelling(heap: &Heap, kind: Kind, node: NodeId) -> Check {
    let series = marked(heap, kind, node)?;
    ensure(
        series.has_flag(SeriesFlags::SYMBOL),
        kind,
        "spelling node is not a symbol",
    )
}

fn check_word(heap: &Heap, kind: Kind, cell: &Cell) -> Check {
    check_spelling(heap, kind, first(kind, cell)?)?;
    let index = cell.word_index().unwrap_or(0);
    match cell.binding() {
        Binding::Unbound => ensure(index == -1, kind, "unbound word has a slot index"),
        Binding::Context(node) => {
            ensure(index > 0, kind, "bound word has no slot index")?;
            let ctx = Context::from_varlist(node);
            let series = marked(heap, kind, node)?;
            if series.has_flag(SeriesFlags::VARLIST) {
                ensure(
                    index as usize <= ctx.len(heap),
                    kind,
                    "bound word index past end of context",
                )?;
            }
            Ok(())
        }
    }
}

fn check_context_cell(heap: &Heap, kind: Kind, cell: &Cell) -> Check {
    let varlist = first(kind, cell)?;
    let series = marked(heap, kind, varlist)?;
    ensure(
        series.has_flag(SeriesFlags::VARLIST),
        kind,
        "context node is not a varlist",
    )?;

    let is_frame = kind == Kind::Frame;
    ensure(
        cell.phase().is_some() == is_frame,
        kind,
        "phase present on a non-frame or missing on a frame",
    )?;
    if let Some(phase) = cell.phase() {
        marked(heap, kind, phase)?;
    }
    if !is_frame {
        ensure(
            cell.binding() == Binding::Unbound,
            kind,
            "non-frame context carries a binding",
        )?;
    }

    if series.has_flag(SeriesFlags::INACCESSIBLE) {
        return Ok(());
    }
    let archetype = series.cells().first().copied().unwrap_or_else(Cell::unreadable);
    ensure(
        archetype.kind_unchecked() == kind && archetype.context_varlist() == Some(varlist),
        kind,
        "archetype disagrees with context cell",
    )?;

    if is_frame {
        if let Some(record) = heap.frame_for(varlist) {
            ensure(
                record.binding == cell.binding(),
                kind,
                "frame binding differs from the running frame",
            )?;
        }
    }
    Ok(())
}

/// Check one cell against the collector's invariants for its kind
pub fn assert_reachable_and_consistent(heap: &Heap, cell: &Cell) -> Check {
    let kind = cell.kind_unchecked();
    if kind == Kind::Unreadable {
        return Ok(());
    }
    check_common(heap, kind, cell)?;

    match kind {
        Kind::End => fail(kind, "end marker found in a cell"),
        Kind::Unreadable => Ok(()),

        Kind::Nulled
        | Kind::Void
        | Kind::Blank
        | Kind::Logic
        | Kind::Integer
        | Kind::Decimal
        | Kind::Percent
        | Kind::Money
        | Kind::Char
        | Kind::Tuple
        | Kind::Time
        | Kind::Date
        | Kind::Typeset
        | Kind::GobXyf
        | Kind::VectorSign => Ok(()),

        Kind::Datatype | Kind::Event => match cell.payload().first_node() {
            Some(node) => marked(heap, kind, node).map(|_| ()),
            None => Ok(()),
        },

        Kind::Handle => match cell.payload().first_node() {
            Some(node) => {
                let series = marked(heap, kind, node)?;
                let canonical = series.cells();
                ensure(
                    canonical.len() == 1
                        && canonical[0].kind_unchecked() == Kind::Handle
                        && canonical[0].payload().first_node() == Some(node),
                    kind,
                    "handle node does not hold a handle pointing back",
                )
            }
            None => Ok(()),
        },

        Kind::Pair => {
            let series = check_array(heap, kind, cell)?;
            ensure(series.len() == 2, kind, "pair node does not hold two cells")
        }
        Kind::Bitset => check_bytes(heap, kind, cell).map(|_| ()),
        Kind::Map => {
            let series = check_array(heap, kind, cell)?;
            ensure(series.len() % 2 == 0, kind, "map node holds an odd cell count")
        }
        Kind::Gob | Kind::Struct => check_array(heap, kind, cell).map(|_| ()),
        Kind::Image => {
            let cells = check_array(heap, kind, cell)?.cells();
            ensure(
                cells.len() == 1 && cells[0].kind_unchecked() == Kind::Binary,
                kind,
                "image node does not hold its pixel binary",
            )
        }
        Kind::Vector => {
            let cells = check_array(heap, kind, cell)?.cells();
            ensure(
                cells.len() == 2
                    && cells[0].kind_unchecked() == Kind::Binary
                    && matches!(cells[1].payload(), Payload::VectorSign { .. }),
                kind,
                "vector node is not [binary sign]",
            )
        }

        Kind::Binary => check_bytes(heap, kind, cell).map(|_| ()),
        Kind::Text | Kind::File | Kind::Email | Kind::Url | Kind::Tag => {
            check_text(heap, kind, cell)
        }

        Kind::Issue | Kind::Word | Kind::SetWord | Kind::GetWord => check_word(heap, kind, cell),

        Kind::Object | Kind::Module | Kind::Error | Kind::Frame | Kind::Port => {
            check_context_cell(heap, kind, cell)
        }

        Kind::Varargs => {
            ensure(
                matches!(cell.binding(), Binding::Context(_)),
                kind,
                "varargs not bound to a frame",
            )?;
            match cell.phase() {
                Some(phase) => marked(heap, kind, phase).map(|_| ()),
                None => Ok(()),
            }
        }

        Kind::Block
        | Kind::SetBlock
        | Kind::GetBlock
        | Kind::Group
        | Kind::SetGroup
        | Kind::GetGroup => check_array(heap, kind, cell).map(|_| ()),

        Kind::Path | Kind::SetPath | Kind::GetPath => {
            let cells = check_array(heap, kind, cell)?.cells();
            ensure(cells.len() >= 2, kind, "path has fewer than two elements")?;
            ensure(
                cells.iter().all(|c| !c.kind_unchecked().is_any_path()),
                kind,
                "path directly contains a path",
            )
        }

        Kind::Action => {
            let paramlist = first(kind, cell)?;
            let series = marked(heap, kind, paramlist)?;
            ensure(
                series.has_flag(SeriesFlags::PARAMLIST),
                kind,
                "action node is not a paramlist",
            )?;
            let archetype = series.cells().first().copied().unwrap_or_else(Cell::unreadable);
            ensure(
                archetype.action_paramlist() == Some(paramlist),
                kind,
                "paramlist archetype disagrees with action",
            )
        }

        Kind::Quoted => {
            let cells = check_array(heap, kind, cell)?.cells();
            ensure(
                cells.len() == 1 && cells[0].kind_unchecked() != Kind::Quoted,
                kind,
                "quoted node does not hold one unquoted cell",
            )?;
            ensure(cell.num_quotes() > 0, kind, "quoted cell with depth zero")
        }

        Kind::ParamNormal
        | Kind::ParamHardQuote
        | Kind::ParamSoftQuote
        | Kind::ParamRefinement
        | Kind::ParamLocal
        | Kind::ParamReturn => check_spelling(heap, kind, first(kind, cell)?),
    }
}

/// Structural audit of a context: varlist, archetype and keylist agree
pub fn assert_context(heap: &Heap, ctx: Context) -> Check {
    let kind = ctx.archetype(heap).kind_unchecked();
    let series = heap
        .try_get(ctx.varlist())
        .ok_or_else(|| InvariantViolation::new(kind, "context varlist is freed"))?;
    ensure(
        series.has_flag(SeriesFlags::VARLIST),
        kind,
        "context node is not a varlist",
    )?;
    if series.has_flag(SeriesFlags::INACCESSIBLE) {
        return Ok(());
    }

    ensure(
        kind.is_any_context() && ctx.archetype(heap).context_varlist() == Some(ctx.varlist()),
        kind,
        "varlist archetype does not name its own context",
    )?;
    let keylist = match series.link() {
        Link::Keylist(k) => k.get(),
        _ => return fail(kind, "varlist has no keylist"),
    };
    if series.has_flag(SeriesFlags::STACK) {
        ensure(series.len() == 1, kind, "stack frame varlist holds variables")?;
    } else {
        ensure(
            series.len() == keylist.len() + 1,
            kind,
            "varlist and keylist lengths differ",
        )?;
    }
    for key in keylist.iter() {
        check_spelling(heap, kind, key.spelling().node())?;
        check_spelling(heap, kind, key.canon().node())?;
    }
    Ok(())
}

/// Audit everything the mark phase reached
pub(crate) fn audit(heap: &Heap, roots: &dyn GcScannable) -> Check {
    roots.audit(heap)?;
    for cell in heap.guarded() {
        assert_reachable_and_consistent(heap, cell)?;
    }
    for record in heap.frames() {
        for cell in &record.args {
            assert_reachable_and_consistent(heap, cell)?;
        }
    }

    for id in heap.node_ids().filter(|id| heap.is_marked(*id)) {
        let series = heap.get(id);
        if !series.is_array() {
            continue;
        }
        for cell in series.cells() {
            assert_reachable_and_consistent(heap, cell)?;
        }
        if series.has_flag(SeriesFlags::VARLIST) {
            assert_context(heap, Context::from_varlist(id))?;
        }
    }
    Ok(())
}
