//! Actions and call frames
//!
//! An action is a paramlist: an array whose slot 0 is the action's
//! archetype and whose other slots describe its parameters. Calling it
//! pushes a frame context whose keys are the action's parameters. The
//! frame varlist holds only its archetype; the arguments live in the
//! heap's frame record until the frame is popped, after which the
//! varlist is marked inaccessible.

use crate::{
    error::{CoreError, CoreResult},
    memory::{
        heap::{FrameRecord, Heap},
        series::{Link, Series, SeriesFlags},
    },
    value::{
        cell::{Binding, Cell, CellFlags},
        kind::{Kind, Typeset},
    },
};

use super::{
    keylist::{Key, Keylist, KeylistRef},
    Context,
};

/// Make an action from `(parameter class, name, accepted kinds)`
/// triples
pub fn make_action(heap: &mut Heap, params: &[(Kind, &str, Typeset)]) -> CoreResult<Cell> {
    let mut cells = Vec::with_capacity(params.len() + 1);
    let mut keys = Keylist::with_capacity(params.len());
    cells.push(Cell::unreadable());
    for (class, name, typeset) in params {
        let spelling = heap.intern(name)?;
        cells.push(Cell::param(*class, spelling, *typeset));
        keys.push(Key::new(spelling, heap.canon(spelling), *typeset));
    }

    let mut paramlist = Series::array(cells);
    paramlist.set_flag(SeriesFlags::PARAMLIST);
    paramlist.set_link(Link::Keylist(KeylistRef::Unique(keys)));
    let node = heap.alloc(paramlist)?;

    let action = Cell::action(node, Binding::Unbound);
    heap.get_mut(node).cells_mut()[0] = action;
    Ok(action)
}

/// Begin a call to `action`.
///
/// Missing arguments are void; extra ones are dropped.
pub fn push_frame(
    heap: &mut Heap,
    action: &Cell,
    mut args: Vec<Cell>,
    binding: Binding,
) -> CoreResult<Context> {
    let paramlist = action
        .action_paramlist()
        .ok_or_else(|| CoreError::BadTarget(action.kind()))?;
    let keylist = match heap.get_mut(paramlist).link_mut() {
        Link::Keylist(k) => k.share(),
        _ => return Err(CoreError::BadTarget(Kind::Action)),
    };

    args.resize(keylist.len(), Cell::void());
    for arg in &mut args {
        arg.set_flag(CellFlags::STACK_LIFETIME);
    }

    let mut varlist = Series::array_with_capacity(1);
    varlist.set_flag(SeriesFlags::VARLIST | SeriesFlags::STACK);
    varlist.set_link(Link::Keylist(KeylistRef::Shared(keylist)));
    let node = heap.alloc(varlist)?;
    let mut archetype = Cell::context(Kind::Frame, node, Some(paramlist));
    archetype.set_binding(binding);
    heap.get_mut(node).push_cell(archetype);

    heap.frames_mut().push(FrameRecord {
        varlist: node,
        binding,
        phase: paramlist,
        args,
    });
    log::trace!("pushed frame {node} for action {paramlist}");
    Ok(Context::from_varlist(node))
}

/// End the innermost call; its frame context becomes inaccessible
pub fn pop_frame(heap: &mut Heap) -> CoreResult<Context> {
    let record = heap.frames_mut().pop().ok_or(CoreError::NoFrame)?;
    if let Some(series) = heap.try_get_mut(record.varlist) {
        series.set_flag(SeriesFlags::INACCESSIBLE);
    }
    log::trace!("popped frame {}", record.varlist);
    Ok(Context::from_varlist(record.varlist))
}
