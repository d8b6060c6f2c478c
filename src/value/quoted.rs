//! Quoting
//!
//! A quoted value keeps the unquoted cell in a singular array and
//! counts quote levels in its own payload, so requoting only bumps a
//! number. The quoted cell mirrors the binding of a bindable inner
//! cell so binding walks see it without dereferencing the node.

use crate::{
    error::{CoreError, CoreResult},
    memory::heap::Heap,
};

use super::{
    cell::{Binding, Cell, Payload},
    kind::Kind,
};

/// Add `depth` quote levels to a value
pub fn quotify(heap: &mut Heap, cell: &Cell, depth: u32) -> CoreResult<Cell> {
    if depth == 0 {
        return Ok(*cell);
    }
    if let Payload::Quoted { node, depth: have } = *cell.payload() {
        if cell.kind() == Kind::Quoted {
            return Ok(Cell::quoted(node, have + depth, cell.binding()));
        }
    }
    let binding = if cell.kind().is_bindable() {
        cell.binding()
    } else {
        Binding::Unbound
    };
    let node = heap.make_array(vec![cell.copied()])?;
    Ok(Cell::quoted(node, depth, binding))
}

/// Remove `depth` quote levels, failing if there are fewer
pub fn unquotify(heap: &Heap, cell: &Cell, depth: u32) -> CoreResult<Cell> {
    let have = cell.num_quotes();
    if have < depth {
        return Err(CoreError::NotQuotedEnough { have, want: depth });
    }
    if depth == 0 {
        return Ok(*cell);
    }
    match *cell.payload() {
        Payload::Quoted { node, .. } if have > depth => {
            Ok(Cell::quoted(node, have - depth, cell.binding()))
        }
        Payload::Quoted { node, .. } => heap
            .try_get(node)
            .and_then(|s| s.cells().first())
            .map(|inner| inner.copied())
            .ok_or(CoreError::BadTarget(Kind::Quoted)),
        _ => Err(CoreError::BadTarget(cell.kind())),
    }
}

/// Strip every quote level
pub fn dequote(heap: &Heap, cell: &Cell) -> CoreResult<Cell> {
    unquotify(heap, cell, cell.num_quotes())
}
