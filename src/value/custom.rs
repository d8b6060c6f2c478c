//! Extension kinds backed by a single node
//!
//! Each constructor allocates the backing node in the shape the
//! reachability checker expects for its kind.

use crate::{
    error::CoreResult,
    memory::{heap::Heap, series::Series},
};

use super::{cell::Cell, kind::Kind};

/// Pair of two numbers
pub fn make_pair(heap: &mut Heap, x: Cell, y: Cell) -> CoreResult<Cell> {
    let node = heap.make_array(vec![x.copied(), y.copied()])?;
    Ok(Cell::node(Kind::Pair, node))
}

pub fn make_bitset(heap: &mut Heap, bits: &[u8]) -> CoreResult<Cell> {
    let node = heap.make_binary(bits)?;
    Ok(Cell::node(Kind::Bitset, node))
}

/// Map from alternating key and value cells
pub fn make_map(heap: &mut Heap, pairs: Vec<Cell>) -> CoreResult<Cell> {
    let node = heap.make_array(pairs)?;
    Ok(Cell::node(Kind::Map, node))
}

/// Handle whose identity is shared by every copy of the cell.
///
/// The singular node holds the canonical handle cell, which points
/// back at the node itself.
pub fn make_managed_handle(heap: &mut Heap, data: usize) -> CoreResult<Cell> {
    let node = heap.alloc(Series::array_with_capacity(1))?;
    let cell = Cell::handle_managed(data, node);
    heap.get_mut(node).push_cell(cell);
    Ok(cell)
}

/// Graphic object: offset and size
pub fn make_gob(heap: &mut Heap, offset: (f32, f32), size: (f32, f32)) -> CoreResult<Cell> {
    let node = heap.make_array(vec![
        Cell::gob_xyf(offset.0, offset.1),
        Cell::gob_xyf(size.0, size.1),
    ])?;
    Ok(Cell::node(Kind::Gob, node))
}

/// Event, optionally carrying extra fields in a node
pub fn make_event(heap: &mut Heap, fields: Option<Vec<Cell>>) -> CoreResult<Cell> {
    let node = match fields {
        Some(cells) => Some(heap.make_array(cells)?),
        None => None,
    };
    Ok(Cell::event(node))
}

pub fn make_struct(heap: &mut Heap, fields: Vec<Cell>) -> CoreResult<Cell> {
    let node = heap.make_array(fields)?;
    Ok(Cell::node(Kind::Struct, node))
}

/// Image: a singular array holding the pixel binary
pub fn make_image(heap: &mut Heap, pixels: &[u8]) -> CoreResult<Cell> {
    let bin = heap.make_binary(pixels)?;
    let node = heap.make_array(vec![Cell::binary(bin)])?;
    Ok(Cell::node(Kind::Image, node))
}

/// Vector: element bytes paired with their element description
pub fn make_vector(
    heap: &mut Heap,
    bytes: &[u8],
    signed: bool,
    integral: bool,
    wide: u8,
) -> CoreResult<Cell> {
    let bin = heap.make_binary(bytes)?;
    let node = heap.make_array(vec![
        Cell::binary(bin),
        Cell::vector_sign(signed, integral, wide),
    ])?;
    Ok(Cell::node(Kind::Vector, node))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::value::cell::{CellFlags, Payload};

    #[test]
    pub fn test_handle_points_back() {
        let mut heap = Heap::new();
        let h = make_managed_handle(&mut heap, 42).unwrap();
        let node = h.payload().first_node().unwrap();
        assert_eq!(heap.get(node).cells(), &[h]);
        assert!(h.has_flag(CellFlags::FIRST_IS_NODE));
    }

    #[test]
    pub fn test_vector_shape() {
        let mut heap = Heap::new();
        let v = make_vector(&mut heap, &[1, 0, 2, 0], false, true, 2).unwrap();
        let node = v.payload().first_node().unwrap();
        let cells = heap.get(node).cells();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].kind(), Kind::Binary);
        assert!(matches!(
            cells[1].payload(),
            Payload::VectorSign { wide: 2, .. }
        ));
    }

    #[test]
    pub fn test_event_without_node() {
        let mut heap = Heap::new();
        let e = make_event(&mut heap, None).unwrap();
        assert!(!e.has_flag(CellFlags::FIRST_IS_NODE));
    }
}
