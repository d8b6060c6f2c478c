//! Edits on arrays of cells

use crate::{
    error::{CoreError, CoreResult},
    memory::{
        heap::{Heap, NodeId},
        series::SeriesFlags,
    },
    value::cell::{Cell, CellFlags},
};

use super::{ModifyFlags, Verb};

/// Insert, append or change cells of `array` at `index`.
///
/// A null source does nothing, except for change, where it deletes
/// `part` cells. Without `PART`, change overwrites as many cells as
/// it writes. Line-break flags follow the source's layout.
#[allow(clippy::too_many_arguments)]
pub fn modify_array(
    heap: &mut Heap,
    array: NodeId,
    index: usize,
    verb: Verb,
    source: &Cell,
    mut flags: ModifyFlags,
    part: usize,
    dups: i64,
) -> CoreResult<usize> {
    heap.get(array).ensure_mutable()?;

    let delete = source.is_nulled() && verb == Verb::Change;
    if delete {
        flags |= ModifyFlags::SPLICE;
    } else if source.is_nulled() || dups <= 0 {
        return Ok(if verb == Verb::Append { 0 } else { index });
    }
    let count = dups.max(1);
    let dups = count as usize;

    let tail = heap.get(array).len();
    let mut at = index;
    if verb == Verb::Append || at > tail {
        at = tail;
    }

    let mut tail_newline = flags.contains(ModifyFlags::LINE);

    // snapshot the source cells; an array spliced into itself is read
    // before any cell moves
    let cells: Vec<Cell> = if delete {
        vec![]
    } else if flags.contains(ModifyFlags::SPLICE) {
        let kind = source.kind();
        let node = source
            .series_node()
            .filter(|_| kind.is_any_array())
            .ok_or(CoreError::BadTarget(kind))?;
        let src = heap.get(node);
        let from = source.index().min(src.len());
        let avail = src.len() - from;
        let ilen = if verb != Verb::Change && flags.contains(ModifyFlags::PART) {
            part.min(avail)
        } else {
            avail
        };
        if !tail_newline {
            tail_newline = match src.cells().get(from + ilen) {
                None => src.has_flag(SeriesFlags::NEWLINE_AT_TAIL),
                Some(_) if ilen == 0 => false,
                Some(next) => next.has_flag(CellFlags::NEWLINE_BEFORE),
            };
        }
        src.cells()[from..from + ilen].to_vec()
    } else {
        vec![*source]
    };

    let ilen = cells.len();
    let size = ilen
        .checked_mul(dups)
        .ok_or(CoreError::SizeOverflow(count))?;
    let series = heap.get_mut(array);
    let head_newline = at == series.len() && series.has_flag(SeriesFlags::NEWLINE_AT_TAIL);

    match verb {
        Verb::Insert | Verb::Append => series.expand_at(at, size),
        Verb::Change => {
            // a part running past the tail covers only what is there
            let part = if flags.contains(ModifyFlags::PART) || delete {
                part.min(tail - at)
            } else {
                size
            };
            if size > part {
                series.expand_at(at, size - part);
            } else if size < part && (flags.contains(ModifyFlags::PART) || delete) {
                series.remove_units(at, part - size);
            } else if size + at > tail {
                series.extend_tail(size - (tail - at));
            }
        }
    }

    let result = if verb == Verb::Append { 0 } else { at + size };

    let mut pos = at;
    for dup in 0..dups {
        for (i, cell) in cells.iter().enumerate() {
            let mut cell = cell.copied();
            if dup == 0 && i == 0 && head_newline {
                cell.set_flag(CellFlags::NEWLINE_BEFORE);
                series.clear_flag(SeriesFlags::NEWLINE_AT_TAIL);
            } else if dup > 0 && i == 0 && tail_newline {
                cell.set_flag(CellFlags::NEWLINE_BEFORE);
            }
            series.cells_mut()[pos] = cell;
            pos += 1;
        }
    }

    if tail_newline {
        if pos == series.len() {
            series.set_flag(SeriesFlags::NEWLINE_AT_TAIL);
        } else {
            series.cells_mut()[pos].set_flag(CellFlags::NEWLINE_BEFORE);
        }
    }
    if flags.contains(ModifyFlags::LINE) {
        if let Some(head) = series.cells_mut().first_mut() {
            head.set_flag(CellFlags::NEWLINE_BEFORE);
        }
    }

    Ok(result)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::value::kind::Kind;

    fn words(heap: &mut Heap, names: &[&str]) -> Vec<Cell> {
        names
            .iter()
            .map(|n| Cell::word(Kind::Word, heap.intern(n).unwrap()))
            .collect()
    }

    fn spellings(heap: &Heap, node: NodeId) -> Vec<String> {
        heap.get(node)
            .cells()
            .iter()
            .map(|c| match c.word_spelling() {
                Some(s) => heap.spelling(s).to_string(),
                None => format!("{:?}", c.as_integer()),
            })
            .collect()
    }

    #[test]
    pub fn test_splice_insert() {
        let mut heap = Heap::new();
        let abc = words(&mut heap, &["a", "b", "c"]);
        let xy = words(&mut heap, &["x", "y"]);
        let target = heap.make_array(abc).unwrap();
        let source = heap.make_array(xy).unwrap();

        let at = modify_array(
            &mut heap,
            target,
            1,
            Verb::Insert,
            &Cell::block(source),
            ModifyFlags::SPLICE,
            0,
            1,
        )
        .unwrap();
        assert_eq!(at, 3);
        assert_eq!(spellings(&heap, target), ["a", "x", "y", "b", "c"]);
    }

    #[test]
    pub fn test_insert_block_as_one_value() {
        let mut heap = Heap::new();
        let target = heap.make_array(vec![]).unwrap();
        let source = heap.make_array(vec![Cell::integer(1), Cell::integer(2)]).unwrap();
        let at = modify_array(
            &mut heap,
            target,
            0,
            Verb::Insert,
            &Cell::block(source),
            ModifyFlags::empty(),
            0,
            2,
        )
        .unwrap();
        assert_eq!(at, 2);
        assert_eq!(heap.get(target).len(), 2);
        assert_eq!(heap.get(target).cells()[0].kind(), Kind::Block);
    }

    #[test]
    pub fn test_append_ignores_index_and_returns_zero() {
        let mut heap = Heap::new();
        let target = heap.make_array(vec![Cell::integer(1)]).unwrap();
        let at = modify_array(
            &mut heap,
            target,
            0,
            Verb::Append,
            &Cell::integer(2),
            ModifyFlags::empty(),
            0,
            3,
        )
        .unwrap();
        assert_eq!(at, 0);
        let cells = heap.get(target).cells();
        assert_eq!(cells.len(), 4);
        assert_eq!(cells[3], Cell::integer(2));
    }

    #[test]
    pub fn test_null_and_zero_dups_are_no_ops() {
        let mut heap = Heap::new();
        let target = heap.make_array(vec![Cell::integer(1)]).unwrap();
        let none = ModifyFlags::empty();
        assert_eq!(
            modify_array(&mut heap, target, 1, Verb::Insert, &Cell::nulled(), none, 0, 1),
            Ok(1)
        );
        assert_eq!(
            modify_array(&mut heap, target, 1, Verb::Append, &Cell::blank(), none, 0, 0),
            Ok(0)
        );
        assert_eq!(heap.get(target).len(), 1);
    }

    #[test]
    pub fn test_change_with_null_deletes() {
        let mut heap = Heap::new();
        let cells = (1..=5).map(Cell::integer).collect();
        let target = heap.make_array(cells).unwrap();
        let at = modify_array(
            &mut heap,
            target,
            1,
            Verb::Change,
            &Cell::nulled(),
            ModifyFlags::PART,
            2,
            1,
        )
        .unwrap();
        assert_eq!(at, 1);
        assert_eq!(
            spellings(&heap, target),
            ["Some(1)", "Some(4)", "Some(5)"]
        );
    }

    #[test]
    pub fn test_change_overwrites_and_extends() {
        let mut heap = Heap::new();
        let target = heap
            .make_array(vec![Cell::integer(1), Cell::integer(2)])
            .unwrap();
        let source = heap
            .make_array(vec![Cell::integer(7), Cell::integer(8), Cell::integer(9)])
            .unwrap();
        let at = modify_array(
            &mut heap,
            target,
            1,
            Verb::Change,
            &Cell::block(source),
            ModifyFlags::SPLICE,
            0,
            1,
        )
        .unwrap();
        assert_eq!(at, 4);
        assert_eq!(
            spellings(&heap, target),
            ["Some(1)", "Some(7)", "Some(8)", "Some(9)"]
        );
    }

    #[test]
    pub fn test_change_part_shrinks() {
        let mut heap = Heap::new();
        let cells = (1..=4).map(Cell::integer).collect();
        let target = heap.make_array(cells).unwrap();
        modify_array(
            &mut heap,
            target,
            0,
            Verb::Change,
            &Cell::integer(0),
            ModifyFlags::PART,
            3,
            1,
        )
        .unwrap();
        assert_eq!(spellings(&heap, target), ["Some(0)", "Some(4)"]);
    }

    #[test]
    pub fn test_change_part_past_tail() {
        let mut heap = Heap::new();
        let cells = (1..=3).map(Cell::integer).collect();
        let target = heap.make_array(cells).unwrap();
        let at = modify_array(
            &mut heap,
            target,
            1,
            Verb::Change,
            &Cell::integer(0),
            ModifyFlags::PART,
            10,
            1,
        )
        .unwrap();
        assert_eq!(at, 2);
        assert_eq!(spellings(&heap, target), ["Some(1)", "Some(0)"]);
    }

    #[test]
    pub fn test_huge_dups_fail_cleanly() {
        let mut heap = Heap::new();
        let target = heap.make_array(vec![Cell::integer(1)]).unwrap();
        let source = heap
            .make_array(vec![Cell::integer(7), Cell::integer(8)])
            .unwrap();
        assert_eq!(
            modify_array(
                &mut heap,
                target,
                0,
                Verb::Insert,
                &Cell::block(source),
                ModifyFlags::SPLICE,
                0,
                i64::MAX
            ),
            Err(CoreError::SizeOverflow(i64::MAX))
        );
        assert_eq!(heap.get(target).len(), 1);
    }

    #[test]
    pub fn test_splice_into_itself() {
        let mut heap = Heap::new();
        let target = heap
            .make_array(vec![Cell::integer(1), Cell::integer(2)])
            .unwrap();
        modify_array(
            &mut heap,
            target,
            1,
            Verb::Insert,
            &Cell::block(target),
            ModifyFlags::SPLICE,
            0,
            1,
        )
        .unwrap();
        assert_eq!(
            spellings(&heap, target),
            ["Some(1)", "Some(1)", "Some(2)", "Some(2)"]
        );
    }

    #[test]
    pub fn test_tail_newline_moves_to_first_inserted() {
        let mut heap = Heap::new();
        let target = heap.make_array(vec![Cell::integer(1)]).unwrap();
        heap.get_mut(target).set_flag(SeriesFlags::NEWLINE_AT_TAIL);
        modify_array(
            &mut heap,
            target,
            0,
            Verb::Append,
            &Cell::integer(2),
            ModifyFlags::empty(),
            0,
            1,
        )
        .unwrap();
        let series = heap.get(target);
        assert!(series.cells()[1].has_flag(CellFlags::NEWLINE_BEFORE));
        assert!(!series.has_flag(SeriesFlags::NEWLINE_AT_TAIL));
    }

    #[test]
    pub fn test_line_flag() {
        let mut heap = Heap::new();
        let target = heap.make_array(vec![]).unwrap();
        let source = heap
            .make_array(vec![Cell::integer(1), Cell::integer(2)])
            .unwrap();
        modify_array(
            &mut heap,
            target,
            0,
            Verb::Append,
            &Cell::block(source),
            ModifyFlags::SPLICE | ModifyFlags::LINE,
            0,
            2,
        )
        .unwrap();
        let series = heap.get(target);
        let cells = series.cells();
        assert!(cells[0].has_flag(CellFlags::NEWLINE_BEFORE));
        assert!(!cells[1].has_flag(CellFlags::NEWLINE_BEFORE));
        assert!(cells[2].has_flag(CellFlags::NEWLINE_BEFORE));
        assert!(series.has_flag(SeriesFlags::NEWLINE_AT_TAIL));
    }

    #[test]
    pub fn test_locked_target() {
        let mut heap = Heap::new();
        let target = heap.make_array(vec![]).unwrap();
        heap.get_mut(target).lock();
        assert_eq!(
            modify_array(
                &mut heap,
                target,
                0,
                Verb::Append,
                &Cell::blank(),
                ModifyFlags::empty(),
                0,
                1
            ),
            Err(CoreError::LockedTarget)
        );
    }
}
