//! Edits on byte series: text and binary
//!
//! A text series may also be viewed through a binary cell, in which
//! case the cell's index counts bytes instead of codepoints. Every
//! edit to a series flagged UTF-8 must leave it valid UTF-8, whichever
//! view it goes through, so material is encoded and checked before
//! the series is touched.

use crate::{
    error::{CoreError, CoreResult},
    memory::{
        heap::{Heap, NodeId},
        series::{is_continuation, Bookmark},
    },
    value::{
        cell::Cell,
        kind::Kind,
        mold::{form_value, join_binary},
    },
};

use super::{ModifyFlags, Verb};

/// Number of units `bytes` occupies in the target's view
fn units(bytes: &[u8], codepoints: bool) -> usize {
    if codepoints {
        bytes.iter().filter(|b| !is_continuation(**b)).count()
    } else {
        bytes.len()
    }
}

/// Byte length of the first `count` units of `bytes`
fn prefix_size(bytes: &[u8], count: usize, codepoints: bool) -> usize {
    if !codepoints {
        return count.min(bytes.len());
    }
    let mut seen = 0;
    for (offset, byte) in bytes.iter().enumerate() {
        if !is_continuation(*byte) {
            if seen == count {
                return offset;
            }
            seen += 1;
        }
    }
    bytes.len()
}

/// Encode `source` as the bytes an edit of the target would insert
fn material(
    heap: &Heap,
    source: &Cell,
    target_node: NodeId,
    binary_target: bool,
    text_series: bool,
) -> CoreResult<Vec<u8>> {
    let kind = source.kind();
    let formed = || form_value(heap, source).into_bytes();

    match kind {
        Kind::Char => {
            let c = source.as_char().unwrap_or_default();
            let mut buf = [0u8; 4];
            Ok(c.encode_utf8(&mut buf).as_bytes().to_vec())
        }
        Kind::Integer if binary_target => {
            let i = source.as_integer().unwrap_or_default();
            let byte = u8::try_from(i).map_err(|_| CoreError::OutOfRange(i))?;
            Ok(vec![byte])
        }
        Kind::Binary => {
            let Some(series) = source.series_node().and_then(|n| heap.try_get(n)) else {
                return Ok(vec![]);
            };
            let bytes = &series.bytes()[source.index().min(series.len())..];
            if text_series {
                if series.is_utf8() {
                    if matches!(bytes.first(), Some(b) if is_continuation(*b)) {
                        return Err(CoreError::InvalidCodepointIndex(source.index()));
                    }
                } else {
                    std::str::from_utf8(bytes).map_err(|_| CoreError::Encoding)?;
                }
            }
            Ok(bytes.to_vec())
        }
        Kind::Block => {
            let cells = source
                .series_node()
                .and_then(|n| heap.try_get(n))
                .map(|s| &s.cells()[source.index().min(s.len())..])
                .unwrap_or_default();
            if binary_target {
                join_binary(heap, cells)
            } else {
                Ok(cells
                    .iter()
                    .map(|c| form_value(heap, c))
                    .collect::<String>()
                    .into_bytes())
            }
        }
        k if k.is_any_string() && k != Kind::Tag => {
            match source.series_node() {
                Some(node) if node != target_node => {
                    let text = heap.try_get(node).and_then(|s| s.as_str()).unwrap_or("");
                    let offset = text
                        .char_indices()
                        .nth(source.index())
                        .map_or(text.len(), |(o, _)| o);
                    Ok(text[offset..].as_bytes().to_vec())
                }
                // reading from the series being edited goes through a copy
                _ => Ok(formed()),
            }
        }
        _ => Ok(formed()),
    }
}

/// Insert, append or change content of the string or binary `target`.
///
/// Non-string sources are formed first, except integers, which go into
/// binaries as a single byte, and blocks, which are joined. `part`
/// counts units of the target's view: codepoints for strings and bytes
/// for binaries.
pub fn modify_string_or_binary(
    heap: &mut Heap,
    target: &Cell,
    verb: Verb,
    source: &Cell,
    flags: ModifyFlags,
    part: usize,
    dups: i64,
) -> CoreResult<usize> {
    let kind = target.kind();
    let node = target.series_node().ok_or(CoreError::BadTarget(kind))?;
    let threshold = heap.options().bookmark_threshold();

    let series = heap.get_mut(node);
    series.ensure_mutable()?;
    let binary_target = kind == Kind::Binary;
    let text_series = series.is_utf8();
    if !binary_target && !text_series {
        return Err(CoreError::BadTarget(kind));
    }
    // string cells count codepoints, binary cells count bytes
    let codepoints = !binary_target;

    let mut index = target.index();
    let (tail, mut offset) = if binary_target {
        if verb != Verb::Append
            && text_series
            && matches!(series.bytes().get(index), Some(b) if *b >= 0x80)
        {
            return Err(CoreError::InvalidCodepointIndex(index));
        }
        (series.len(), index.min(series.len()))
    } else {
        (series.codepoint_len(), series.offset_for_index(index, threshold))
    };

    let delete = source.is_nulled();
    if delete {
        match verb {
            Verb::Append => return Ok(0),
            Verb::Insert => return Ok(index),
            Verb::Change => {}
        }
    }

    let limit = (verb != Verb::Change && flags.contains(ModifyFlags::PART)).then_some(part);
    if limit == Some(0) || dups <= 0 {
        return Ok(if verb == Verb::Append { 0 } else { index });
    }
    let count = dups;
    let dups = dups as usize;

    if verb == Verb::Append || index > tail {
        offset = heap.get(node).len();
        index = tail;
    }

    let mut chunk = if delete {
        vec![]
    } else {
        material(heap, source, node, binary_target, text_series)?
    };
    if let Some(limit) = limit {
        let size = prefix_size(&chunk, limit, codepoints);
        chunk.truncate(size);
    }
    if flags.contains(ModifyFlags::LINE) {
        chunk.push(b'\n');
    }
    if text_series && std::str::from_utf8(&chunk).is_err() {
        return Err(CoreError::Encoding);
    }

    let repeat = |n: usize| n.checked_mul(dups).ok_or(CoreError::SizeOverflow(count));
    let len_total = repeat(units(&chunk, codepoints))?;
    let size_total = repeat(chunk.len())?;
    let cp_total = repeat(units(&chunk, text_series))?;

    let series = heap.get_mut(node);
    let cp_index = series.index_for_offset(offset);

    match verb {
        Verb::Insert | Verb::Append => {
            series.expand_at(offset, size_total);
            if let Some(bm) = series.bookmark().filter(|bm| bm.index >= cp_index) {
                series.set_bookmark(Some(Bookmark {
                    index: bm.index + cp_total,
                    offset: bm.offset + size_total,
                }));
            }
        }
        Verb::Change => {
            let part = if flags.contains(ModifyFlags::PART) {
                part
            } else {
                len_total
            };
            let rest = &series.bytes()[offset..];
            let part_size = prefix_size(rest, part, codepoints);

            // a binary view must not cut a codepoint at the far end either
            if binary_target
                && text_series
                && matches!(rest.get(part_size), Some(b) if is_continuation(*b))
            {
                return Err(CoreError::InvalidCodepointIndex(index + part_size));
            }

            if size_total > part_size {
                series.expand_at(offset, size_total - part_size);
            } else if part_size > size_total {
                series.remove_units(offset, part_size - size_total);
            }
            if series.bookmark().map_or(false, |bm| bm.index > cp_index) {
                series.set_bookmark(Some(Bookmark {
                    index: cp_index,
                    offset,
                }));
            }
        }
    }

    series.fill_bytes(offset, size_total, &chunk);

    if let Some(bm) = series.bookmark() {
        let len = series.codepoint_len();
        if bm.index > len || len < threshold {
            log::trace!("dropping bookmark at {} after edit", bm.index);
            series.set_bookmark(None);
        }
    }

    Ok(if verb == Verb::Append {
        0
    } else {
        index + len_total
    })
}
