//! Allocating, growing, copying and searching contexts

use crate::{
    error::{CoreError, CoreResult},
    memory::{
        heap::{Heap, NodeId},
        series::{Link, Series, SeriesFlags},
        symbol::Symbol,
    },
    value::{
        cell::{Cell, CellFlags},
        kind::{Kind, Typeset},
    },
};

use super::{
    keylist::{Key, KeyFlags, Keylist, KeylistRef},
    Context,
};

/// What `context_to_array` produces for each visible key
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ToArrayMode {
    /// Words bound to the context
    Words,
    /// Variable values
    Values,
    /// Bound set-words each followed by its value
    Pairs,
}

fn ensure_unlocked(heap: &Heap, ctx: Context) -> CoreResult<()> {
    if ctx.is_locked(heap) {
        Err(CoreError::LockedContext)
    } else {
        Ok(())
    }
}

/// Create an empty context with room for `capacity` keys
pub fn alloc_context(heap: &mut Heap, kind: Kind, capacity: usize) -> CoreResult<Context> {
    let mut varlist = Series::array_with_capacity(capacity + 1);
    varlist.set_flag(SeriesFlags::VARLIST);
    varlist.set_link(Link::Keylist(KeylistRef::Unique(Keylist::with_capacity(
        capacity,
    ))));
    let node = heap.alloc(varlist)?;
    heap.get_mut(node).push_cell(Cell::context(kind, node, None));
    Ok(Context::from_varlist(node))
}

/// Give the context a keylist no other context holds.
///
/// Returns whether a copy was made, in which case any keylist
/// fetched from the context earlier is stale.
pub fn ensure_keylist_unique(heap: &mut Heap, ctx: Context) -> bool {
    let copied = match ctx.keylist_ref_mut(heap) {
        Some(k) => k.make_unique().1,
        None => false,
    };
    if copied {
        log::trace!("copied shared keylist of {}", ctx.varlist());
    }
    copied
}

/// Make room for `delta` more keys; true if the keylist was copied
pub fn expand_context(heap: &mut Heap, ctx: Context, delta: usize) -> CoreResult<bool> {
    ensure_unlocked(heap, ctx)?;
    let copied = ensure_keylist_unique(heap, ctx);
    if let Some(KeylistRef::Unique(k)) = ctx.keylist_ref_mut(heap) {
        k.reserve(delta);
    }
    if !ctx.is_stack(heap) {
        heap.get_mut(ctx.varlist()).reserve(delta);
    }
    Ok(copied)
}

/// Add a key with a void variable; returns its index
pub fn append_context_core(
    heap: &mut Heap,
    ctx: Context,
    spelling: Symbol,
    lookback: bool,
) -> CoreResult<usize> {
    ensure_unlocked(heap, ctx)?;
    if ctx.is_stack(heap) {
        return Err(CoreError::BadTarget(Kind::Frame));
    }
    let canon = heap.canon(spelling);
    let mut key = Key::new(spelling, canon, Typeset::ALL);
    if lookback {
        key.set_flag(KeyFlags::LOOKBACK);
    }

    ensure_keylist_unique(heap, ctx);
    let index = match ctx.keylist_ref_mut(heap) {
        Some(KeylistRef::Unique(k)) => {
            k.push(key);
            k.len()
        }
        _ => return Err(CoreError::BadTarget(ctx.kind(heap))),
    };
    heap.get_mut(ctx.varlist()).push_cell(Cell::void());
    Ok(index)
}

pub fn append_context(heap: &mut Heap, ctx: Context, spelling: Symbol) -> CoreResult<usize> {
    append_context_core(heap, ctx, spelling, false)
}

/// Add a key for the word's spelling and bind the word to it
pub fn append_context_bind_word(
    heap: &mut Heap,
    ctx: Context,
    word: &mut Cell,
) -> CoreResult<usize> {
    let spelling = word
        .word_spelling()
        .filter(|_| word.kind().is_any_word())
        .ok_or_else(|| CoreError::BadTarget(word.kind()))?;
    let index = append_context(heap, ctx, spelling)?;
    word.bind_word(ctx.varlist(), index);
    Ok(index)
}

/// Copy a context's variables into a fresh varlist.
///
/// With no extra capacity the copy shares the source's keylist;
/// otherwise it gets a private keylist with room to grow.
pub fn copy_context_shallow_extra(
    heap: &mut Heap,
    src: Context,
    extra: usize,
) -> CoreResult<Context> {
    let len = src.len(heap);
    let mut cells = Vec::with_capacity(len + 1 + extra);
    cells.push(Cell::unreadable());
    for n in 1..=len {
        cells.push(src.var(heap, n).map_or_else(Cell::void, |c| c.copied()));
    }

    let keylist = match src.keylist_ref_mut(heap) {
        Some(k) if extra == 0 => KeylistRef::Shared(k.share()),
        Some(k) => {
            let mut copy = k.get().clone();
            copy.reserve(extra);
            KeylistRef::Unique(copy)
        }
        None => KeylistRef::Unique(Keylist::with_capacity(extra)),
    };

    let archetype = src.archetype(heap);
    let mut varlist = Series::array(cells);
    varlist.set_flag(SeriesFlags::VARLIST);
    varlist.set_link(Link::Keylist(keylist));
    let node = heap.alloc(varlist)?;

    let mut root = Cell::context(src.kind(heap), node, archetype.phase());
    root.set_binding(archetype.binding());
    heap.get_mut(node).cells_mut()[0] = root;
    Ok(Context::from_varlist(node))
}

/// Index of the key matching `spelling` directly or by canon.
///
/// A hidden match is reported as absent unless `always` is set.
pub fn find_word_in_context(
    heap: &Heap,
    ctx: Context,
    spelling: Symbol,
    always: bool,
) -> Option<usize> {
    let canon = heap.canon(spelling);
    let (i, key) = ctx
        .keylist(heap)
        .iter()
        .enumerate()
        .find(|(_, k)| k.spelling() == spelling || k.canon() == canon)?;
    if key.is_hidden() && !always {
        None
    } else {
        Some(i + 1)
    }
}

/// Variable for a visible key matching `spelling`
pub fn find_word_value(heap: &Heap, ctx: Context, spelling: Symbol) -> Option<&Cell> {
    let n = find_word_in_context(heap, ctx, spelling, false)?;
    ctx.var(heap, n)
}

/// Array of the context's visible keys, values or both
pub fn context_to_array(heap: &mut Heap, ctx: Context, mode: ToArrayMode) -> CoreResult<NodeId> {
    let varlist = ctx.varlist();
    let mut out = vec![];
    for (i, key) in ctx.keylist(heap).iter().enumerate() {
        if key.is_hidden() {
            continue;
        }
        let n = i + 1;
        match mode {
            ToArrayMode::Words => {
                out.push(Cell::bound_word(Kind::Word, key.spelling(), varlist, n));
            }
            ToArrayMode::Values => {
                out.push(ctx.var(heap, n).map_or_else(Cell::void, |c| c.copied()));
            }
            ToArrayMode::Pairs => {
                let mut word = Cell::bound_word(Kind::SetWord, key.spelling(), varlist, n);
                word.set_flag(CellFlags::NEWLINE_BEFORE);
                out.push(word);
                out.push(ctx.var(heap, n).map_or_else(Cell::void, |c| c.copied()));
            }
        }
    }
    heap.make_array(out)
}

/// Forbid further writes to the context's variables and key set
pub fn lock_context(heap: &mut Heap, ctx: Context) {
    heap.get_mut(ctx.varlist()).lock();
}

/// Bind the top-level words of an array that name keys of `ctx`;
/// returns how many were bound
pub fn bind_values_shallow(heap: &mut Heap, array: NodeId, ctx: Context) -> usize {
    let targets: Vec<(usize, usize)> = heap
        .get(array)
        .cells()
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_unreadable() && c.kind().is_any_word())
        .filter_map(|(i, c)| {
            let spelling = c.word_spelling()?;
            find_word_in_context(heap, ctx, spelling, true).map(|n| (i, n))
        })
        .collect();

    let varlist = ctx.varlist();
    let cells = heap.get_mut(array).cells_mut();
    for &(i, n) in &targets {
        cells[i].bind_word(varlist, n);
    }
    targets.len()
}
