//! Building contexts from bodies and from other contexts
//!
//! Inheriting from a parent copies its values into the child, deep
//! copies any series among them so parent and child share no mutable
//! structure, then rebinds every word in the copies that pointed at
//! the parent to point at the child.

use std::collections::{HashMap, HashSet};

use crate::{
    error::{CoreError, CoreResult},
    memory::{
        heap::{Heap, NodeId},
        series::{Link, Series, SeriesFlags},
    },
    value::{
        cell::{Binding, Cell},
        kind::{Kind, Typeset},
    },
};

use super::{
    bind_values_shallow, check_typeset,
    collect::{collect_keylist, Binder, CollectFlags, CollectSession},
    find_word_in_context,
    keylist::{Key, KeyFlags, Keylist, KeylistRef},
    Context,
};

/// Allocate a varlist around `cells`, whose slot 0 is overwritten by
/// the archetype
fn alloc_varlist(
    heap: &mut Heap,
    kind: Kind,
    mut cells: Vec<Cell>,
    keylist: KeylistRef,
) -> CoreResult<Context> {
    if cells.is_empty() {
        cells.push(Cell::unreadable());
    }
    let mut varlist = Series::array(cells);
    varlist.set_flag(SeriesFlags::VARLIST);
    varlist.set_link(Link::Keylist(keylist));
    let node = heap.alloc(varlist)?;
    heap.get_mut(node).cells_mut()[0] = Cell::context(kind, node, None);
    Ok(Context::from_varlist(node))
}

/// Set the `self` variable to the context's own archetype
fn fill_self(heap: &mut Heap, ctx: Context) -> CoreResult<()> {
    let self_sym = heap.self_symbol();
    let n = find_word_in_context(heap, ctx, self_sym, true)
        .ok_or(CoreError::BadTarget(ctx.kind(heap)))?;
    let archetype = ctx.archetype(heap);
    if let Some(var) = ctx.var_mut(heap, n) {
        *var = archetype;
    }
    Ok(())
}

/// Make a context whose keys are the top-level set-words of `body`
/// plus a hidden `self`, inheriting keys and values from `parent`.
///
/// Variables start blank; `self` holds the context itself.
pub fn make_selfish_context_detect(
    heap: &mut Heap,
    binder: &mut Binder,
    kind: Kind,
    body: &[Cell],
    parent: Option<Context>,
) -> CoreResult<Context> {
    let collected = collect_keylist(heap, binder, body, parent, CollectFlags::ENSURE_SELF)?;
    let len = collected.keylist.get().len();

    let mut cells = vec![Cell::blank(); len + 1];
    cells[0] = Cell::unreadable();
    if let Some(p) = parent {
        let keys = collected.keylist.get();
        for (i, key) in p.keylist(heap).iter().enumerate() {
            if let (Some(n), Some(var)) = (keys.find_canon(key.canon()), p.var(heap, i + 1)) {
                if let Some(child_key) = keys.key(n) {
                    check_typeset(heap, child_key, var)?;
                }
                cells[n] = var.copied();
            }
        }
    }

    let ctx = alloc_varlist(heap, kind, cells, collected.keylist)?;
    clonify_vars(heap, ctx)?;
    fill_self(heap, ctx)?;
    if let Some(p) = parent {
        rebind_context_deep(heap, p, ctx, None);
    }
    log::trace!("made {} with {len} keys", ctx.varlist());
    Ok(ctx)
}

/// Build a context from a `[a: 1 b: 2]` style body without
/// evaluating it.
///
/// The body's set-words are bound to the new context in place. Each
/// must be followed by the value it receives.
pub fn construct_context(
    heap: &mut Heap,
    binder: &mut Binder,
    kind: Kind,
    body: NodeId,
    parent: Option<Context>,
) -> CoreResult<Context> {
    let cells = heap.get(body).cells().to_vec();
    let ctx = make_selfish_context_detect(heap, binder, kind, &cells, parent)?;
    bind_values_shallow(heap, body, ctx);

    let bound = heap.get(body).cells().to_vec();
    for (i, pair) in bound.chunks(2).enumerate() {
        let word = pair[0];
        if word.is_unreadable() || word.kind() != Kind::SetWord {
            return Err(CoreError::BadTarget(word.kind_unchecked()));
        }
        let value = match pair.get(1) {
            Some(v) if !v.is_unreadable() && v.kind() == Kind::SetWord => {
                return Err(CoreError::BadTarget(Kind::SetWord))
            }
            Some(v) => *v,
            None => return Err(CoreError::BadIndex(2 * i + 1)),
        };
        let n = word
            .word_index()
            .filter(|n| *n > 0)
            .ok_or(CoreError::BadTarget(Kind::SetWord))?;
        ctx.set_var(heap, n as usize, value)?;
    }
    Ok(ctx)
}

/// Make a child holding the keys of both parents.
///
/// Where both parents have a key the second parent's value wins.
pub fn merge_contexts_selfish(
    heap: &mut Heap,
    binder: &mut Binder,
    parent1: Context,
    parent2: Context,
) -> CoreResult<Context> {
    let kind = parent1.kind(heap);
    let mut session = binder.start();

    let self_sym = heap.self_symbol();
    if find_word_in_context(heap, parent1, self_sym, true).is_none() {
        let key = Key::new(self_sym, heap.canon(self_sym), Typeset::ALL)
            .with_flag(KeyFlags::HIDDEN);
        let index = session.push_key(key);
        session.set(key.canon(), index as i32);
    }
    session.collect_context_keys(parent1.keylist(heap), true);
    session.collect_context_keys(parent2.keylist(heap), true);

    let keylist = Keylist::from_keys(session.keys().to_vec());
    let mut cells = vec![Cell::blank(); keylist.len() + 1];
    for parent in [parent1, parent2] {
        for (i, key) in parent.keylist(heap).iter().enumerate() {
            let slot = match session.get(key.canon()) {
                Some(n) if n > 0 => n as usize,
                _ => continue,
            };
            if let (Some(var), Some(child_key)) = (parent.var(heap, i + 1), keylist.key(slot)) {
                check_typeset(heap, child_key, var)?;
                cells[slot] = var.copied();
            }
        }
    }

    let child = alloc_varlist(heap, kind, cells, KeylistRef::Unique(keylist))?;
    clonify_vars(heap, child)?;
    rebind_context_deep(heap, parent1, child, Some(&session));
    rebind_context_deep(heap, parent2, child, Some(&session));
    drop(session);

    fill_self(heap, child)?;
    Ok(child)
}

fn clone_series_deep(
    heap: &mut Heap,
    node: NodeId,
    copies: &mut HashMap<NodeId, NodeId>,
) -> CoreResult<NodeId> {
    if let Some(copy) = copies.get(&node) {
        return Ok(*copy);
    }

    let src = heap.get(node);
    let keep = src.flags() & (SeriesFlags::UTF8 | SeriesFlags::NEWLINE_AT_TAIL);
    let mut series = if src.is_array() {
        Series::array(src.cells().to_vec())
    } else {
        Series::binary(src.bytes().to_vec())
    };
    series.set_flag(keep);
    let is_array = series.is_array();
    let copy = heap.alloc(series)?;
    copies.insert(node, copy);

    if is_array {
        clonify_cells(heap, copy, 0, copies)?;
    }
    Ok(copy)
}

/// Replace series references in `array[from..]` with deep copies
fn clonify_cells(
    heap: &mut Heap,
    array: NodeId,
    from: usize,
    copies: &mut HashMap<NodeId, NodeId>,
) -> CoreResult<()> {
    let len = heap.get(array).len();
    for i in from..len {
        let cell = heap.get(array).cells()[i];
        if cell.is_unreadable() || !cell.kind().is_cloned() {
            continue;
        }
        if let Some(node) = cell.series_node() {
            let copy = clone_series_deep(heap, node, copies)?;
            heap.get_mut(array).cells_mut()[i] = cell.with_series_node(copy);
        }
    }
    Ok(())
}

/// Deep copy every series held in a context's variables
pub(crate) fn clonify_vars(heap: &mut Heap, ctx: Context) -> CoreResult<()> {
    let mut copies = HashMap::new();
    clonify_cells(heap, ctx.varlist(), 1, &mut copies)
}

/// Retarget words and arrays bound to `src` so they refer to `dst`.
///
/// Walks the variables of `dst` and every array reachable from them.
/// New slot numbers come from the session's table when given,
/// otherwise from looking the word up in `dst`.
pub(crate) fn rebind_context_deep(
    heap: &mut Heap,
    src: Context,
    dst: Context,
    table: Option<&CollectSession<'_>>,
) {
    let from = Binding::Context(src.varlist());
    let mut visited = HashSet::new();
    let mut work = vec![(dst.varlist(), 1)];
    visited.insert(dst.varlist());

    while let Some((node, start)) = work.pop() {
        let len = heap.get(node).len();
        for i in start..len {
            let cell = heap.get(node).cells()[i];
            if cell.is_unreadable() {
                continue;
            }
            let kind = cell.kind();
            if kind.is_any_word() && cell.binding() == from {
                let index = match (cell.word_spelling(), table) {
                    (Some(s), Some(t)) => t
                        .get(heap.canon(s))
                        .filter(|n| *n > 0)
                        .map(|n| n as usize),
                    (Some(s), None) => find_word_in_context(heap, dst, s, true),
                    (None, _) => None,
                };
                if let Some(n) = index {
                    heap.get_mut(node).cells_mut()[i].bind_word(dst.varlist(), n);
                }
            } else if kind.is_any_array() {
                if cell.binding() == from {
                    heap.get_mut(node).cells_mut()[i].set_binding(Binding::Context(dst.varlist()));
                }
                if let Some(inner) = cell.series_node() {
                    if visited.insert(inner) {
                        work.push((inner, 0));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::context::{alloc_context, append_context};

    fn object(heap: &mut Heap, binder: &mut Binder, pairs: &[(&str, Cell)]) -> Context {
        let mut body = vec![];
        for (name, value) in pairs {
            body.push(Cell::word(Kind::SetWord, heap.intern(name).unwrap()));
            body.push(*value);
        }
        let node = heap.make_array(body).unwrap();
        construct_context(heap, binder, Kind::Object, node, None).unwrap()
    }

    fn value_of(heap: &mut Heap, ctx: Context, name: &str) -> Option<Cell> {
        let sym = heap.intern(name).unwrap();
        crate::context::find_word_value(heap, ctx, sym).copied()
    }

    #[test]
    pub fn test_construct_assigns_values() {
        let mut heap = Heap::new();
        let mut binder = Binder::new();
        let ctx = object(
            &mut heap,
            &mut binder,
            &[("a", Cell::integer(1)), ("b", Cell::integer(2))],
        );
        assert_eq!(ctx.len(&heap), 3);
        assert_eq!(value_of(&mut heap, ctx, "a"), Some(Cell::integer(1)));
        assert_eq!(value_of(&mut heap, ctx, "b"), Some(Cell::integer(2)));

        let self_sym = heap.self_symbol();
        let n = find_word_in_context(&heap, ctx, self_sym, true).unwrap();
        assert_eq!(ctx.var(&heap, n), Some(&ctx.archetype(&heap)));
        assert!(binder.is_empty());
    }

    #[test]
    pub fn test_construct_rejects_bad_bodies() {
        let mut heap = Heap::new();
        let mut binder = Binder::new();
        let a = heap.intern("a").unwrap();

        let missing = heap.make_array(vec![Cell::word(Kind::SetWord, a)]).unwrap();
        assert_eq!(
            construct_context(&mut heap, &mut binder, Kind::Object, missing, None),
            Err(CoreError::BadIndex(1))
        );

        let not_set = heap
            .make_array(vec![Cell::integer(1), Cell::integer(2)])
            .unwrap();
        assert_eq!(
            construct_context(&mut heap, &mut binder, Kind::Object, not_set, None),
            Err(CoreError::BadTarget(Kind::Integer))
        );
        assert!(binder.is_empty());
    }

    #[test]
    pub fn test_child_copies_parent_series() {
        let mut heap = Heap::new();
        let mut binder = Binder::new();
        let text = heap.make_text("hi").unwrap();
        let parent = object(&mut heap, &mut binder, &[("s", Cell::text(text))]);

        let child =
            make_selfish_context_detect(&mut heap, &mut binder, Kind::Object, &[], Some(parent))
                .unwrap();
        let copied = value_of(&mut heap, child, "s").unwrap();
        let node = copied.series_node().unwrap();
        assert_ne!(node, text);
        assert_eq!(heap.get(node).as_str(), Some("hi"));
    }

    #[test]
    pub fn test_child_rebinds_parent_words() {
        let mut heap = Heap::new();
        let mut binder = Binder::new();
        let parent = alloc_context(&mut heap, Kind::Object, 2).unwrap();
        let a = heap.intern("a").unwrap();
        let b = heap.intern("b").unwrap();
        let na = append_context(&mut heap, parent, a).unwrap();
        let nb = append_context(&mut heap, parent, b).unwrap();
        let inner = heap
            .make_array(vec![Cell::bound_word(Kind::Word, a, parent.varlist(), na)])
            .unwrap();
        parent.set_var(&mut heap, nb, Cell::block(inner)).unwrap();

        let child =
            make_selfish_context_detect(&mut heap, &mut binder, Kind::Object, &[], Some(parent))
                .unwrap();
        let block = value_of(&mut heap, child, "b").unwrap();
        let word = heap.get(block.series_node().unwrap()).cells()[0];
        assert_eq!(word.binding(), Binding::Context(child.varlist()));
        let expect = find_word_in_context(&heap, child, a, false).unwrap();
        assert_eq!(word.word_index(), Some(expect as i32));
        // parent's own block is untouched
        let original = heap.get(inner).cells()[0];
        assert_eq!(original.binding(), Binding::Context(parent.varlist()));
    }

    #[test]
    pub fn test_child_rebinds_bound_arrays() {
        let mut heap = Heap::new();
        let mut binder = Binder::new();
        let parent = alloc_context(&mut heap, Kind::Object, 2).unwrap();
        let b = heap.intern("b").unwrap();
        let c = heap.intern("c").unwrap();
        let nb = append_context(&mut heap, parent, b).unwrap();
        let nc = append_context(&mut heap, parent, c).unwrap();

        let leaf = heap.make_array(vec![]).unwrap();
        let mut nested = Cell::block(leaf);
        nested.set_binding(Binding::Context(parent.varlist()));
        let outer = heap.make_array(vec![nested]).unwrap();
        let mut bound = Cell::block(outer);
        bound.set_binding(Binding::Context(parent.varlist()));
        parent.set_var(&mut heap, nb, bound).unwrap();
        let free = heap.make_array(vec![]).unwrap();
        parent.set_var(&mut heap, nc, Cell::block(free)).unwrap();

        let child =
            make_selfish_context_detect(&mut heap, &mut binder, Kind::Object, &[], Some(parent))
                .unwrap();
        let top = value_of(&mut heap, child, "b").unwrap();
        assert_eq!(top.binding(), Binding::Context(child.varlist()));
        let inner = heap.get(top.series_node().unwrap()).cells()[0];
        assert_eq!(inner.binding(), Binding::Context(child.varlist()));
        assert_eq!(value_of(&mut heap, child, "c").unwrap().binding(), Binding::Unbound);

        // the parent keeps its own bindings
        assert_eq!(
            parent.var(&heap, nb).unwrap().binding(),
            Binding::Context(parent.varlist())
        );
    }

    #[test]
    pub fn test_enforced_typesets_on_inherit() {
        use crate::options::{CoreOptions, TypesetPolicy};

        for (policy, ok) in [(TypesetPolicy::Ignore, true), (TypesetPolicy::Enforce, false)] {
            let mut heap =
                Heap::with_options(CoreOptions::default().with_typeset_policy(policy));
            let mut binder = Binder::new();
            let text = heap.make_text("t").unwrap();
            let parent = object(&mut heap, &mut binder, &[("a", Cell::text(text))]);

            // narrow the key after the value is in place
            let (keys, _) = parent.keylist_ref_mut(&mut heap).unwrap().make_unique();
            let n = keys.len();
            keys.key_mut(n)
                .unwrap()
                .set_typeset(Typeset::of(&[Kind::Integer]));

            let result =
                make_selfish_context_detect(&mut heap, &mut binder, Kind::Object, &[], Some(parent));
            match result {
                Ok(_) => assert!(ok),
                Err(e) => {
                    assert!(!ok);
                    assert_eq!(
                        e,
                        CoreError::TypeCheck {
                            key: "a".to_string(),
                            kind: Kind::Text
                        }
                    );
                }
            }
            assert!(binder.is_empty());
        }
    }

    #[test]
    pub fn test_merge_second_parent_wins() {
        let mut heap = Heap::new();
        let mut binder = Binder::new();
        let p1 = object(&mut heap, &mut binder, &[("a", Cell::integer(1))]);
        let p2 = object(
            &mut heap,
            &mut binder,
            &[("a", Cell::integer(2)), ("b", Cell::integer(3))],
        );
        let child = merge_contexts_selfish(&mut heap, &mut binder, p1, p2).unwrap();
        assert_eq!(child.len(&heap), 3);
        assert_eq!(value_of(&mut heap, child, "a"), Some(Cell::integer(2)));
        assert_eq!(value_of(&mut heap, child, "b"), Some(Cell::integer(3)));
        assert!(binder.is_empty());
    }
}
