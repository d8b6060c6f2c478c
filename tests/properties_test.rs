//! End to end checks of the object model's laws and reference scenarios

use rebcore::{
    context::{
        append_context, collect_keylist, construct_context, copy_context_shallow_extra,
        expand_context, find_word_in_context, find_word_value, make_selfish_context_detect,
        merge_contexts_selfish, Binder, CollectFlags, Context,
    },
    error::{AllocError, CoreError},
    memory::{collect::collect, heap::Heap},
    modify::{modify, ModifyFlags, Verb},
    options::CoreOptions,
    value::{
        cell::{Binding, Cell},
        kind::Kind,
    },
};

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
    find_word_value(heap, ctx, sym).copied()
}

/// Store `[[word]]` in `holder`, with the word and both blocks bound
/// to `ctx`
fn nest_bound(heap: &mut Heap, ctx: Context, word: &str, holder: &str) {
    let sym = heap.intern(word).unwrap();
    let n = find_word_in_context(heap, ctx, sym, false).unwrap();
    let bound = Cell::bound_word(Kind::Word, sym, ctx.varlist(), n);
    let inner = heap.make_array(vec![bound]).unwrap();
    let mut inner_cell = Cell::block(inner);
    inner_cell.set_binding(Binding::Context(ctx.varlist()));
    let outer = heap.make_array(vec![inner_cell]).unwrap();
    let mut outer_cell = Cell::block(outer);
    outer_cell.set_binding(Binding::Context(ctx.varlist()));

    let holder = heap.intern(holder).unwrap();
    let slot = find_word_in_context(heap, ctx, holder, false).unwrap();
    ctx.set_var(heap, slot, outer_cell).unwrap();
}

/// The outer block, inner block and word stored by `nest_bound`
fn nested(heap: &mut Heap, ctx: Context, holder: &str) -> [Cell; 3] {
    let outer = value_of(heap, ctx, holder).unwrap();
    let inner = heap.get(outer.series_node().unwrap()).cells()[0];
    let word = heap.get(inner.series_node().unwrap()).cells()[0];
    [outer, inner, word]
}

fn assert_nested_bound_to(heap: &mut Heap, ctx: Context, holder: &str, word: &str) {
    let sym = heap.intern(word).unwrap();
    let slot = find_word_in_context(heap, ctx, sym, false).unwrap();
    let cells = nested(heap, ctx, holder);
    for cell in &cells {
        assert_eq!(cell.binding(), Binding::Context(ctx.varlist()));
    }
    assert_eq!(cells[2].word_index(), Some(slot as i32));
}

fn set_words(heap: &mut Heap, names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|n| Cell::word(Kind::SetWord, heap.intern(n).unwrap()))
        .collect()
}

#[test]
pub fn test_copy_on_write_isolation() {
    let mut heap = Heap::new();
    let mut binder = Binder::new();
    let original = object(
        &mut heap,
        &mut binder,
        &[("a", Cell::integer(1)), ("b", Cell::integer(2))],
    );
    let copy = copy_context_shallow_extra(&mut heap, original, 0).unwrap();
    assert!(std::ptr::eq(original.keylist(&heap), copy.keylist(&heap)));

    let before = original.len(&heap);
    let c = heap.intern("c").unwrap();
    append_context(&mut heap, copy, c).unwrap();
    expand_context(&mut heap, copy, 4).unwrap();

    assert_eq!(original.len(&heap), before);
    assert_eq!(copy.len(&heap), before + 1);
    assert!(!std::ptr::eq(original.keylist(&heap), copy.keylist(&heap)));
    assert_eq!(value_of(&mut heap, original, "a"), Some(Cell::integer(1)));
    assert_eq!(value_of(&mut heap, original, "b"), Some(Cell::integer(2)));
    assert_eq!(value_of(&mut heap, original, "c"), None);
}

#[test]
pub fn test_collecting_known_keys_reuses_keylist() {
    let mut heap = Heap::new();
    let mut binder = Binder::new();
    let prior = object(
        &mut heap,
        &mut binder,
        &[("a", Cell::integer(1)), ("b", Cell::integer(2))],
    );

    for names in [&["a"][..], &["b", "a"][..], &["self", "A"][..], &[][..]] {
        let body = set_words(&mut heap, names);
        let collected =
            collect_keylist(&mut heap, &mut binder, &body, Some(prior), CollectFlags::ENSURE_SELF)
                .unwrap();
        assert!(collected.reused);
        assert!(std::ptr::eq(collected.keylist.get(), prior.keylist(&heap)));
    }

    let body = set_words(&mut heap, &["z"]);
    let collected =
        collect_keylist(&mut heap, &mut binder, &body, Some(prior), CollectFlags::ENSURE_SELF)
            .unwrap();
    assert!(!collected.reused);
    assert_eq!(collected.keylist.get().len(), prior.len(&heap) + 1);
}

#[test]
pub fn test_binder_clean_after_failure() {
    let mut heap = Heap::new();
    let mut binder = Binder::new();

    let dup = set_words(&mut heap, &["a", "b", "a"]);
    assert_eq!(
        collect_keylist(&mut heap, &mut binder, &dup, None, CollectFlags::NO_DUP).err(),
        Some(CoreError::DuplicateKey("a".to_string()))
    );
    assert!(binder.is_empty());

    // no stale slot for `a` or `b` survives into the next collection
    let body = set_words(&mut heap, &["b", "a"]);
    let collected =
        collect_keylist(&mut heap, &mut binder, &body, None, CollectFlags::NO_DUP).unwrap();
    let keys = collected.keylist.get();
    assert_eq!(keys.len(), 2);
    assert_eq!(heap.spelling(keys.key(1).unwrap().spelling()), "b");
    assert_eq!(heap.spelling(keys.key(2).unwrap().spelling()), "a");
    assert!(binder.is_empty());
}

#[test]
pub fn test_binder_clean_after_exhaustion() {
    let limit = 16;
    let mut heap = Heap::with_options(CoreOptions::default().with_node_limit(limit));
    let mut binder = Binder::new();
    let body = set_words(&mut heap, &["a", "b"]);
    let node = heap.make_array(body.clone()).unwrap();
    while heap.make_text("filler").is_ok() {}

    assert_eq!(
        make_selfish_context_detect(&mut heap, &mut binder, Kind::Object, &body, None),
        Err(CoreError::Alloc(AllocError::OutOfMemory(limit)))
    );
    assert!(binder.is_empty());

    collect(&vec![Cell::block(node)], &mut heap);
    let ctx =
        make_selfish_context_detect(&mut heap, &mut binder, Kind::Object, &body, None).unwrap();
    assert_eq!(ctx.len(&heap), 3);
    assert!(binder.is_empty());
}

#[test]
pub fn test_edit_index_and_length_laws() {
    let mut heap = Heap::new();
    let block = heap.make_array(vec![Cell::integer(0); 3]).unwrap();
    let pair = heap
        .make_array(vec![Cell::integer(1), Cell::integer(2)])
        .unwrap();
    let source = Cell::block(pair);

    for (flags, dups, per_dup) in [
        (ModifyFlags::empty(), 1, 1),
        (ModifyFlags::empty(), 3, 1),
        (ModifyFlags::SPLICE, 1, 2),
        (ModifyFlags::SPLICE, 4, 2),
    ] {
        let old = heap.get(block).len();
        let at = modify(&mut heap, &Cell::block(block).at(1), Verb::Insert, &source, flags, 0, dups)
            .unwrap();
        let grown = dups as usize * per_dup;
        assert_eq!(heap.get(block).len(), old + grown);
        assert_eq!(at, 1 + grown);

        let old = heap.get(block).len();
        let at = modify(&mut heap, &Cell::block(block).at(2), Verb::Append, &source, flags, 0, dups)
            .unwrap();
        assert_eq!(at, 0);
        assert_eq!(heap.get(block).len(), old + grown);
    }

    let text = heap.make_text("ab").unwrap();
    let at = modify(
        &mut heap,
        &Cell::text(text),
        Verb::Append,
        &Cell::char('é'),
        ModifyFlags::empty(),
        0,
        2,
    )
    .unwrap();
    assert_eq!(at, 0);
    assert_eq!(heap.get(text).codepoint_len(), 4);
}

#[test]
pub fn test_change_size_law() {
    let mut heap = Heap::new();
    // (target, replacement, codepoints replaced)
    let cases = [
        ("aaaa", "€", 1),
        ("€€€€", "a", 2),
        ("éb", "ü", 1),
        ("αβγ", "xyz", 3),
    ];
    for (target, replacement, part) in cases {
        let node = heap.make_text(target).unwrap();
        let src = heap.make_text(replacement).unwrap();
        let used = heap.get(node).len();

        let replaced: usize = target.chars().take(part).map(char::len_utf8).sum();
        let supplied = replacement.len();

        modify(
            &mut heap,
            &Cell::text(node),
            Verb::Change,
            &Cell::text(src),
            ModifyFlags::PART,
            part,
            1,
        )
        .unwrap();
        let now = heap.get(node).len();
        assert_eq!(now as isize - used as isize, supplied as isize - replaced as isize);
        assert!(heap.get(node).as_str().is_some());
    }
}

#[test]
pub fn test_non_ascii_byte_index_is_rejected() {
    let mut heap = Heap::new();
    let node = heap.make_text("aé€b").unwrap();
    let bytes = heap.get(node).bytes().to_vec();
    let none = ModifyFlags::empty();

    for (i, byte) in bytes.iter().enumerate() {
        let target = Cell::binary(node).at(i);
        for verb in [Verb::Insert, Verb::Change] {
            let result = modify(&mut heap, &target, verb, &Cell::nulled(), none, 0, 1);
            if *byte >= 0x80 {
                assert_eq!(result, Err(CoreError::InvalidCodepointIndex(i)));
            } else {
                assert!(result.is_ok());
            }
        }
    }
    assert_eq!(heap.get(node).as_str(), Some("aé€b"));
}

#[test]
pub fn test_scenario_insert_spliced_block() {
    let mut heap = Heap::new();
    let abc = ["a", "b", "c"]
        .iter()
        .map(|n| Cell::word(Kind::Word, heap.intern(n).unwrap()))
        .collect();
    let xy = ["x", "y"]
        .iter()
        .map(|n| Cell::word(Kind::Word, heap.intern(n).unwrap()))
        .collect();
    let target = heap.make_array(abc).unwrap();
    let source = heap.make_array(xy).unwrap();

    let at = modify(
        &mut heap,
        &Cell::block(target).at(1),
        Verb::Insert,
        &Cell::block(source),
        ModifyFlags::SPLICE,
        0,
        1,
    )
    .unwrap();
    assert_eq!(at, 3);
    let names: Vec<&str> = heap
        .get(target)
        .cells()
        .iter()
        .map(|c| heap.spelling(c.word_spelling().unwrap()))
        .collect();
    assert_eq!(names, ["a", "x", "y", "b", "c"]);
}

#[test]
pub fn test_scenario_change_first_codepoint() {
    let mut heap = Heap::new();
    let node = heap.make_text("abc").unwrap();
    let d = heap.make_text("d").unwrap();
    let at = modify(
        &mut heap,
        &Cell::text(node),
        Verb::Change,
        &Cell::text(d),
        ModifyFlags::empty(),
        0,
        1,
    )
    .unwrap();
    assert_eq!(at, 1);
    assert_eq!(heap.get(node).as_str(), Some("dbc"));
}

#[test]
pub fn test_scenario_merge() {
    let mut heap = Heap::new();
    let mut binder = Binder::new();
    let p1 = object(&mut heap, &mut binder, &[("a", Cell::integer(1))]);
    let p2 = object(
        &mut heap,
        &mut binder,
        &[("a", Cell::integer(2)), ("b", Cell::integer(3))],
    );
    let child = merge_contexts_selfish(&mut heap, &mut binder, p1, p2).unwrap();

    let names: Vec<&str> = child
        .keylist(&heap)
        .iter()
        .map(|k| heap.spelling(k.spelling()))
        .collect();
    assert_eq!(names, ["self", "a", "b"]);
    assert_eq!(value_of(&mut heap, child, "a"), Some(Cell::integer(2)));
    assert_eq!(value_of(&mut heap, child, "b"), Some(Cell::integer(3)));
    assert_eq!(child.var(&heap, 1), Some(&child.archetype(&heap)));
}

#[test]
pub fn test_scenario_integer_into_binary_and_text() {
    let mut heap = Heap::new();
    let bin = heap.make_binary(&[0xde, 0xad]).unwrap();
    let text = heap.make_text("n=").unwrap();
    let ten = Cell::integer(10);
    let none = ModifyFlags::empty();

    modify(&mut heap, &Cell::binary(bin), Verb::Append, &ten, none, 0, 1).unwrap();
    assert_eq!(heap.get(bin).bytes(), &[0xde, 0xad, 0x0a]);

    modify(&mut heap, &Cell::text(text), Verb::Append, &ten, none, 0, 1).unwrap();
    assert_eq!(heap.get(text).as_str(), Some("n=10"));
}

#[test]
pub fn test_change_part_past_tail_clamps() {
    let mut heap = Heap::new();
    for (index, expect) in [(1, &[1, 0][..]), (3, &[1, 2, 3, 0][..])] {
        let block = heap.make_array((1..=3).map(Cell::integer).collect()).unwrap();
        let at = modify(
            &mut heap,
            &Cell::block(block).at(index),
            Verb::Change,
            &Cell::integer(0),
            ModifyFlags::PART,
            10,
            1,
        )
        .unwrap();
        assert_eq!(at, index + 1);
        let now: Vec<i64> = heap
            .get(block)
            .cells()
            .iter()
            .filter_map(Cell::as_integer)
            .collect();
        assert_eq!(now, expect);
    }

    let block = heap.make_array((1..=3).map(Cell::integer).collect()).unwrap();
    let at = modify(
        &mut heap,
        &Cell::block(block).at(1),
        Verb::Change,
        &Cell::nulled(),
        ModifyFlags::PART,
        10,
        1,
    )
    .unwrap();
    assert_eq!(at, 1);
    assert_eq!(heap.get(block).cells(), &[Cell::integer(1)]);

    let text = heap.make_text("aé€").unwrap();
    let at = modify(
        &mut heap,
        &Cell::text(text).at(1),
        Verb::Change,
        &Cell::char('x'),
        ModifyFlags::PART,
        10,
        1,
    )
    .unwrap();
    assert_eq!(at, 2);
    assert_eq!(heap.get(text).as_str(), Some("ax"));
    assert_eq!(heap.get(text).codepoint_len(), 2);
}

#[test]
pub fn test_inherit_rebinds_nested_words_and_blocks() {
    let mut heap = Heap::new();
    let mut binder = Binder::new();
    let parent = object(
        &mut heap,
        &mut binder,
        &[("a", Cell::integer(1)), ("blk", Cell::blank())],
    );
    nest_bound(&mut heap, parent, "a", "blk");

    let child =
        make_selfish_context_detect(&mut heap, &mut binder, Kind::Object, &[], Some(parent))
            .unwrap();
    assert_nested_bound_to(&mut heap, child, "blk", "a");
    assert_nested_bound_to(&mut heap, parent, "blk", "a");
}

#[test]
pub fn test_merge_rebinds_nested_words_and_blocks() {
    let mut heap = Heap::new();
    let mut binder = Binder::new();
    let p1 = object(
        &mut heap,
        &mut binder,
        &[("a", Cell::integer(1)), ("blk", Cell::blank())],
    );
    let p2 = object(
        &mut heap,
        &mut binder,
        &[("b", Cell::integer(2)), ("more", Cell::blank())],
    );
    nest_bound(&mut heap, p1, "a", "blk");
    nest_bound(&mut heap, p2, "b", "more");

    let child = merge_contexts_selfish(&mut heap, &mut binder, p1, p2).unwrap();
    assert_nested_bound_to(&mut heap, child, "blk", "a");
    assert_nested_bound_to(&mut heap, child, "more", "b");
    assert_nested_bound_to(&mut heap, p1, "blk", "a");
    assert_nested_bound_to(&mut heap, p2, "more", "b");
    assert!(binder.is_empty());
}

#[test]
pub fn test_binary_source_must_keep_text_valid() {
    let mut heap = Heap::new();
    let target = heap.make_text("ab").unwrap();
    let at_one = Cell::text(target).at(1);
    let none = ModifyFlags::empty();

    // bytes that stop halfway through "é"
    let half = heap.make_binary(&[0x78, 0xc3]).unwrap();
    assert_eq!(
        modify(&mut heap, &at_one, Verb::Insert, &Cell::binary(half), none, 0, 1),
        Err(CoreError::Encoding)
    );

    // a binary view of text positioned inside "é"
    let accented = heap.make_text("éz").unwrap();
    assert_eq!(
        modify(&mut heap, &at_one, Verb::Insert, &Cell::binary(accented).at(1), none, 0, 1),
        Err(CoreError::InvalidCodepointIndex(1))
    );
    assert_eq!(heap.get(target).as_str(), Some("ab"));
    assert_eq!(heap.get(target).codepoint_len(), 2);

    let at = modify(&mut heap, &at_one, Verb::Insert, &Cell::binary(accented), none, 0, 1).unwrap();
    assert_eq!(at, 3);
    assert_eq!(heap.get(target).as_str(), Some("aézb"));
    assert_eq!(heap.get(target).codepoint_len(), 4);
}
