//! Copying selected variables from one context into another

use crate::{
    error::{CoreError, CoreResult},
    memory::heap::Heap,
    value::{cell::Cell, kind::Kind},
};

use super::{
    append_context_core, check_typeset, collect::Binder, ensure_keylist_unique, expand_context,
    keylist::{KeyFlags, KeylistRef},
    Context,
};

/// Which keys of the target `resolve_context` considers
#[derive(Copy, Clone, Debug)]
pub enum OnlyWords<'a> {
    /// Every key the source has
    All,
    /// Target keys from this index on (the keys it just gained)
    From(usize),
    /// Keys named by these words or set-words
    Words(&'a [Cell]),
}

/// Copy values from `source` into `target` for the keys picked by
/// `only`.
///
/// A locked key is skipped. A variable that already holds a value is
/// overwritten only when `all` is set. A picked key the source lacks
/// is voided. With `expand`, picked source keys the target lacks are
/// appended to it along with their values.
pub fn resolve_context(
    heap: &mut Heap,
    binder: &mut Binder,
    target: Context,
    source: Context,
    only: OnlyWords<'_>,
    all: bool,
    mut expand: bool,
) -> CoreResult<()> {
    if target.is_locked(heap) {
        return Err(CoreError::LockedContext);
    }

    let mut from = 1;
    if let OnlyWords::From(i) = only {
        from = i.max(1);
        if from > target.len(heap) {
            return Ok(());
        }
    }

    let mut session = binder.start();

    // tag the picked keys
    let mut wanted = 0;
    match only {
        OnlyWords::All => {}
        OnlyWords::From(_) => {
            for key in target.keylist(heap).iter().skip(from - 1) {
                session.put(key.canon(), -1);
            }
            wanted = target.len(heap);
        }
        OnlyWords::Words(words) => {
            for word in words
                .iter()
                .filter(|w| !w.is_unreadable() && matches!(w.kind(), Kind::Word | Kind::SetWord))
            {
                if let Some(spelling) = word.word_spelling() {
                    session.put(heap.canon(spelling), -1);
                    wanted += 1;
                }
            }
        }
    }

    if expand && wanted > 0 {
        let present = target
            .keylist(heap)
            .iter()
            .filter(|k| session.get(k.canon()).is_some())
            .count();
        let missing = wanted.saturating_sub(present);
        if missing > 0 {
            expand_context(heap, target, missing)?;
        } else {
            expand = false;
        }
    }

    // map picked keys to their slot in the source
    let take_all = matches!(only, OnlyWords::All);
    for (i, key) in source.keylist(heap).iter().enumerate() {
        if take_all || session.get(key.canon()).is_some() {
            session.put(key.canon(), i as i32 + 1);
        }
    }

    for n in from..=target.len(heap) {
        let key = match target.key(heap, n) {
            Some(k) => *k,
            None => break,
        };
        let m = match session.remove(key.canon()) {
            Some(m) => m,
            None => continue,
        };
        let is_void = target.var(heap, n).map_or(true, |v| v.is_void());
        if key.is_locked() || !(all || is_void) {
            continue;
        }

        if m < 0 {
            if let Some(var) = target.var_mut(heap, n) {
                *var = Cell::void();
            }
            continue;
        }

        let m = m as usize;
        let value = source.var(heap, m).map_or_else(Cell::void, |v| v.copied());
        check_typeset(heap, &key, &value)?;
        if let Some(var) = target.var_mut(heap, n) {
            *var = value;
        }

        let lookback = source
            .key(heap, m)
            .map_or(false, |k| k.has_flag(KeyFlags::LOOKBACK));
        if lookback != key.has_flag(KeyFlags::LOOKBACK) {
            ensure_keylist_unique(heap, target);
            if let Some(KeylistRef::Unique(keys)) = target.keylist_ref_mut(heap) {
                if let Some(k) = keys.key_mut(n) {
                    k.set_flag_to(KeyFlags::LOOKBACK, lookback);
                }
            }
        }
    }

    if expand {
        let source_keys: Vec<_> = source.keylist(heap).iter().copied().collect();
        for (i, key) in source_keys.iter().enumerate() {
            if session.remove(key.canon()).is_none() {
                continue;
            }
            let value = source.var(heap, i + 1).map_or_else(Cell::void, |v| v.copied());
            let lookback = key.has_flag(KeyFlags::LOOKBACK);
            let n = append_context_core(heap, target, key.spelling(), lookback)?;
            if let Some(var) = target.var_mut(heap, n) {
                *var = value;
            }
        }
    }

    Ok(())
}
