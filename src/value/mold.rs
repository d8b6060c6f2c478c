//! Forming and molding values to text
//!
//! `form` is the human-readable rendering used when a value is
//! stringified into a text series. `mold` is the loadable source
//! rendering. Arrays are tracked on a stack so that a block
//! containing itself renders as `[...]` rather than recursing.

use itertools::Itertools;

use crate::{
    context::Context,
    error::{CoreError, CoreResult},
    memory::heap::{Heap, NodeId},
};

use super::{
    cell::{Cell, Payload},
    kind::{Kind, ALL_KINDS},
};

struct Molder<'h> {
    heap: &'h Heap,
    out: String,
    stack: Vec<NodeId>,
}

impl<'h> Molder<'h> {
    fn new(heap: &'h Heap) -> Self {
        Molder {
            heap,
            out: String::new(),
            stack: vec![],
        }
    }

    fn series_text(&self, cell: &Cell) -> &'h str {
        let heap = self.heap;
        match cell.series_node().and_then(|n| heap.try_get(n)) {
            Some(series) if series.is_utf8() => {
                let s = series.as_str().unwrap_or("");
                match s.char_indices().nth(cell.index()) {
                    Some((offset, _)) => &s[offset..],
                    None => "",
                }
            }
            Some(series) => {
                let bytes = series.bytes();
                std::str::from_utf8(&bytes[cell.index().min(bytes.len())..]).unwrap_or("")
            }
            None => "",
        }
    }

    fn series_cells(&self, cell: &Cell) -> &'h [Cell] {
        let heap = self.heap;
        match cell.series_node().and_then(|n| heap.try_get(n)) {
            Some(series) => {
                let cells = series.cells();
                &cells[cell.index().min(cells.len())..]
            }
            None => &[],
        }
    }

    fn spelling(&self, cell: &Cell) -> &'h str {
        let heap = self.heap;
        cell.word_spelling().map_or("", |s| heap.spelling(s))
    }

    fn decimal(&mut self, d: f64) {
        if d.fract() == 0.0 && d.abs() < 1e16 {
            self.out.push_str(&format!("{d:.1}"));
        } else {
            self.out.push_str(&format!("{d}"));
        }
    }

    fn array_items(&mut self, cells: &[Cell], mold: bool) {
        for (i, item) in cells.iter().enumerate() {
            if i > 0 {
                self.out.push(' ');
            }
            self.value(item, mold);
        }
    }

    fn array(&mut self, cell: &Cell, open: &str, close: &str, mold: bool) {
        let node = match cell.series_node() {
            Some(n) => n,
            None => return,
        };
        if self.stack.contains(&node) {
            self.out.push_str(open);
            self.out.push_str("...");
            self.out.push_str(close);
            return;
        }
        self.stack.push(node);
        let cells = self.series_cells(cell);
        self.out.push_str(open);
        self.array_items(cells, mold);
        self.out.push_str(close);
        self.stack.pop();
    }

    fn path(&mut self, cell: &Cell) {
        let cells = self.series_cells(cell);
        for (i, item) in cells.iter().enumerate() {
            if i > 0 {
                self.out.push('/');
            }
            self.value(item, true);
        }
    }

    fn context(&mut self, cell: &Cell, mold: bool) {
        let ctx = match Context::from_cell(cell) {
            Some(ctx) => ctx,
            None => return,
        };
        if self.stack.contains(&ctx.varlist()) {
            self.out.push_str("make object! [...]");
            return;
        }
        self.stack.push(ctx.varlist());
        let heap = self.heap;
        let mut fields = vec![];
        for (n, key) in ctx.keylist(heap).iter().enumerate() {
            if key.is_hidden() {
                continue;
            }
            if let Some(var) = ctx.var(heap, n + 1) {
                fields.push((heap.spelling(key.spelling()), *var));
            }
        }
        if mold {
            self.out.push_str(&format!("make {} [", cell.kind_unchecked()));
        }
        for (i, (name, var)) in fields.iter().enumerate() {
            if i > 0 {
                self.out.push(if mold { ' ' } else { '\n' });
            }
            self.out.push_str(name);
            self.out.push_str(": ");
            self.value(var, true);
        }
        if mold {
            self.out.push(']');
        }
        self.stack.pop();
    }

    fn text(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("^\""),
                '^' => self.out.push_str("^^"),
                '\n' => self.out.push_str("^/"),
                '\t' => self.out.push_str("^-"),
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }

    fn value(&mut self, cell: &Cell, mold: bool) {
        let kind = cell.kind_unchecked();
        match (kind, *cell.payload()) {
            (Kind::Unreadable, _) => self.out.push_str("#[unreadable]"),
            (Kind::End, _) => self.out.push_str("#[end]"),
            (Kind::Nulled, _) | (Kind::Void, _) => {}
            (Kind::Blank, _) => self.out.push('_'),
            (Kind::Logic, Payload::Logic(b)) => self.out.push_str(if b { "true" } else { "false" }),
            (Kind::Integer, Payload::Integer(i)) => self.out.push_str(&i.to_string()),
            (Kind::Decimal, Payload::Decimal(d)) => self.decimal(d.into_inner()),
            (Kind::Percent, Payload::Decimal(d)) => {
                self.out.push_str(&format!("{}%", d.into_inner() * 100.0))
            }
            (Kind::Money, Payload::Decimal(d)) => {
                self.out.push_str(&format!("${:.2}", d.into_inner()))
            }
            (Kind::Char, Payload::Char(c)) => {
                if mold {
                    self.out.push_str(&format!("#\"{c}\""));
                } else {
                    self.out.push(c);
                }
            }
            (Kind::Tuple, Payload::Tuple { len, data }) => {
                self.out.push_str(&data[..len as usize].iter().join("."))
            }
            (Kind::Time, Payload::Integer(nanos)) => {
                let secs = nanos / 1_000_000_000;
                self.out.push_str(&format!(
                    "{}:{:02}:{:02}",
                    secs / 3600,
                    (secs / 60) % 60,
                    secs % 60
                ));
            }
            (Kind::Date, Payload::Integer(days)) => {
                self.out.push_str(&format!("#[date! {days}]"))
            }
            (Kind::Datatype, Payload::Datatype { kind, .. }) => {
                self.out.push_str(&kind.to_string())
            }
            (Kind::Typeset, Payload::Typeset(ts)) => {
                let kinds = ALL_KINDS
                    .iter()
                    .filter(|k| ts.contains(**k) && !k.is_internal())
                    .join(" ");
                self.out.push_str(&format!("make typeset! [{kinds}]"));
            }
            (Kind::Pair, Payload::Node(node)) => {
                let heap = self.heap;
                let parts = heap.try_get(node).map_or(&[][..], |s| s.cells());
                for (i, part) in parts.iter().take(2).enumerate() {
                    if i > 0 {
                        self.out.push('x');
                    }
                    self.value(part, mold);
                }
            }
            (Kind::Binary, _) | (Kind::Bitset, _) => {
                let heap = self.heap;
                let bytes = cell
                    .series_node()
                    .or_else(|| cell.payload().first_node())
                    .and_then(|n| heap.try_get(n))
                    .map_or(&[][..], |s| s.bytes());
                let start = if kind == Kind::Binary {
                    cell.index().min(bytes.len())
                } else {
                    0
                };
                let hex = bytes[start..].iter().map(|b| format!("{b:02X}")).join("");
                if kind == Kind::Bitset {
                    self.out.push_str(&format!("make bitset! #{{{hex}}}"));
                } else {
                    self.out.push_str(&format!("#{{{hex}}}"));
                }
            }
            (Kind::Text, _) => {
                let s = self.series_text(cell);
                if mold {
                    self.text(s);
                } else {
                    self.out.push_str(s);
                }
            }
            (Kind::File, _) => {
                if mold {
                    self.out.push('%');
                }
                let s = self.series_text(cell);
                self.out.push_str(s);
            }
            (Kind::Email, _) | (Kind::Url, _) => {
                let s = self.series_text(cell);
                self.out.push_str(s);
            }
            (Kind::Tag, _) => {
                let s = self.series_text(cell);
                self.out.push('<');
                self.out.push_str(s);
                self.out.push('>');
            }
            (Kind::Issue, _) => {
                self.out.push('#');
                let s = self.spelling(cell);
                self.out.push_str(s);
            }
            (Kind::Word, _) => {
                let s = self.spelling(cell);
                self.out.push_str(s);
            }
            (Kind::SetWord, _) => {
                let s = self.spelling(cell);
                self.out.push_str(s);
                self.out.push(':');
            }
            (Kind::GetWord, _) => {
                let s = self.spelling(cell);
                self.out.push(':');
                self.out.push_str(s);
            }
            (Kind::Block, _) => {
                if mold {
                    self.array(cell, "[", "]", true)
                } else {
                    self.array(cell, "", "", false)
                }
            }
            (Kind::SetBlock, _) => self.array(cell, "[", "]:", true),
            (Kind::GetBlock, _) => self.array(cell, ":[", "]", true),
            (Kind::Group, _) => self.array(cell, "(", ")", true),
            (Kind::SetGroup, _) => self.array(cell, "(", "):", true),
            (Kind::GetGroup, _) => self.array(cell, ":(", ")", true),
            (Kind::Path, _) => self.path(cell),
            (Kind::SetPath, _) => {
                self.path(cell);
                self.out.push(':');
            }
            (Kind::GetPath, _) => {
                self.out.push(':');
                self.path(cell);
            }
            (Kind::Object, _) | (Kind::Module, _) | (Kind::Error, _) | (Kind::Port, _) => {
                self.context(cell, mold)
            }
            (Kind::Quoted, Payload::Quoted { node, depth }) => {
                for _ in 0..depth {
                    self.out.push('\'');
                }
                let heap = self.heap;
                if let Some(inner) = heap.try_get(node).and_then(|s| s.cells().first()) {
                    self.value(inner, true);
                }
            }
            (k, _) if k.is_param() => {
                let s = self.spelling(cell);
                self.out.push_str(s);
            }
            (k, _) => {
                let name = k.to_string();
                self.out.push_str(&format!("#[{}]", name.trim_end_matches('!')));
            }
        }
    }
}

/// Human-readable text of a value
pub fn form_value(heap: &Heap, cell: &Cell) -> String {
    let mut m = Molder::new(heap);
    m.value(cell, false);
    m.out
}

/// Source text of a value
pub fn mold_value(heap: &Heap, cell: &Cell) -> String {
    let mut m = Molder::new(heap);
    m.value(cell, true);
    m.out
}

/// Flatten values into bytes.
///
/// Integers become single bytes, binaries and strings contribute their
/// encoded bytes, characters their UTF-8 encoding, anything else its
/// formed text.
pub fn join_binary(heap: &Heap, cells: &[Cell]) -> CoreResult<Vec<u8>> {
    let mut out = vec![];
    for cell in cells {
        match cell.kind() {
            Kind::Integer => {
                let i = cell.as_integer().unwrap_or_default();
                let byte = u8::try_from(i).map_err(|_| CoreError::OutOfRange(i))?;
                out.push(byte);
            }
            Kind::Char => {
                if let Some(c) = cell.as_char() {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
            Kind::Binary => {
                if let Some(series) = cell.series_node().and_then(|n| heap.try_get(n)) {
                    let bytes = series.bytes();
                    out.extend_from_slice(&bytes[cell.index().min(bytes.len())..]);
                }
            }
            k if k.is_any_string() => {
                let m = Molder::new(heap);
                out.extend_from_slice(m.series_text(cell).as_bytes());
            }
            _ => out.extend_from_slice(form_value(heap, cell).as_bytes()),
        }
    }
    Ok(out)
}
