//! Series: the resizable allocation behind every heap node
//!
//! A series holds either an array of cells or a byte buffer. A byte
//! buffer flagged `UTF8` is text; once the flag is set it stays set
//! and every later edit must leave the bytes valid.

use std::{fmt, mem::size_of};

use bitflags::bitflags;

use crate::{
    context::keylist::KeylistRef,
    error::{CoreError, CoreResult},
    value::cell::Cell,
};

use super::heap::NodeId;

bitflags! {
    #[derive(Default)]
    pub struct SeriesFlags: u16 {
        /// Byte content is valid UTF-8 and must stay so
        const UTF8 = 1 << 0;
        /// No mutation permitted
        const IMMUTABLE = 1 << 1;
        /// Formatting: a line break follows the last element
        const NEWLINE_AT_TAIL = 1 << 2;
        /// Array is the value half of a context
        const VARLIST = 1 << 3;
        /// Array is the parameter list of an action
        const PARAMLIST = 1 << 4;
        /// Interned spelling
        const SYMBOL = 1 << 5;
        /// Frame whose call has ended; contents are gone
        const INACCESSIBLE = 1 << 6;
        /// Frame varlist whose variables live in the frame record
        const STACK = 1 << 7;
    }
}

/// Series payload
#[derive(Debug, Clone)]
pub enum Content {
    Array(Vec<Cell>),
    Bytes(Vec<u8>),
}

/// Per-series satellite reference
#[derive(Debug, Clone)]
pub enum Link {
    None,
    /// Varlists and paramlists link their keys
    Keylist(KeylistRef),
    /// Spellings link their canon spelling (themselves if canon)
    Canon(NodeId),
}

/// Cached codepoint index to byte offset pairing for a text series
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Bookmark {
    pub index: usize,
    pub offset: usize,
}

/// Width of the UTF-8 sequence started by `lead`
fn sequence_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

/// True for bytes that continue a multi-byte sequence
pub fn is_continuation(byte: u8) -> bool {
    byte & 0xc0 == 0x80
}

/// Number of bytes in `bytes` that start a codepoint
fn lead_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| !is_continuation(**b)).count()
}

pub struct Series {
    flags: SeriesFlags,
    content: Content,
    link: Link,
    bookmark: Option<Bookmark>,
    /// Lead bytes in a byte buffer, kept current by every byte edit
    leads: usize,
}

impl Series {
    pub fn array(cells: Vec<Cell>) -> Self {
        Series {
            flags: SeriesFlags::empty(),
            content: Content::Array(cells),
            link: Link::None,
            bookmark: None,
            leads: 0,
        }
    }

    pub fn array_with_capacity(capacity: usize) -> Self {
        Series::array(Vec::with_capacity(capacity))
    }

    pub fn binary(bytes: Vec<u8>) -> Self {
        Series {
            flags: SeriesFlags::empty(),
            leads: lead_count(&bytes),
            content: Content::Bytes(bytes),
            link: Link::None,
            bookmark: None,
        }
    }

    pub fn text(s: &str) -> Self {
        let mut series = Series::binary(s.as_bytes().to_vec());
        series.flags.insert(SeriesFlags::UTF8);
        series
    }

    /// Immutable interned spelling
    pub fn spelling(s: &str) -> Self {
        let mut series = Series::text(s);
        series
            .flags
            .insert(SeriesFlags::SYMBOL | SeriesFlags::IMMUTABLE);
        series
    }

    pub fn flags(&self) -> SeriesFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: SeriesFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: SeriesFlags) {
        self.flags.insert(flag);
    }

    pub fn clear_flag(&mut self, flag: SeriesFlags) {
        self.flags.remove(flag);
    }

    pub fn is_array(&self) -> bool {
        matches!(self.content, Content::Array(_))
    }

    pub fn is_utf8(&self) -> bool {
        self.has_flag(SeriesFlags::UTF8)
    }

    /// Bytes per unit
    pub fn wide(&self) -> usize {
        match self.content {
            Content::Array(_) => size_of::<Cell>(),
            Content::Bytes(_) => 1,
        }
    }

    /// Used length in units (cells or bytes)
    pub fn len(&self) -> usize {
        match &self.content {
            Content::Array(v) => v.len(),
            Content::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match &self.content {
            Content::Array(v) => v.capacity(),
            Content::Bytes(v) => v.capacity(),
        }
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Cells of an array series (empty for byte buffers)
    pub fn cells(&self) -> &[Cell] {
        match &self.content {
            Content::Array(v) => v,
            Content::Bytes(_) => &[],
        }
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        match &mut self.content {
            Content::Array(v) => v,
            Content::Bytes(_) => &mut [],
        }
    }

    /// Bytes of a byte-buffer series (empty for arrays)
    pub fn bytes(&self) -> &[u8] {
        match &self.content {
            Content::Array(_) => &[],
            Content::Bytes(v) => v,
        }
    }

    /// Overwrite bytes from `offset`, repeating `chunk` to fill `count`
    /// bytes. The region must already be in use.
    pub fn fill_bytes(&mut self, offset: usize, count: usize, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        if let Content::Bytes(v) = &mut self.content {
            let end = (offset + count).min(v.len());
            let region = &mut v[offset.min(end)..end];
            self.leads -= lead_count(region);
            for (dest, src) in region.iter_mut().zip(chunk.iter().cycle()) {
                *dest = *src;
            }
            self.leads += lead_count(region);
        }
    }

    /// Text content, if this is a UTF-8 series
    pub fn as_str(&self) -> Option<&str> {
        if !self.is_utf8() {
            return None;
        }
        std::str::from_utf8(self.bytes()).ok()
    }

    pub fn push_cell(&mut self, cell: Cell) {
        if let Content::Array(v) = &mut self.content {
            v.push(cell);
        }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }

    pub fn set_link(&mut self, link: Link) {
        self.link = link;
    }

    pub fn bookmark(&self) -> Option<Bookmark> {
        self.bookmark
    }

    pub fn set_bookmark(&mut self, bookmark: Option<Bookmark>) {
        self.bookmark = bookmark;
    }

    /// Fail unless the series may be edited
    pub fn ensure_mutable(&self) -> CoreResult<()> {
        if self.flags.intersects(SeriesFlags::IMMUTABLE | SeriesFlags::INACCESSIBLE) {
            Err(CoreError::LockedTarget)
        } else {
            Ok(())
        }
    }

    /// Freeze the series against further edits
    pub fn lock(&mut self) {
        self.flags.insert(SeriesFlags::IMMUTABLE);
    }

    /// Open a gap of `count` units at `index`.
    ///
    /// Array gaps are filled with unreadable placeholders that the
    /// caller is expected to overwrite; byte gaps are zeroed.
    pub fn expand_at(&mut self, index: usize, count: usize) {
        match &mut self.content {
            Content::Array(v) => {
                let tail = v.split_off(index.min(v.len()));
                v.extend(std::iter::repeat(Cell::unreadable()).take(count));
                v.extend(tail);
            }
            Content::Bytes(v) => {
                let tail = v.split_off(index.min(v.len()));
                v.resize(v.len() + count, 0);
                v.extend(tail);
                self.leads += count;
            }
        }
    }

    /// Grow the used length by `count` units at the tail
    pub fn extend_tail(&mut self, count: usize) {
        let len = self.len();
        self.expand_at(len, count);
    }

    /// Remove up to `count` units starting at `index`
    pub fn remove_units(&mut self, index: usize, count: usize) {
        let len = self.len();
        if index >= len {
            return;
        }
        let end = (index + count).min(len);
        match &mut self.content {
            Content::Array(v) => {
                v.drain(index..end);
            }
            Content::Bytes(v) => {
                self.leads -= lead_count(&v[index..end]);
                v.drain(index..end);
            }
        }
    }

    pub fn truncate(&mut self, len: usize) {
        match &mut self.content {
            Content::Array(v) => v.truncate(len),
            Content::Bytes(v) => {
                if len < v.len() {
                    self.leads -= lead_count(&v[len..]);
                    v.truncate(len);
                }
            }
        }
    }

    /// Reserve room for at least `extra` more units
    pub fn reserve(&mut self, extra: usize) {
        match &mut self.content {
            Content::Array(v) => v.reserve(extra),
            Content::Bytes(v) => v.reserve(extra),
        }
    }

    /// Length in codepoints for text, in units otherwise
    pub fn codepoint_len(&self) -> usize {
        if self.is_utf8() {
            self.leads
        } else {
            self.len()
        }
    }

    /// Byte offset of codepoint `index` in a text series.
    ///
    /// Walks forward from the bookmark when it precedes `index`,
    /// otherwise from the head, and leaves the bookmark at the
    /// result if the series is big enough to be worth caching.
    pub fn offset_for_index(&mut self, index: usize, threshold: usize) -> usize {
        if !self.is_utf8() {
            return index;
        }

        let (mut at, mut offset) = match self.bookmark {
            Some(bm) if bm.index <= index && bm.offset <= self.len() => (bm.index, bm.offset),
            _ => (0, 0),
        };

        let bytes = self.bytes();
        while at < index && offset < bytes.len() {
            offset += sequence_width(bytes[offset]);
            at += 1;
        }
        let offset = offset.min(bytes.len());

        if self.codepoint_len() >= threshold {
            self.bookmark = Some(Bookmark { index: at, offset });
        } else if self.bookmark.take().is_some() {
            log::trace!("bookmark dropped on short text series");
        }
        offset
    }

    /// Codepoint index of byte `offset` in a text series
    ///
    /// Counts from the bookmark when it is close enough to help.
    pub fn index_for_offset(&self, offset: usize) -> usize {
        if !self.is_utf8() {
            return offset;
        }
        let end = offset.min(self.len());
        let bytes = self.bytes();
        match self.bookmark.filter(|bm| bm.offset <= bytes.len()) {
            Some(bm) if bm.offset <= end => bm.index + lead_count(&bytes[bm.offset..end]),
            Some(bm) if bm.offset - end < end => bm.index - lead_count(&bytes[end..bm.offset]),
            _ => lead_count(&bytes[..end]),
        }
    }

    /// View a byte buffer as text from now on.
    ///
    /// Fails with an encoding error if the bytes are not UTF-8; on
    /// success the series can no longer hold arbitrary bytes.
    pub fn alias_binary_as_text(&mut self) -> CoreResult<()> {
        if self.is_array() {
            return Err(CoreError::BadTarget(crate::value::kind::Kind::Block));
        }
        if !self.is_utf8() {
            std::str::from_utf8(self.bytes()).map_err(|_| CoreError::Encoding)?;
            self.leads = lead_count(self.bytes());
            self.flags.insert(SeriesFlags::UTF8);
        }
        Ok(())
    }
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Content::Array(v) => write!(f, "[array len={} flags={:?}]", v.len(), self.flags),
            Content::Bytes(v) => match self.as_str() {
                Some(s) => write!(f, "{:?} flags={:?}", s, self.flags),
                None => write!(f, "#{{{} bytes}} flags={:?}", v.len(), self.flags),
            },
        }
    }
}
