//! Cell kinds and kind classes
//!
//! Every cell carries one of these discriminants. The discriminant
//! also decides whether the payload holds a node reference, which the
//! collector trusts without re-deriving; see [`NodeUse`].

use std::fmt;

/// Kind of a cell.
///
/// Discriminants stay below 64 so that a [`Typeset`] can hold any
/// combination of them in a single `u64`.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// Never legal in a cell; reported by the checker if found
    End = 0,
    Nulled,
    Void,
    Blank,
    Logic,
    Integer,
    Decimal,
    Percent,
    Money,
    Char,
    Pair,
    Tuple,
    Time,
    Date,
    Datatype,
    Typeset,
    Bitset,
    Map,
    Handle,

    // custom extension kinds
    Gob,
    Event,
    Struct,
    Image,
    Vector,

    // series
    Binary,
    Text,
    File,
    Email,
    Url,
    Tag,

    // bindable from here
    Issue,
    Word,
    SetWord,
    GetWord,
    Object,
    Module,
    Error,
    Frame,
    Port,
    Varargs,
    Block,
    SetBlock,
    GetBlock,
    Group,
    SetGroup,
    GetGroup,
    Path,
    SetPath,
    GetPath,
    Action,
    Quoted,

    // internal kinds, never user-visible
    ParamNormal,
    ParamHardQuote,
    ParamSoftQuote,
    ParamRefinement,
    ParamLocal,
    ParamReturn,
    /// Packed floats stored in a gob's backing array
    GobXyf,
    /// Element description stored beside a vector's bytes
    VectorSign,
    /// Reserved slot awaiting a later fill-in
    Unreadable,
}

/// Whether a kind's payload carries a node reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeUse {
    /// Inline data only
    Never,
    /// Always references exactly one node in the first payload slot
    Always,
    /// May reference a node (e.g. a datatype with no spec)
    Optional,
}

pub const ALL_KINDS: &[Kind] = &[
    Kind::End,
    Kind::Nulled,
    Kind::Void,
    Kind::Blank,
    Kind::Logic,
    Kind::Integer,
    Kind::Decimal,
    Kind::Percent,
    Kind::Money,
    Kind::Char,
    Kind::Pair,
    Kind::Tuple,
    Kind::Time,
    Kind::Date,
    Kind::Datatype,
    Kind::Typeset,
    Kind::Bitset,
    Kind::Map,
    Kind::Handle,
    Kind::Gob,
    Kind::Event,
    Kind::Struct,
    Kind::Image,
    Kind::Vector,
    Kind::Binary,
    Kind::Text,
    Kind::File,
    Kind::Email,
    Kind::Url,
    Kind::Tag,
    Kind::Issue,
    Kind::Word,
    Kind::SetWord,
    Kind::GetWord,
    Kind::Object,
    Kind::Module,
    Kind::Error,
    Kind::Frame,
    Kind::Port,
    Kind::Varargs,
    Kind::Block,
    Kind::SetBlock,
    Kind::GetBlock,
    Kind::Group,
    Kind::SetGroup,
    Kind::GetGroup,
    Kind::Path,
    Kind::SetPath,
    Kind::GetPath,
    Kind::Action,
    Kind::Quoted,
    Kind::ParamNormal,
    Kind::ParamHardQuote,
    Kind::ParamSoftQuote,
    Kind::ParamRefinement,
    Kind::ParamLocal,
    Kind::ParamReturn,
    Kind::GobXyf,
    Kind::VectorSign,
    Kind::Unreadable,
];

impl Kind {
    pub fn is_any_array(self) -> bool {
        matches!(
            self,
            Kind::Block
                | Kind::SetBlock
                | Kind::GetBlock
                | Kind::Group
                | Kind::SetGroup
                | Kind::GetGroup
                | Kind::Path
                | Kind::SetPath
                | Kind::GetPath
        )
    }

    pub fn is_any_path(self) -> bool {
        matches!(self, Kind::Path | Kind::SetPath | Kind::GetPath)
    }

    /// Arrays whose contents the key collector descends into
    pub fn is_any_eval_block(self) -> bool {
        matches!(
            self,
            Kind::Block | Kind::SetBlock | Kind::GetBlock | Kind::Group | Kind::SetGroup | Kind::GetGroup
        )
    }

    /// String-like kinds (the binary kind is not one)
    pub fn is_any_string(self) -> bool {
        matches!(
            self,
            Kind::Text | Kind::File | Kind::Email | Kind::Url | Kind::Tag
        )
    }

    /// Kinds whose payload is a (node, index) series reference
    pub fn is_series(self) -> bool {
        self.is_any_array() || self.is_any_string() || self == Kind::Binary
    }

    pub fn is_any_word(self) -> bool {
        matches!(
            self,
            Kind::Word | Kind::SetWord | Kind::GetWord | Kind::Issue
        )
    }

    pub fn is_any_context(self) -> bool {
        matches!(
            self,
            Kind::Object | Kind::Module | Kind::Error | Kind::Frame | Kind::Port
        )
    }

    pub fn is_param(self) -> bool {
        matches!(
            self,
            Kind::ParamNormal
                | Kind::ParamHardQuote
                | Kind::ParamSoftQuote
                | Kind::ParamRefinement
                | Kind::ParamLocal
                | Kind::ParamReturn
        )
    }

    pub fn is_custom(self) -> bool {
        matches!(
            self,
            Kind::Gob | Kind::Event | Kind::Struct | Kind::Image | Kind::Vector
        )
    }

    /// Kinds that keep a binding in the cell's extra slot
    pub fn is_bindable(self) -> bool {
        self.is_any_word()
            || self.is_any_array()
            || self.is_any_context()
            || matches!(self, Kind::Varargs | Kind::Action | Kind::Quoted)
    }

    /// Internal kinds may live in arrays the core builds but never
    /// escape to user code.
    pub fn is_internal(self) -> bool {
        self.is_param()
            || matches!(
                self,
                Kind::End | Kind::GobXyf | Kind::VectorSign | Kind::Unreadable
            )
    }

    /// Kinds whose node the deep-clone pass copies
    pub fn is_cloned(self) -> bool {
        self.is_series()
    }

    /// How this kind uses the first payload slot
    pub fn node_use(self) -> NodeUse {
        match self {
            Kind::Datatype | Kind::Handle | Kind::Event => NodeUse::Optional,
            Kind::Pair
            | Kind::Bitset
            | Kind::Map
            | Kind::Gob
            | Kind::Struct
            | Kind::Image
            | Kind::Vector
            | Kind::Action
            | Kind::Quoted => NodeUse::Always,
            k if k.is_series() || k.is_any_word() || k.is_any_context() || k.is_param() => {
                NodeUse::Always
            }
            _ => NodeUse::Never,
        }
    }

    pub fn from_u8(byte: u8) -> Option<Kind> {
        ALL_KINDS.get(byte as usize).copied()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}");
        let mut out = String::with_capacity(name.len() + 4);
        for (i, c) in name.chars().enumerate() {
            if c.is_uppercase() && i > 0 {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        }
        write!(f, "{out}!")
    }
}

/// A set of kinds, one bit per discriminant
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct Typeset(u64);

impl Typeset {
    /// Every kind
    pub const ALL: Typeset = Typeset(u64::MAX);

    /// No kind at all
    pub const EMPTY: Typeset = Typeset(0);

    pub fn of(kinds: &[Kind]) -> Self {
        kinds.iter().fold(Typeset::EMPTY, |ts, k| ts.with(*k))
    }

    /// Everything but the void kind (initial typeset of collected keys)
    pub fn all_but_void() -> Self {
        Typeset::ALL.without(Kind::Void)
    }

    pub fn with(self, kind: Kind) -> Self {
        Typeset(self.0 | (1 << kind as u8))
    }

    pub fn without(self, kind: Kind) -> Self {
        Typeset(self.0 & !(1 << kind as u8))
    }

    pub fn contains(&self, kind: Kind) -> bool {
        self.0 & (1 << kind as u8) != 0
    }

    pub fn bits(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_kinds_fit_in_typeset() {
        for (i, k) in ALL_KINDS.iter().enumerate() {
            assert_eq!(*k as usize, i);
            assert!((*k as u8) < 64);
        }
        assert_eq!(Kind::from_u8(Kind::Block as u8), Some(Kind::Block));
        assert_eq!(Kind::from_u8(200), None);
    }

    #[test]
    pub fn test_classes() {
        assert!(Kind::Text.is_any_string());
        assert!(!Kind::Binary.is_any_string());
        assert!(Kind::Binary.is_series());
        assert!(Kind::Issue.is_any_word());
        assert!(Kind::GetPath.is_any_array());
        assert!(!Kind::GetPath.is_any_eval_block());
        assert!(Kind::Frame.is_bindable());
        assert!(!Kind::Integer.is_bindable());
        assert_eq!(Kind::Integer.node_use(), NodeUse::Never);
        assert_eq!(Kind::Text.node_use(), NodeUse::Always);
        assert_eq!(Kind::Datatype.node_use(), NodeUse::Optional);
    }

    #[test]
    pub fn test_typeset() {
        let ts = Typeset::of(&[Kind::Integer, Kind::Text]);
        assert!(ts.contains(Kind::Integer));
        assert!(!ts.contains(Kind::Block));
        assert!(!Typeset::all_but_void().contains(Kind::Void));
        assert!(Typeset::all_but_void().contains(Kind::Blank));
    }

    #[test]
    pub fn test_display() {
        assert_eq!(Kind::SetWord.to_string(), "set-word!");
        assert_eq!(Kind::Block.to_string(), "block!");
    }
}
