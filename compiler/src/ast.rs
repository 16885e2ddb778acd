//! The abstract syntax tree of a parsed pattern. Nodes are immutable once
//! parsed and are consumed by the NFA builder.

use std::ops::RangeInclusive;

/// The root of a pattern: one or more alternative expressions, optionally
/// anchored to the start of the input with a leading `^`.
#[derive(Debug, Clone, PartialEq)]
pub struct Root {
    pub expressions: Vec<Expression>,
    pub at_start: bool,
}

impl Root {
    pub fn new(expressions: Vec<Expression>, at_start: bool) -> Self {
        Self {
            expressions,
            at_start,
        }
    }
}

// Expression

/// A sequence of items that must match one after another.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Expression(pub Vec<Item>);

impl Expression {
    pub fn items(&self) -> &[Item] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Group(Group),
    CaptureGroup(CaptureGroup),
    Match(Match),
    Anchor(Anchor),
}

impl From<Group> for Item {
    fn from(src: Group) -> Self {
        Self::Group(src)
    }
}

impl From<CaptureGroup> for Item {
    fn from(src: CaptureGroup) -> Self {
        Self::CaptureGroup(src)
    }
}

impl From<Match> for Item {
    fn from(src: Match) -> Self {
        Self::Match(src)
    }
}

impl From<Anchor> for Item {
    fn from(src: Anchor) -> Self {
        Self::Anchor(src)
    }
}

// Groups

/// A non-capturing group, `(?:...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub expressions: Vec<Expression>,
    pub quantifier: Quantifier,
}

impl Group {
    pub fn new(expressions: Vec<Expression>, quantifier: Quantifier) -> Self {
        Self {
            expressions,
            quantifier,
        }
    }
}

/// A capturing group, `(...)` or `(?<name>...)`. Unnamed groups are
/// assigned a name when lowered.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureGroup {
    pub expressions: Vec<Expression>,
    pub quantifier: Quantifier,
    pub name: Option<String>,
}

impl CaptureGroup {
    pub fn new(expressions: Vec<Expression>, quantifier: Quantifier, name: Option<String>) -> Self {
        Self {
            expressions,
            quantifier,
            name,
        }
    }
}

// Matchers

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub item: MatchItem,
    pub quantifier: Quantifier,
}

impl Match {
    pub fn new(item: MatchItem, quantifier: Quantifier) -> Self {
        Self { item, quantifier }
    }

    /// A match of a single item exactly once.
    pub fn once(item: impl Into<MatchItem>) -> Self {
        Self::new(item.into(), Quantifier::Once)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchItem {
    CharacterGroup(CharacterGroup),
    CharacterClass(CharacterClass),
    CharacterType(CharacterType),
    Character(Char),
    Period,
    PositiveLookahead(Vec<char>),
    NegativeLookahead(Vec<char>),
}

impl From<CharacterGroup> for MatchItem {
    fn from(src: CharacterGroup) -> Self {
        Self::CharacterGroup(src)
    }
}

impl From<CharacterClass> for MatchItem {
    fn from(src: CharacterClass) -> Self {
        Self::CharacterClass(src)
    }
}

impl From<CharacterType> for MatchItem {
    fn from(src: CharacterType) -> Self {
        Self::CharacterType(src)
    }
}

impl From<Char> for MatchItem {
    fn from(src: Char) -> Self {
        Self::Character(src)
    }
}

// Character Groups

/// A bracketed set of characters and ranges, `[...]`, inverted by a leading
/// `^`.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterGroup {
    pub items: Vec<CharacterGroupItem>,
    pub invert: bool,
}

impl CharacterGroup {
    pub fn new(items: Vec<CharacterGroupItem>, invert: bool) -> Self {
        Self { items, invert }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CharacterGroupItem {
    Character(Char),
    Range(CharacterRange),
}

impl From<Char> for CharacterGroupItem {
    fn from(src: Char) -> Self {
        Self::Character(src)
    }
}

impl From<CharacterRange> for CharacterGroupItem {
    fn from(src: CharacterRange) -> Self {
        Self::Range(src)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterRange {
    pub left: char,
    pub right: char,
}

impl CharacterRange {
    pub fn new(left: Char, right: Char) -> Self {
        Self {
            left: left.as_char(),
            right: right.as_char(),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = char> {
        self.left..=self.right
    }
}

// Character Classes

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterClass {
    /// `\w`
    Word,
    /// `\W`
    NonWord,
    /// `\d`
    Digit,
    /// `\D`
    NonDigit,
    /// `\h`
    Hex,
    /// `\H`
    NonHex,
    /// `\s`
    Space,
    /// `\S`
    NonSpace,
}

/// A POSIX bracket type, `[[:name:]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CharacterType {
    Alnum,
    Alpha,
    Lower,
    Upper,
}

impl CharacterType {
    pub fn ranges(self) -> &'static [RangeInclusive<char>] {
        const ALNUM: [RangeInclusive<char>; 3] = ['a'..='z', 'A'..='Z', '0'..='9'];
        const ALPHA: [RangeInclusive<char>; 2] = ['a'..='z', 'A'..='Z'];
        const LOWER: [RangeInclusive<char>; 1] = ['a'..='z'];
        const UPPER: [RangeInclusive<char>; 1] = ['A'..='Z'];

        match self {
            CharacterType::Alnum => &ALNUM,
            CharacterType::Alpha => &ALPHA,
            CharacterType::Lower => &LOWER,
            CharacterType::Upper => &UPPER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CharacterType::Alnum => "alnum",
            CharacterType::Alpha => "alpha",
            CharacterType::Lower => "lower",
            CharacterType::Upper => "upper",
        }
    }

    pub fn contains(self, c: char) -> bool {
        self.ranges().iter().any(|range| range.contains(&c))
    }
}

// Anchors

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `\A`
    StartOfString,
    /// `\z`
    EndOfString,
    /// `$`
    EndOfLine,
}

// Quantifiers

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Once,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
    /// `?`
    Optional,
    /// `{n}`
    Exact(usize),
    /// `{n,}`
    AtLeast(usize),
    /// `{n,m}`
    Range(usize, usize),
}

// Terminals

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Char(pub char);

impl Char {
    pub fn as_char(&self) -> char {
        self.0
    }
}
