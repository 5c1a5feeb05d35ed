//! The sentence expression AST produced by the template parser.

/// How the items of a [`Sequence`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SequenceKind {
    /// Items are matched one after another.
    Sequence,
    /// Exactly one item is matched.
    Alternative,
    /// The whole group may be skipped.
    Optional,
}

/// A terminal word.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    /// The text matched against the input utterance.
    pub text: String,
    /// Output replacement. `Some(String::new())` drops the word from the
    /// output text entirely.
    pub substitution: Option<String>,
    /// Converter names applied to the word's output value, leftmost first.
    pub converters: Vec<String>,
}

impl Word {
    /// A plain word with no substitution and no converters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            substitution: None,
            converters: Vec::new(),
        }
    }
}

/// A group of expressions combined according to [`SequenceKind`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    /// The grouped expressions. For [`SequenceKind::Alternative`] and
    /// [`SequenceKind::Optional`] every item is one branch.
    pub items: Vec<Expression>,
    /// How the items combine.
    pub kind: SequenceKind,
    /// Weight of this group relative to its sibling branches when it is a
    /// branch of an alternatives group. Branches without an explicit weight
    /// get 1.0; weights are normalized at compile time.
    pub weight: f64,
    /// Output replacement for the whole group. When set, the inner items
    /// keep their input labels but emit nothing, and these words are
    /// emitted instead.
    pub substitution: Option<Vec<Word>>,
    /// Converter names applied to the group's output value, leftmost first.
    pub converters: Vec<String>,
}

impl Sequence {
    /// A plain sequence of items with default weight.
    pub fn sequence(items: Vec<Expression>) -> Self {
        Self::with_kind(SequenceKind::Sequence, items)
    }

    /// An alternatives group; each item is one branch.
    pub fn alternative(items: Vec<Expression>) -> Self {
        Self::with_kind(SequenceKind::Alternative, items)
    }

    /// An optional group; the items may be skipped entirely.
    pub fn optional(items: Vec<Expression>) -> Self {
        Self::with_kind(SequenceKind::Optional, items)
    }

    fn with_kind(kind: SequenceKind, items: Vec<Expression>) -> Self {
        Self {
            items,
            kind,
            weight: 1.0,
            substitution: None,
            converters: Vec::new(),
        }
    }
}

/// A named entity boundary around an inner expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// The entity name reported in recognitions.
    pub name: String,
    /// The tagged expression.
    pub inner: Box<Expression>,
    /// Output replacement for the tagged value, like a group substitution.
    pub substitution: Option<Vec<Word>>,
    /// Converter names applied to the entity value, leftmost first.
    pub converters: Vec<String>,
}

/// An inclusive range of integers accepted as spoken digit strings,
/// e.g. `1..10` or `0..100,20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberRange {
    /// First accepted value.
    pub start: i64,
    /// Last accepted value (inclusive).
    pub end: i64,
    /// Distance between accepted values; at least 1.
    pub step: i64,
}

/// A node of the sentence template AST.
///
/// After [`expand`](crate::expand::expand) runs, no [`Expression::RuleRef`],
/// [`Expression::SlotRef`] or [`Expression::NumberRange`] nodes remain.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A terminal word.
    Word(Word),
    /// A group of expressions.
    Sequence(Sequence),
    /// An entity boundary.
    Tag(Tag),
    /// A reference to a named rule, optionally dotted (`Intent.rule`).
    RuleRef(String),
    /// A reference to a caller-provided slot (`$name`).
    SlotRef(String),
    /// A numeric range shorthand.
    NumberRange(NumberRange),
}
