//! The intent graph: a directed weighted graph encoding every accepted
//! sentence, and the compiler that builds it from an expanded [`Grammar`].
//!
//! Nodes live in an arena indexed by [`NodeId`]; every node owns a flat
//! list of outgoing [`Edge`]s. Edge labels are interned strings; `None`
//! stands for the empty symbol ε. Entity boundaries and converter scopes
//! are materialized as marker output labels that are never consumed from
//! the input and never emitted as output text.

use std::fmt;

use string_interner::backend::StringBackend;
use string_interner::symbol::SymbolU32;
use string_interner::StringInterner;

use crate::ast::{Expression, Sequence, SequenceKind, Tag, Word};
use crate::grammar::Grammar;

/// An interned edge label.
pub type Label = SymbolU32;

pub(crate) const BEGIN_PREFIX: &str = "__begin__";
pub(crate) const END_PREFIX: &str = "__end__";
pub(crate) const CONVERT_PREFIX: &str = "__convert__";
pub(crate) const CONVERTED_PREFIX: &str = "__converted__";

/// A marker output label, decoded from its interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Marker<'a> {
    /// Opens the entity with the given name.
    Begin(&'a str),
    /// Closes the entity with the given name.
    End(&'a str),
    /// Opens the scope of the named converter.
    Convert(&'a str),
    /// Closes the scope of the named converter.
    Converted(&'a str),
}

/// Decodes a marker label; `None` for ordinary words.
pub(crate) fn classify_marker(label: &str) -> Option<Marker<'_>> {
    // `__converted__` shares a prefix with `__convert__`; test it first.
    if let Some(name) = label.strip_prefix(CONVERTED_PREFIX) {
        Some(Marker::Converted(name))
    } else if let Some(name) = label.strip_prefix(CONVERT_PREFIX) {
        Some(Marker::Convert(name))
    } else if let Some(name) = label.strip_prefix(BEGIN_PREFIX) {
        Some(Marker::Begin(name))
    } else {
        label.strip_prefix(END_PREFIX).map(Marker::End)
    }
}

/// The identifier of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What role a node plays in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An ordinary node inside a sentence.
    Interior,
    /// The entry node of one intent's sentences; carries the intent name.
    IntentStart(Label),
    /// The accept node of one sentence; carries the intent name.
    SentenceEnd(Label),
}

/// A directed edge.
///
/// `ilabel` is matched against the input utterance, `olabel` is emitted
/// into the recognized text; `None` is the empty symbol ε. Outgoing
/// weights of every node sum to 1.0 after compilation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// The target node.
    pub to: NodeId,
    /// The input label; `None` for ε.
    pub ilabel: Option<Label>,
    /// The output label; `None` for ε.
    pub olabel: Option<Label>,
    /// The normalized transition probability.
    pub weight: f64,
}

/// The error type for graph compilation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The grammar has no intents.
    #[error("the grammar has no intents; there is nothing to compile")]
    EmptyGrammar,
    /// A rule reference survived expansion.
    #[error("sentence still contains rule reference `<{0}>`; run expansion first")]
    UnexpandedRuleReference(String),
    /// A slot reference survived expansion.
    #[error("sentence still contains slot reference `${0}`; run expansion first")]
    UnexpandedSlotReference(String),
    /// A number range survived expansion.
    #[error("sentence still contains number range `{0}..{1}`; run expansion first")]
    UnexpandedNumberRange(i64, i64),
}

/// The compiled intent graph.
///
/// Immutable after compilation and freely shareable across threads.
#[derive(Clone)]
pub struct IntentGraph {
    nodes: Vec<NodeKind>,
    edges: Vec<Vec<Edge>>,
    labels: StringInterner<StringBackend<SymbolU32>>,
    start: NodeId,
    // Sorted by intent name.
    intent_starts: Vec<(String, NodeId)>,
}

/// Compiles an expanded grammar into an [`IntentGraph`].
///
/// # Errors
///
/// Returns a [`CompileError`] when the grammar is empty or still contains
/// rule, slot or range references.
pub fn compile(grammar: &Grammar) -> Result<IntentGraph, CompileError> {
    IntentGraph::compile(grammar)
}

impl IntentGraph {
    /// Compiles an expanded grammar. See [`compile`].
    pub fn compile(grammar: &Grammar) -> Result<Self, CompileError> {
        if grammar.is_empty() {
            return Err(CompileError::EmptyGrammar);
        }
        let mut graph = Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            labels: StringInterner::new(),
            start: NodeId(0),
            intent_starts: Vec::new(),
        };
        graph.start = graph.add_node(NodeKind::Interior);
        for intent in grammar.intent_names() {
            let symbol = graph.labels.get_or_intern(intent);
            let entry = graph.add_node(NodeKind::IntentStart(symbol));
            let start = graph.start;
            graph.add_edge(start, entry, None, Some(symbol), 1.0);
            graph.intent_starts.push((intent.to_string(), entry));
            let definition = grammar.intent(intent).expect("listed intent exists");
            for sentence in definition.sentences() {
                let end = graph.expression(entry, sentence, false)?;
                let accept = graph.add_node(NodeKind::SentenceEnd(symbol));
                graph.add_edge(end, accept, None, None, 1.0);
            }
        }
        graph.normalize_weights();
        Ok(graph)
    }

    // -- construction ------------------------------------------------------

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(kind);
        self.edges.push(Vec::new());
        id
    }

    fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        ilabel: Option<Label>,
        olabel: Option<Label>,
        weight: f64,
    ) {
        // Targets are always created after their sources, which keeps the
        // graph acyclic and node ids topologically ordered.
        debug_assert!(from < to);
        self.edges[from.index()].push(Edge {
            to,
            ilabel,
            olabel,
            weight,
        });
    }

    /// Adds an edge into a fresh interior node and returns it.
    fn add_edge_to_new(
        &mut self,
        from: NodeId,
        ilabel: Option<Label>,
        olabel: Option<Label>,
        weight: f64,
    ) -> NodeId {
        let to = self.add_node(NodeKind::Interior);
        self.add_edge(from, to, ilabel, olabel, weight);
        to
    }

    /// Adds an ε-input edge emitting a marker label.
    fn add_marker(&mut self, from: NodeId, marker: String) -> NodeId {
        let symbol = self.labels.get_or_intern(marker);
        self.add_edge_to_new(from, None, Some(symbol), 1.0)
    }

    fn open_converters(&mut self, mut from: NodeId, converters: &[String]) -> NodeId {
        // The leftmost converter applies first, so it opens innermost.
        for name in converters.iter().rev() {
            from = self.add_marker(from, format!("{CONVERT_PREFIX}{name}"));
        }
        from
    }

    fn close_converters(&mut self, mut from: NodeId, converters: &[String]) -> NodeId {
        for name in converters {
            from = self.add_marker(from, format!("{CONVERTED_PREFIX}{name}"));
        }
        from
    }

    /// Emits output-only edges for substitution words.
    fn emit_words(&mut self, mut from: NodeId, words: &[Word]) -> NodeId {
        for word in words {
            let olabel = Some(self.labels.get_or_intern(&word.text));
            from = self.add_edge_to_new(from, None, olabel, 1.0);
        }
        from
    }

    fn expression(
        &mut self,
        from: NodeId,
        expr: &Expression,
        suppress_output: bool,
    ) -> Result<NodeId, CompileError> {
        match expr {
            Expression::Word(w) => Ok(self.word(from, w, suppress_output)),
            Expression::Sequence(s) => self.sequence(from, s, suppress_output),
            Expression::Tag(t) => self.tag(from, t, suppress_output),
            Expression::RuleRef(name) => {
                Err(CompileError::UnexpandedRuleReference(name.clone()))
            }
            Expression::SlotRef(name) => {
                Err(CompileError::UnexpandedSlotReference(name.clone()))
            }
            Expression::NumberRange(r) => {
                Err(CompileError::UnexpandedNumberRange(r.start, r.end))
            }
        }
    }

    fn word(&mut self, from: NodeId, word: &Word, suppress_output: bool) -> NodeId {
        let converters: &[String] = if suppress_output {
            &[]
        } else {
            &word.converters
        };
        let mut cur = self.open_converters(from, converters);
        let ilabel = Some(self.labels.get_or_intern(&word.text));
        let olabel = if suppress_output {
            None
        } else {
            match &word.substitution {
                None => ilabel,
                Some(out) if out.is_empty() => None,
                Some(out) => Some(self.labels.get_or_intern(out)),
            }
        };
        cur = self.add_edge_to_new(cur, ilabel, olabel, 1.0);
        self.close_converters(cur, converters)
    }

    fn sequence(
        &mut self,
        from: NodeId,
        seq: &Sequence,
        suppress_output: bool,
    ) -> Result<NodeId, CompileError> {
        let converters: &[String] = if suppress_output { &[] } else { &seq.converters };
        let suppress_inner = suppress_output || seq.substitution.is_some();
        let mut cur = self.open_converters(from, converters);
        if !suppress_output {
            if let Some(words) = &seq.substitution {
                cur = self.emit_words(cur, words);
            }
        }
        cur = match seq.kind {
            SequenceKind::Sequence => {
                let mut node = cur;
                for item in &seq.items {
                    node = self.expression(node, item, suppress_inner)?;
                }
                node
            }
            SequenceKind::Alternative => {
                self.alternative(cur, &seq.items, false, suppress_inner)?
            }
            SequenceKind::Optional => self.alternative(cur, &seq.items, true, suppress_inner)?,
        };
        Ok(self.close_converters(cur, converters))
    }

    fn alternative(
        &mut self,
        from: NodeId,
        items: &[Expression],
        optional: bool,
        suppress_output: bool,
    ) -> Result<NodeId, CompileError> {
        if items.is_empty() && !optional {
            // A slot without replacements: a fresh node nothing leads into,
            // so the rest of the sentence is unreachable.
            return Ok(self.add_node(NodeKind::Interior));
        }
        let mut weights: Vec<f64> = items.iter().map(branch_weight).collect();
        if weights.iter().sum::<f64>() <= 0.0 {
            weights = vec![1.0; weights.len()];
        }
        let taken: f64 = weights.iter().sum();
        // The skip branch of an optional gets the same mass as all taken
        // branches together.
        let skipped = if optional { taken.max(1.0) } else { 0.0 };
        let total = taken + skipped;

        let mut ends = Vec::with_capacity(items.len() + 1);
        for (item, weight) in items.iter().zip(&weights) {
            let entry = self.add_edge_to_new(from, None, None, weight / total);
            ends.push(self.expression(entry, item, suppress_output)?);
        }
        if optional {
            ends.push(self.add_edge_to_new(from, None, None, skipped / total));
        }
        let to = self.add_node(NodeKind::Interior);
        for end in ends {
            self.add_edge(end, to, None, None, 1.0);
        }
        Ok(to)
    }

    fn tag(
        &mut self,
        from: NodeId,
        tag: &Tag,
        suppress_output: bool,
    ) -> Result<NodeId, CompileError> {
        let mut cur = self.add_marker(from, format!("{BEGIN_PREFIX}{}", tag.name));
        let converters: &[String] = if suppress_output { &[] } else { &tag.converters };
        let suppress_inner = suppress_output || tag.substitution.is_some();
        cur = self.open_converters(cur, converters);
        if !suppress_output {
            if let Some(words) = &tag.substitution {
                cur = self.emit_words(cur, words);
            }
        }
        cur = self.expression(cur, &tag.inner, suppress_inner)?;
        cur = self.close_converters(cur, converters);
        Ok(self.add_marker(cur, format!("{END_PREFIX}{}", tag.name)))
    }

    fn normalize_weights(&mut self) {
        for outgoing in &mut self.edges {
            let sum: f64 = outgoing.iter().map(|e| e.weight).sum();
            if sum > 0.0 {
                for edge in outgoing {
                    edge.weight /= sum;
                }
            }
        }
    }

    // -- access ------------------------------------------------------------

    /// The global start node.
    #[inline]
    pub fn start(&self) -> NodeId {
        self.start
    }

    /// The number of nodes in the arena.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The role of a node.
    ///
    /// # Panics
    ///
    /// Panics if the node id is out of bounds.
    #[inline]
    pub fn kind(&self, node: NodeId) -> NodeKind {
        self.nodes[node.index()]
    }

    /// The outgoing edges of a node.
    ///
    /// # Panics
    ///
    /// Panics if the node id is out of bounds.
    #[inline]
    pub fn outgoing(&self, node: NodeId) -> &[Edge] {
        &self.edges[node.index()]
    }

    /// Resolves an interned label back to its string.
    #[inline]
    pub fn resolve(&self, label: Label) -> &str {
        self.labels.resolve(label).unwrap()
    }

    /// `(intent name, entry node)` pairs in sorted name order.
    #[inline]
    pub fn intent_starts(&self) -> &[(String, NodeId)] {
        &self.intent_starts
    }

    /// Intent names in sorted order.
    pub fn intent_names(&self) -> Vec<&str> {
        self.intent_starts
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

fn branch_weight(expr: &Expression) -> f64 {
    match expr {
        Expression::Sequence(s) => s.weight.max(0.0),
        _ => 1.0,
    }
}

impl fmt::Debug for IntentGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolve = |label: Option<Label>| match label {
            Some(symbol) => self.resolve(symbol),
            None => "<eps>",
        };
        writeln!(f, "IntentGraph {{")?;
        for (id, kind) in self.nodes.iter().enumerate() {
            let node = NodeId(id as u32);
            match kind {
                NodeKind::Interior => {}
                NodeKind::IntentStart(s) => {
                    writeln!(f, "  node {id}: intent start `{}`", self.resolve(*s))?
                }
                NodeKind::SentenceEnd(s) => {
                    writeln!(f, "  node {id}: sentence end `{}`", self.resolve(*s))?
                }
            }
            for edge in self.outgoing(node) {
                writeln!(
                    f,
                    "  {id} -> {}  {}:{}/{:.4}",
                    edge.to.0,
                    resolve(edge.ilabel),
                    resolve(edge.olabel),
                    edge.weight
                )?;
            }
        }
        write!(f, "}}")
    }
}
