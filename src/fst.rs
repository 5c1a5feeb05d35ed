//! Serialization of an [`IntentGraph`] as an OpenFST text transducer.
//!
//! This is the handoff point to external ARPA/FST tooling. Arc lines are
//! `src dst ilabel olabel weight` over integer symbol ids, final-state
//! lines are `state weight`, and the two symbol tables map label strings
//! to their ids with `<eps>` fixed at 0. Weights are negated natural
//! logarithms of the edge probabilities (the tropical semiring).

use std::fmt::Write as _;

use ahash::AHashMap;

use crate::graph::{IntentGraph, Label, NodeId, NodeKind};

/// An intent graph in OpenFST text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstText {
    /// Arc and final-state lines.
    pub fst: String,
    /// The input symbol table, one `symbol id` line per symbol.
    pub input_symbols: String,
    /// The output symbol table, one `symbol id` line per symbol.
    pub output_symbols: String,
}

#[derive(Default)]
struct SymbolTable {
    ids: AHashMap<String, usize>,
    order: Vec<String>,
}

impl SymbolTable {
    fn new() -> Self {
        let mut table = Self::default();
        table.id_of("<eps>");
        table
    }

    fn id_of(&mut self, symbol: &str) -> usize {
        match self.ids.get(symbol) {
            Some(&id) => id,
            None => {
                let id = self.order.len();
                self.ids.insert(symbol.to_string(), id);
                self.order.push(symbol.to_string());
                id
            }
        }
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (id, symbol) in self.order.iter().enumerate() {
            let _ = writeln!(out, "{symbol} {id}");
        }
        out
    }
}

/// Serializes the graph in OpenFST text conventions.
pub fn graph_to_fst(graph: &IntentGraph) -> FstText {
    let mut input_symbols = SymbolTable::new();
    let mut output_symbols = SymbolTable::new();
    let mut fst = String::new();

    let resolve = |label: Option<Label>| label.map(|symbol| graph.resolve(symbol));
    for id in 0..graph.node_count() {
        let node = NodeId(id as u32);
        for edge in graph.outgoing(node) {
            let ilabel = input_symbols.id_of(resolve(edge.ilabel).unwrap_or("<eps>"));
            let olabel = output_symbols.id_of(resolve(edge.olabel).unwrap_or("<eps>"));
            let weight = -edge.weight.max(f64::MIN_POSITIVE).ln();
            let _ = writeln!(fst, "{id} {} {ilabel} {olabel} {weight:.6}", edge.to.0);
        }
    }
    for id in 0..graph.node_count() {
        if let NodeKind::SentenceEnd(_) = graph.kind(NodeId(id as u32)) {
            let _ = writeln!(fst, "{id} 0");
        }
    }

    FstText {
        fst,
        input_symbols: input_symbols.render(),
        output_symbols: output_symbols.render(),
    }
}
