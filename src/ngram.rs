//! N-gram counting over the accepted sentences of an [`IntentGraph`].
//!
//! Used to feed external language-model tooling; counts are taken over
//! input labels, i.e. the words as the user would speak them.

use ahash::AHashMap;

use crate::graph::{IntentGraph, NodeId, NodeKind};

/// Per-intent n-gram counts over every accepted token sequence.
///
/// Each accepted sentence contributes one count per window of `order`
/// consecutive tokens. `pad_start` and `pad_end` are prepended and
/// appended to every sentence when given, the usual symbols being `<s>`
/// and `</s>`.
///
/// An `order` of zero yields empty tables.
pub fn ngram_counts(
    graph: &IntentGraph,
    order: usize,
    pad_start: Option<&str>,
    pad_end: Option<&str>,
) -> AHashMap<String, AHashMap<Vec<String>, usize>> {
    let mut counts = AHashMap::new();
    for (intent, entry) in graph.intent_starts() {
        let mut table = AHashMap::new();
        if order > 0 {
            let mut path: Vec<String> = pad_start.map(str::to_string).into_iter().collect();
            count_paths(graph, *entry, &mut path, pad_end, order, &mut table);
        }
        counts.insert(intent.clone(), table);
    }
    counts
}

fn count_paths(
    graph: &IntentGraph,
    node: NodeId,
    path: &mut Vec<String>,
    pad_end: Option<&str>,
    order: usize,
    table: &mut AHashMap<Vec<String>, usize>,
) {
    if let NodeKind::SentenceEnd(_) = graph.kind(node) {
        let mut sentence = path.clone();
        if let Some(pad) = pad_end {
            sentence.push(pad.to_string());
        }
        for window in sentence.windows(order) {
            *table.entry(window.to_vec()).or_insert(0) += 1;
        }
        return;
    }
    for edge in graph.outgoing(node) {
        match edge.ilabel {
            None => count_paths(graph, edge.to, path, pad_end, order, table),
            Some(ilabel) => {
                path.push(graph.resolve(ilabel).to_string());
                count_paths(graph, edge.to, path, pad_end, order, table);
                path.pop();
            }
        }
    }
}
