//! The recognizer: strict and fuzzy matching of token sequences against a
//! compiled [`IntentGraph`].
//!
//! The strict matcher is a layered breadth-first search that consumes the
//! utterance exactly, with an optional second pass that may skip stop
//! words. The fuzzy matcher is a best-first search over a cost schedule
//! that tolerates skipped stop words and missing graph words.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::time::Instant;

use ahash::{AHashMap, AHashSet};

use crate::config::Config;
use crate::converters::ConverterTable;
use crate::graph::{IntentGraph, Label, NodeId, NodeKind};
use crate::recognition::{build_recognition, Recognition, RecognitionError};
use crate::utils::tokenize;

const EPSILON: f64 = 1e-9;

/// One traversed edge of an accepted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TraceStep {
    /// The edge's input label.
    pub ilabel: Option<Label>,
    /// The edge's output label.
    pub olabel: Option<Label>,
    /// Whether the input label actually consumed an utterance token. False
    /// for ε edges and for fuzzy missing-token traversals.
    pub consumed: bool,
}

/// An accepted path before it is materialized into a [`Recognition`].
struct Candidate {
    end_node: NodeId,
    intent: Label,
    trace: Vec<TraceStep>,
    probability: f64,
    /// Discrete fuzzy cost (stop skips and missing tokens); 0 for strict.
    cost: f64,
    /// Filled in by [`score_candidates`].
    confidence: f64,
}

/// Options for [`recognize_with_options`].
#[derive(Default)]
pub struct RecognizeOptions {
    /// Numeric matching knobs.
    pub config: Config,
    /// Tokens that may be skipped at matching time.
    pub stop_words: AHashSet<String>,
    /// When set, only these intents are matched.
    pub intent_filter: Option<AHashSet<String>>,
    /// Replaces the standard converter table when set.
    pub converters: Option<ConverterTable>,
    /// Extends (and overrides entries of) the effective converter table.
    pub extra_converters: Option<ConverterTable>,
}

impl RecognizeOptions {
    fn converter_table(&self) -> ConverterTable {
        let mut table = self
            .converters
            .clone()
            .unwrap_or_else(ConverterTable::standard);
        if let Some(extra) = &self.extra_converters {
            table.extend_from(extra);
        }
        table
    }
}

struct Search<'a> {
    graph: &'a IntentGraph,
    tokens: Vec<String>,
    stop_words: &'a AHashSet<String>,
    intent_filter: Option<AHashSet<Label>>,
    deadline: Option<(Instant, f64)>,
}

impl Search<'_> {
    fn expired(&self) -> bool {
        match self.deadline {
            Some((started, budget)) => started.elapsed().as_secs_f64() >= budget,
            None => false,
        }
    }

    /// Whether an ε edge into `node` may be taken, and whether its output
    /// label should be traced. Edges into intent entry nodes carry the
    /// intent name as output label; that label is matching metadata, not
    /// sentence text, so it is never traced.
    fn enter(&self, node: NodeId) -> (bool, bool) {
        match self.graph.kind(node) {
            NodeKind::IntentStart(symbol) => match &self.intent_filter {
                Some(filter) => (filter.contains(&symbol), false),
                None => (true, false),
            },
            _ => (true, true),
        }
    }
}

/// Recognizes an utterance with default options.
///
/// # Errors
///
/// Returns a [`RecognitionError`] when a template references an unknown
/// converter. An utterance that matches nothing is not an error; the
/// result is an empty list.
pub fn recognize(
    graph: &IntentGraph,
    utterance: &str,
) -> Result<Vec<Recognition>, RecognitionError> {
    recognize_with_options(graph, utterance, &RecognizeOptions::default())
}

/// Recognizes an utterance against the graph.
///
/// Results are ranked best-first; identical recognitions are merged. See
/// [`Config`] for the matcher selection, candidate cap and deadline.
///
/// # Errors
///
/// Returns a [`RecognitionError`] when a template references an unknown
/// converter. A candidate whose converter rejects its value is dropped
/// with a warning; remaining candidates are still returned.
pub fn recognize_with_options(
    graph: &IntentGraph,
    utterance: &str,
    options: &RecognizeOptions,
) -> Result<Vec<Recognition>, RecognitionError> {
    let started = Instant::now();
    let search = Search {
        graph,
        tokens: tokenize(utterance),
        stop_words: &options.stop_words,
        intent_filter: options.intent_filter.as_ref().map(|filter| {
            filter
                .iter()
                .filter_map(|name| {
                    graph
                        .intent_starts()
                        .iter()
                        .find(|(intent, _)| intent == name)
                        .map(|&(_, node)| match graph.kind(node) {
                            NodeKind::IntentStart(symbol) => symbol,
                            _ => unreachable!("intent entry nodes are IntentStart"),
                        })
                })
                .collect()
        }),
        deadline: options.config.max_seconds.map(|budget| (started, budget)),
    };

    let mut candidates = if options.config.fuzzy {
        fuzzy_search(&search, &options.config)
    } else {
        strict_search(&search)
    };
    score_candidates(&mut candidates, &options.config);

    let table = options.converter_table();
    let mut results: Vec<Recognition> = Vec::new();
    let mut seen: AHashSet<String> = AHashSet::new();
    for candidate in &candidates {
        match build_recognition(graph, &candidate.trace, candidate.intent, &table) {
            Ok(mut recognition) => {
                recognition.intent.confidence = candidate.confidence;
                if seen.insert(recognition_key(&recognition)) {
                    results.push(recognition);
                }
            }
            Err(err @ RecognitionError::UnknownConverter(_)) => return Err(err),
            Err(err) => {
                log::warn!(
                    "Discarding one recognition candidate for intent `{}`: {err}. \
                     Other candidates are unaffected.",
                    graph.resolve(candidate.intent)
                );
            }
        }
    }
    if options.config.max_recognitions > 0 {
        results.truncate(options.config.max_recognitions);
    }
    let elapsed = started.elapsed().as_secs_f64();
    for recognition in &mut results {
        recognition.recognize_seconds = elapsed;
    }
    Ok(results)
}

/// Turns raw path probabilities and discrete costs into final confidences
/// and sorts candidates best-first.
///
/// Path probabilities are normalized against the best path reaching the
/// same accept node, so an unambiguous exact match always scores 1.0.
fn score_candidates(candidates: &mut [Candidate], config: &Config) {
    let mut best_probability: AHashMap<NodeId, f64> = AHashMap::new();
    for candidate in candidates.iter() {
        let best = best_probability.entry(candidate.end_node).or_insert(0.0);
        *best = best.max(candidate.probability);
    }
    for candidate in candidates.iter_mut() {
        let best = best_probability[&candidate.end_node];
        let relative = if best > 0.0 {
            candidate.probability / best
        } else {
            1.0
        };
        if config.fuzzy {
            candidate.cost += (1.0 - relative) * config.fuzzy_config.weight_cost;
        } else {
            candidate.confidence = relative;
        }
    }
    if config.fuzzy {
        let best_cost = candidates
            .iter()
            .map(|c| c.cost)
            .fold(f64::INFINITY, f64::min);
        for candidate in candidates.iter_mut() {
            // exp(-cost), normalized by the best candidate's value.
            candidate.confidence = (best_cost - candidate.cost).exp();
        }
    }
    // Cost ascending is confidence descending; the sort is stable, so
    // equal candidates keep their emission order.
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

fn recognition_key(recognition: &Recognition) -> String {
    let mut key = format!("{}\u{1}{}\u{1}{}", recognition.intent.name, recognition.text, recognition.raw_text);
    for entity in &recognition.entities {
        key.push('\u{1}');
        key.push_str(&entity.name);
        key.push('=');
        key.push_str(&entity.value.to_string());
    }
    key
}

// ---------------------------------------------------------------------------
// Strict matcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct StrictItem {
    node: NodeId,
    position: usize,
    probability: f64,
    trace: Vec<TraceStep>,
}

/// Layered breadth-first matching of the exact token sequence. When the
/// first pass fails and stop words are configured, a second pass may skip
/// them.
fn strict_search(search: &Search<'_>) -> Vec<Candidate> {
    let accepts = strict_pass(search, false);
    if !accepts.is_empty() || search.stop_words.is_empty() {
        return accepts;
    }
    strict_pass(search, true)
}

fn strict_pass(search: &Search<'_>, skip_stop_words: bool) -> Vec<Candidate> {
    let graph = search.graph;
    let n = search.tokens.len();
    let mut accepts = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(StrictItem {
        node: graph.start(),
        position: 0,
        probability: 1.0,
        trace: Vec::new(),
    });

    while let Some(item) = queue.pop_front() {
        if search.expired() {
            break;
        }
        if let NodeKind::SentenceEnd(intent) = graph.kind(item.node) {
            if item.position == n {
                accepts.push(Candidate {
                    end_node: item.node,
                    intent,
                    trace: item.trace.clone(),
                    probability: item.probability,
                    cost: 0.0,
                    confidence: 0.0,
                });
            }
        }
        for edge in graph.outgoing(item.node) {
            match edge.ilabel {
                None => {
                    let (allowed, trace_output) = search.enter(edge.to);
                    if !allowed {
                        continue;
                    }
                    let mut trace = item.trace.clone();
                    if trace_output {
                        trace.push(TraceStep {
                            ilabel: None,
                            olabel: edge.olabel,
                            consumed: false,
                        });
                    }
                    queue.push_back(StrictItem {
                        node: edge.to,
                        position: item.position,
                        probability: item.probability * edge.weight,
                        trace,
                    });
                }
                Some(ilabel) => {
                    if item.position < n && search.tokens[item.position] == graph.resolve(ilabel) {
                        let mut trace = item.trace.clone();
                        trace.push(TraceStep {
                            ilabel: Some(ilabel),
                            olabel: edge.olabel,
                            consumed: true,
                        });
                        queue.push_back(StrictItem {
                            node: edge.to,
                            position: item.position + 1,
                            probability: item.probability * edge.weight,
                            trace,
                        });
                    }
                }
            }
        }
        if skip_stop_words
            && item.position < n
            && search.stop_words.contains(&search.tokens[item.position])
        {
            // Skipped tokens traverse no edge, so they leave no trace.
            queue.push_back(StrictItem {
                position: item.position + 1,
                ..item
            });
        }
    }
    accepts
}

// ---------------------------------------------------------------------------
// Fuzzy matcher
// ---------------------------------------------------------------------------

struct FuzzyItem {
    node: NodeId,
    position: usize,
    stop_skips: u32,
    missing: u32,
    probability: f64,
    trace: Vec<TraceStep>,
}

struct QueueEntry {
    cost: f64,
    remaining: usize,
    probability: f64,
    sequence: u64,
    item: FuzzyItem,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.remaining.cmp(&other.remaining))
            // Higher probability first, then insertion order.
            .then(other.probability.total_cmp(&self.probability))
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Best-first search over the cost schedule. Emission starts at the
/// cheapest accepted item; equal-cost accepts are collected past the
/// candidate cap so that ties stay comparable downstream.
fn fuzzy_search(search: &Search<'_>, config: &Config) -> Vec<Candidate> {
    let graph = search.graph;
    let costs = &config.fuzzy_config;
    let n = search.tokens.len();
    let max = config.max_recognitions;

    let mut heap: BinaryHeap<Reverse<QueueEntry>> = BinaryHeap::new();
    let mut sequence = 0u64;
    let mut best_seen: AHashMap<(NodeId, usize), f64> = AHashMap::new();
    let mut accepts: Vec<Candidate> = Vec::new();

    let mut push = |heap: &mut BinaryHeap<Reverse<QueueEntry>>,
                    sequence: &mut u64,
                    best_seen: &mut AHashMap<(NodeId, usize), f64>,
                    item: FuzzyItem| {
        let cost = f64::from(item.stop_skips) * costs.stop_word_cost
            + f64::from(item.missing) * costs.missing_token_cost;
        let key = (item.node, item.position);
        match best_seen.get(&key) {
            Some(&best) if cost > best + EPSILON => return,
            _ => {}
        }
        let entry = best_seen.entry(key).or_insert(cost);
        *entry = entry.min(cost);
        *sequence += 1;
        heap.push(Reverse(QueueEntry {
            cost,
            remaining: n - item.position,
            probability: item.probability,
            sequence: *sequence,
            item,
        }));
    };

    push(
        &mut heap,
        &mut sequence,
        &mut best_seen,
        FuzzyItem {
            node: graph.start(),
            position: 0,
            stop_skips: 0,
            missing: 0,
            probability: 1.0,
            trace: Vec::new(),
        },
    );

    while let Some(Reverse(entry)) = heap.pop() {
        if search.expired() {
            break;
        }
        if max > 0 && accepts.len() >= max {
            let boundary = accepts.last().map(|c| c.cost).unwrap_or(0.0);
            if entry.cost > boundary + EPSILON {
                break;
            }
        }
        let item = entry.item;
        if let NodeKind::SentenceEnd(intent) = graph.kind(item.node) {
            if item.position == n {
                accepts.push(Candidate {
                    end_node: item.node,
                    intent,
                    trace: item.trace,
                    probability: item.probability,
                    cost: entry.cost,
                    confidence: 0.0,
                });
                continue;
            }
        }
        for edge in graph.outgoing(item.node) {
            match edge.ilabel {
                None => {
                    let (allowed, trace_output) = search.enter(edge.to);
                    if !allowed {
                        continue;
                    }
                    let mut trace = item.trace.clone();
                    if trace_output {
                        trace.push(TraceStep {
                            ilabel: None,
                            olabel: edge.olabel,
                            consumed: false,
                        });
                    }
                    push(
                        &mut heap,
                        &mut sequence,
                        &mut best_seen,
                        FuzzyItem {
                            node: edge.to,
                            position: item.position,
                            stop_skips: item.stop_skips,
                            missing: item.missing,
                            probability: item.probability * edge.weight,
                            trace,
                        },
                    );
                }
                Some(ilabel) => {
                    if item.position < n && search.tokens[item.position] == graph.resolve(ilabel) {
                        let mut trace = item.trace.clone();
                        trace.push(TraceStep {
                            ilabel: Some(ilabel),
                            olabel: edge.olabel,
                            consumed: true,
                        });
                        push(
                            &mut heap,
                            &mut sequence,
                            &mut best_seen,
                            FuzzyItem {
                                node: edge.to,
                                position: item.position + 1,
                                stop_skips: item.stop_skips,
                                missing: item.missing,
                                probability: item.probability * edge.weight,
                                trace,
                            },
                        );
                    }
                    // The graph word may also be treated as missing from
                    // the input.
                    let mut trace = item.trace.clone();
                    trace.push(TraceStep {
                        ilabel: Some(ilabel),
                        olabel: edge.olabel,
                        consumed: false,
                    });
                    push(
                        &mut heap,
                        &mut sequence,
                        &mut best_seen,
                        FuzzyItem {
                            node: edge.to,
                            position: item.position,
                            stop_skips: item.stop_skips,
                            missing: item.missing + 1,
                            probability: item.probability * edge.weight,
                            trace,
                        },
                    );
                }
            }
        }
        if item.position < n && search.stop_words.contains(&search.tokens[item.position]) {
            push(
                &mut heap,
                &mut sequence,
                &mut best_seen,
                FuzzyItem {
                    node: item.node,
                    position: item.position + 1,
                    stop_skips: item.stop_skips + 1,
                    missing: item.missing,
                    probability: item.probability,
                    trace: item.trace,
                },
            );
        }
    }
    accepts
}
