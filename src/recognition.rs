//! Recognition results: the records returned by
//! [`recognize`](crate::recognize::recognize) and the builder that
//! materializes them from an accepted graph path.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::converters::ConverterTable;
use crate::graph::{classify_marker, IntentGraph, Label, Marker};
use crate::recognize::TraceStep;

/// A typed value produced by matching and conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A plain string token.
    Str(String),
    /// An integer, e.g. from the `int` converter.
    Int(i64),
    /// A floating point number, e.g. from the `float` converter.
    Float(f64),
    /// A boolean, e.g. from the `bool` converter.
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// The recognized intent and its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// The intent name from the template section header.
    pub name: String,
    /// Normalized confidence in `[0, 1]`; 1.0 for an unambiguous exact
    /// match.
    pub confidence: f64,
}

/// One recognized entity: a tagged sub-phrase of the utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// The tag name from the template.
    pub name: String,
    /// The converted entity value. A single converted token is reported
    /// as-is; multiple tokens are joined into a string.
    pub value: Value,
    /// The entity text as spoken, before substitutions and converters.
    pub raw_value: String,
    /// Start offset of the value in [`Recognition::text`], counting
    /// Unicode scalar values.
    pub start: usize,
    /// End offset (exclusive) of the value in [`Recognition::text`].
    pub end: usize,
    /// Start offset of the raw value in [`Recognition::raw_text`].
    pub raw_start: usize,
    /// End offset (exclusive) of the raw value in
    /// [`Recognition::raw_text`].
    pub raw_end: usize,
    /// The converted value tokens.
    pub tokens: Vec<Value>,
    /// The spoken tokens the entity covers.
    pub raw_tokens: Vec<String>,
}

/// One recognition of an utterance against the intent graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    /// The recognized intent.
    pub intent: Intent,
    /// The output text, built from emitted output labels.
    pub text: String,
    /// The input text, built from consumed input labels.
    pub raw_text: String,
    /// [`Recognition::text`] split into tokens.
    pub tokens: Vec<String>,
    /// [`Recognition::raw_text`] split into tokens.
    pub raw_tokens: Vec<String>,
    /// Recognized entities in the order their tags close.
    pub entities: Vec<Entity>,
    /// Wall-clock duration of the recognition call in seconds.
    pub recognize_seconds: f64,
}

/// The error type for recognition building.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    /// A template references a converter that is not in the table.
    #[error("unknown converter `{0}`")]
    UnknownConverter(String),
    /// A converter rejected a matched value. Only the affected candidate
    /// is discarded.
    #[error("converter `{name}` failed: {reason}")]
    ConverterFailed {
        /// The converter name.
        name: String,
        /// The converter's own description of the failure.
        reason: String,
    },
    /// Entity or converter markers on the accepted path do not nest. This
    /// indicates a compiler bug.
    #[error("unbalanced markers on accepted path: {0}")]
    UnbalancedMarkers(String),
}

enum FrameKind {
    Entity(String),
    Convert(String),
}

struct Frame {
    kind: FrameKind,
    values: Vec<Value>,
    text_start: usize,
    raw_start: usize,
}

struct PendingEntity {
    name: String,
    values: Vec<Value>,
    text_range: (usize, usize),
    raw_range: (usize, usize),
}

/// Walks an accepted trace and materializes the recognition record.
///
/// `confidence` and `recognize_seconds` are filled in by the caller.
pub(crate) fn build_recognition(
    graph: &IntentGraph,
    trace: &[TraceStep],
    intent: Label,
    table: &ConverterTable,
) -> Result<Recognition, RecognitionError> {
    let mut text_tokens: Vec<String> = Vec::new();
    let mut raw_tokens: Vec<String> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut pending: Vec<PendingEntity> = Vec::new();

    for step in trace {
        if step.consumed {
            if let Some(ilabel) = step.ilabel {
                raw_tokens.push(graph.resolve(ilabel).to_string());
            }
        }
        let Some(olabel) = step.olabel else { continue };
        let label = graph.resolve(olabel);
        match classify_marker(label) {
            None => {
                text_tokens.push(label.to_string());
                if let Some(frame) = frames.last_mut() {
                    frame.values.push(Value::Str(label.to_string()));
                }
            }
            Some(Marker::Begin(name)) => frames.push(Frame {
                kind: FrameKind::Entity(name.to_string()),
                values: Vec::new(),
                text_start: text_tokens.len(),
                raw_start: raw_tokens.len(),
            }),
            Some(Marker::End(name)) => {
                let frame = frames
                    .pop()
                    .filter(|f| matches!(&f.kind, FrameKind::Entity(n) if n == name))
                    .ok_or_else(|| {
                        RecognitionError::UnbalancedMarkers(format!("unexpected end of `{name}`"))
                    })?;
                pending.push(PendingEntity {
                    name: name.to_string(),
                    values: frame.values.clone(),
                    text_range: (frame.text_start, text_tokens.len()),
                    raw_range: (frame.raw_start, raw_tokens.len()),
                });
                if let Some(parent) = frames.last_mut() {
                    parent.values.extend(frame.values);
                }
            }
            Some(Marker::Convert(name)) => frames.push(Frame {
                kind: FrameKind::Convert(name.to_string()),
                values: Vec::new(),
                text_start: text_tokens.len(),
                raw_start: raw_tokens.len(),
            }),
            Some(Marker::Converted(name)) => {
                let frame = frames
                    .pop()
                    .filter(|f| matches!(&f.kind, FrameKind::Convert(n) if n == name))
                    .ok_or_else(|| {
                        RecognitionError::UnbalancedMarkers(format!(
                            "unexpected end of converter `{name}`"
                        ))
                    })?;
                let converter = table
                    .get(name)
                    .ok_or_else(|| RecognitionError::UnknownConverter(name.to_string()))?;
                let converted = converter.as_ref()(&frame.values).map_err(|reason| {
                    RecognitionError::ConverterFailed {
                        name: name.to_string(),
                        reason,
                    }
                })?;
                // The converted region is the tail of the output stream.
                text_tokens.truncate(frame.text_start);
                text_tokens.extend(converted.iter().map(Value::to_string));
                if let Some(parent) = frames.last_mut() {
                    parent.values.extend(converted);
                }
            }
        }
    }
    if let Some(frame) = frames.last() {
        let name = match &frame.kind {
            FrameKind::Entity(n) | FrameKind::Convert(n) => n,
        };
        return Err(RecognitionError::UnbalancedMarkers(format!(
            "`{name}` is never closed"
        )));
    }

    let text_offsets = join_offsets(&text_tokens);
    let raw_offsets = join_offsets(&raw_tokens);
    let entities = pending
        .into_iter()
        .map(|e| {
            let (start, end) = span(&text_offsets, e.text_range);
            let (raw_start, raw_end) = span(&raw_offsets, e.raw_range);
            let raw_covered = &raw_tokens[e.raw_range.0..e.raw_range.1];
            Entity {
                name: e.name,
                value: entity_value(&e.values),
                raw_value: raw_covered.join(" "),
                start,
                end,
                raw_start,
                raw_end,
                tokens: e.values,
                raw_tokens: raw_covered.to_vec(),
            }
        })
        .collect();

    Ok(Recognition {
        intent: Intent {
            name: graph.resolve(intent).to_string(),
            confidence: 1.0,
        },
        text: text_tokens.join(" "),
        raw_text: raw_tokens.join(" "),
        tokens: text_tokens,
        raw_tokens,
        entities,
        recognize_seconds: 0.0,
    })
}

fn entity_value(values: &[Value]) -> Value {
    match values {
        [single] => single.clone(),
        _ => Value::Str(
            values
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

/// Character offset of each token in the space-joined text, plus the total
/// length as a final element.
fn join_offsets(tokens: &[String]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(tokens.len() + 1);
    let mut position = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        offsets.push(position);
        position += token.chars().count();
        if i + 1 < tokens.len() {
            position += 1;
        }
    }
    offsets.push(position);
    offsets
}

/// Character span of a token range; empty ranges collapse to a point.
fn span(offsets: &[usize], (from, to): (usize, usize)) -> (usize, usize) {
    let total = *offsets.last().unwrap_or(&0);
    let start = offsets.get(from).copied().unwrap_or(total);
    if to <= from {
        return (start, start);
    }
    let end = offsets
        .get(to)
        .copied()
        .map(|next| if to < offsets.len() - 1 { next - 1 } else { next })
        .unwrap_or(total);
    (start, end)
}
