/*!
# Hark

This crate provides a natural language understanding core for voice command
systems. It parses a JSGF-derived template grammar organized by intent,
compiles every template into a single weighted directed graph encoding all
accepted sentences, and matches utterances against that graph to recover
the intent and its entities. Here is a quick example of how this crate
works:

```rust
# fn main() -> Result<(), Box<dyn std::error::Error>> {
let template = r#"
[LightOn]
turn on [the] (living room lamp | kitchen light){name}
"#;
let grammar = hark::Grammar::parse(template)?;
let grammar = hark::expand(&grammar, &Default::default(), &Default::default())?;
let graph = hark::compile(&grammar)?;

let recognitions = hark::recognize(&graph, "turn on the kitchen light")?;
assert_eq!(recognitions.len(), 1);
let best = &recognitions[0];
assert_eq!(best.intent.name, "LightOn");
assert_eq!(best.intent.confidence, 1.0);
assert_eq!(best.entities[0].name, "name");
assert_eq!(best.entities[0].value.to_string(), "kitchen light");
# Ok(())
# }
```

# Overview

Data flows linearly through four stages, each a pure function of its
inputs:

1. [`parse`] (or [`Grammar::parse`]) turns template text into a
   [`Grammar`]: a mapping from intent name to sentence expressions and
   named rules.
2. [`expand`] inlines rule references, caller-provided slot values and
   number ranges, leaving self-contained sentence expressions.
3. [`compile`] builds the [`IntentGraph`], a weighted directed graph whose
   edges carry an input label (matched against the utterance) and an
   output label (emitted into the recognized text).
4. [`recognize`] matches a tokenized utterance against the graph, either
   strictly or fuzzily, and materializes ranked [`Recognition`] records
   with entities, offsets and converted values.

A compiled graph is immutable; recognitions from distinct threads may run
against the same graph without synchronization.

# Template syntax

A template is line oriented. `[IntentName]` opens an intent section,
`name = body` defines a rule, and every other non-empty line is one
sentence. Comments run from an unescaped `#` or `;` (at the start of a
line or after whitespace) to the end of the line; a trailing `\` continues
the sentence on the next line.

## Optionals and alternatives

```text
[LightOn]
turn on [the] lamp          # "turn on lamp" and "turn on the lamp"
set light to (red | green)  # either color
```

Alternatives may carry weights, written as a leading number in a branch:
`(2 red | 1 blue | green)`. A branch without a weight gets 1; weights are
normalized, so here red is matched with probability 0.5, blue and green
with 0.25 each.

## Rules and slots

```text
[SetColor]
color = (red | green | blue)
set [the] light to <color>
paint it $color_name
```

`<color>` references the rule in the same intent, `<Other.color>` one in
the intent `Other`. `$color_name` is a slot: its branches are supplied to
[`expand`] by the caller as [`SlotValues`]. Rules must not be recursive;
the expander rejects cycles.

## Tags, substitutions and converters

```text
[SetBrightness]
set brightness to (one:1 | two:2){value!int}
```

`{value}` tags the preceding atom or group as an entity. `word:output`
replaces the word's emitted text (`word:` drops it); a group substitution
`(in the house):(inside)` replaces the whole group's output.
`!name` appends a converter; chains apply left to right. The default
converter table provides `int`, `float`, `bool`, `lower` and `upper`, and
callers may replace or extend it per recognition call.

A number range `1..100` (optionally stepped, `0..100,20`) is shorthand for
an alternatives group over the digit strings with an implicit `int`
converter.

# Matching

[`recognize`] tokenizes the utterance on whitespace and walks the graph.
The strict matcher consumes the tokens exactly; if that fails and stop
words are configured, a second pass may skip them. The fuzzy matcher (the
default) runs a best-first search that tolerates skipped stop words and
missing graph words under the cost schedule of
[`FuzzyConfig`](config::FuzzyConfig). Results carry a confidence
normalized so that an unambiguous exact match scores 1.0, and an utterance
that matches nothing yields an empty list rather than an error.

```rust
# fn main() -> Result<(), Box<dyn std::error::Error>> {
use hark::RecognizeOptions;

let template = "[SetColor]\nset light to (red | green | blue)";
let grammar = hark::expand(
    &hark::Grammar::parse(template)?,
    &Default::default(),
    &Default::default(),
)?;
let graph = hark::compile(&grammar)?;

// "that" is not in the template; the stop-word set lets it be skipped.
let mut options = RecognizeOptions::default();
options.stop_words.insert("that".to_string());
let recognitions = hark::recognize_with_options(&graph, "set that light to red", &options)?;
assert_eq!(recognitions[0].intent.name, "SetColor");

// No stop words, no match: an empty result, not an error.
assert!(hark::recognize(&graph, "set light to purple")?.is_empty());
# Ok(())
# }
```
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
pub mod ast;
pub mod config;
pub mod converters;
pub mod expand;
pub mod fst;
pub mod grammar;
pub mod graph;
pub mod ngram;
pub mod parser;
pub mod recognition;
pub mod recognize;
pub mod utils;

pub use config::{Config, ExpansionConfig};
pub use converters::ConverterTable;
pub use expand::{expand, ExpansionError, SlotValues};
pub use fst::{graph_to_fst, FstText};
pub use grammar::Grammar;
pub use graph::{compile, CompileError, IntentGraph};
pub use ngram::ngram_counts;
pub use parser::{parse, ParseError, ParseOptions};
pub use recognition::{Entity, Recognition, RecognitionError, Value};
pub use recognize::{recognize, recognize_with_options, RecognizeOptions};
