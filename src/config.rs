//! The configuration module for expansion and recognition.

use serde::{Deserialize, Serialize};

/// Cost schedule of the fuzzy matcher.
///
/// A candidate's cost is
/// `stop_skips * stop_word_cost + missing_tokens * missing_token_cost +
/// (1 - relative_path_probability) * weight_cost`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FuzzyConfig {
    /// Cost of consuming an input token from the stop-word set without
    /// matching an edge. The default is 1.0.
    pub stop_word_cost: f64,
    /// Cost of traversing a word edge whose word is absent from the input.
    /// The default is 10.0.
    pub missing_token_cost: f64,
    /// Scale of the penalty for taking a lower-probability path than the
    /// best path reaching the same accept state. The default is 0.5.
    pub weight_cost: f64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            stop_word_cost: 1.0,
            missing_token_cost: 10.0,
            weight_cost: 0.5,
        }
    }
}

/// Configuration of [`expand`](crate::expand::expand).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpansionConfig {
    /// When true, a slot reference without replacement values fails
    /// expansion instead of matching nothing. The default is false.
    pub strict_slots: bool,
    /// Maximum nesting depth of rule and slot substitutions before
    /// expansion fails. The default is 8.
    pub max_depth: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            strict_slots: false,
            max_depth: 8,
        }
    }
}

/// Configuration of [`recognize`](crate::recognize::recognize).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Whether to use the fuzzy best-first matcher instead of the strict
    /// one. The default is true.
    pub fuzzy: bool,
    /// Maximum number of recognitions to return; 0 means unlimited.
    /// The default is 1.
    pub max_recognitions: usize,
    /// Wall-clock budget for one recognition call in seconds. Reaching it
    /// returns the best candidates found so far. The default is `None`,
    /// which means unbounded.
    pub max_seconds: Option<f64>,
    /// The fuzzy matcher's cost schedule.
    pub fuzzy_config: FuzzyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fuzzy: true,
            max_recognitions: 1,
            max_seconds: None,
            fuzzy_config: FuzzyConfig::default(),
        }
    }
}
