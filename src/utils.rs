//! Utility functions for the library.

/// Splits an utterance into tokens on Unicode whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Lowercases an utterance or template line; handy as a
/// [`sentence_transform`](crate::parser::ParseOptions::sentence_transform).
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}
