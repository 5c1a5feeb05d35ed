//! Rule, slot and number-range expansion.
//!
//! [`expand`] rewrites every sentence of a [`Grammar`] into a
//! self-contained expression: rule references are inlined (across intents
//! via the dotted form), slot references become alternatives over the
//! caller-provided replacements, and number ranges become alternatives over
//! their digit strings.

use ahash::AHashMap;

use crate::ast::{Expression, Sequence, Tag, Word};
use crate::config::ExpansionConfig;
use crate::grammar::Grammar;

/// Caller-provided slot replacements: slot name to the sentence expressions
/// substituted for `$name`.
pub type SlotValues = AHashMap<String, Vec<Expression>>;

/// The error type for grammar expansion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpansionError {
    /// A rule expands, directly or indirectly, through itself.
    #[error("recursive rule reference: {chain}")]
    RecursiveRule {
        /// The reference chain that closed the cycle, e.g.
        /// `Intent.a -> Intent.b -> Intent.a`.
        chain: String,
    },
    /// A referenced rule does not exist.
    #[error("intent `{intent}` has no rule named `{rule}`")]
    MissingRule {
        /// The intent whose rule table was searched.
        intent: String,
        /// The missing rule name.
        rule: String,
    },
    /// A slot has no replacement and strict mode is on.
    #[error("no replacement provided for slot `${name}`")]
    MissingSlot {
        /// The slot name.
        name: String,
    },
    /// Nested substitutions exceeded the configured depth limit.
    #[error("expansion exceeded maximum depth {max_depth} at `{context}`")]
    MaxDepthExceeded {
        /// The configured limit.
        max_depth: usize,
        /// The reference being expanded when the limit was hit.
        context: String,
    },
}

struct Expander<'a> {
    grammar: &'a Grammar,
    slots: &'a SlotValues,
    config: &'a ExpansionConfig,
    // Fully-qualified `Intent.rule` keys currently being expanded.
    stack: Vec<String>,
}

/// Expands every sentence and rule body of `grammar`.
///
/// The result contains no [`Expression::RuleRef`], [`Expression::SlotRef`]
/// or [`Expression::NumberRange`] nodes, and expanding it again returns an
/// equal grammar.
///
/// # Errors
///
/// Returns an [`ExpansionError`] on recursive rules, missing rules, missing
/// slots (in strict mode) or when nesting exceeds
/// [`ExpansionConfig::max_depth`].
pub fn expand(
    grammar: &Grammar,
    slots: &SlotValues,
    config: &ExpansionConfig,
) -> Result<Grammar, ExpansionError> {
    let mut expander = Expander {
        grammar,
        slots,
        config,
        stack: Vec::new(),
    };
    let mut out = Grammar::default();
    for (intent, definition) in grammar.iter() {
        out.ensure_intent(intent);
        for sentence in definition.sentences() {
            let expanded = expander.expression(sentence, intent, 0)?;
            out.add_sentence(intent, expanded);
        }
        for (rule, body) in definition.rules() {
            let key = format!("{intent}.{rule}");
            expander.stack.push(key);
            let expanded = expander.expression(body, intent, 0)?;
            expander.stack.pop();
            out.add_rule(intent, rule, expanded);
        }
    }
    Ok(out)
}

impl Expander<'_> {
    fn expression(
        &mut self,
        expr: &Expression,
        intent: &str,
        depth: usize,
    ) -> Result<Expression, ExpansionError> {
        match expr {
            Expression::Word(w) => Ok(Expression::Word(w.clone())),
            Expression::Sequence(s) => {
                let items = s
                    .items
                    .iter()
                    .map(|item| self.expression(item, intent, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expression::Sequence(Sequence { items, ..s.clone() }))
            }
            Expression::Tag(t) => Ok(Expression::Tag(Tag {
                inner: Box::new(self.expression(&t.inner, intent, depth)?),
                ..t.clone()
            })),
            Expression::RuleRef(name) => self.rule_ref(name, intent, depth),
            Expression::SlotRef(name) => self.slot_ref(name, intent, depth),
            Expression::NumberRange(range) => {
                let mut branches = Vec::new();
                let mut value = range.start;
                while value <= range.end {
                    let mut word = Word::new(value.to_string());
                    word.converters.push("int".to_string());
                    let mut branch = Sequence::sequence(vec![Expression::Word(word)]);
                    branch.weight = 1.0;
                    branches.push(Expression::Sequence(branch));
                    value += range.step;
                }
                Ok(Expression::Sequence(Sequence::alternative(branches)))
            }
        }
    }

    fn rule_ref(
        &mut self,
        name: &str,
        intent: &str,
        depth: usize,
    ) -> Result<Expression, ExpansionError> {
        let (owner, rule) = match name.split_once('.') {
            Some((owner, rule)) => (owner, rule),
            None => (intent, name),
        };
        let key = format!("{owner}.{rule}");
        self.check_depth(depth, &key)?;
        if self.stack.contains(&key) {
            let mut chain: Vec<&str> = self.stack.iter().map(String::as_str).collect();
            chain.push(&key);
            return Err(ExpansionError::RecursiveRule {
                chain: chain.join(" -> "),
            });
        }
        // Copy the grammar reference out so the body borrow does not pin
        // `self` while expanding recursively.
        let grammar = self.grammar;
        let body = grammar
            .rule(owner, rule)
            .ok_or_else(|| ExpansionError::MissingRule {
                intent: owner.to_string(),
                rule: rule.to_string(),
            })?;
        self.stack.push(key);
        // Nested references inside the body resolve against the owning
        // intent's rule table.
        let expanded = self.expression(body, owner, depth + 1);
        self.stack.pop();
        expanded
    }

    fn slot_ref(
        &mut self,
        name: &str,
        intent: &str,
        depth: usize,
    ) -> Result<Expression, ExpansionError> {
        self.check_depth(depth, &format!("${name}"))?;
        let slots = self.slots;
        let Some(values) = slots.get(name) else {
            if self.config.strict_slots {
                return Err(ExpansionError::MissingSlot {
                    name: name.to_string(),
                });
            }
            log::warn!(
                "Slot `${name}` has no replacement values. \
                 Sentences using it will not match anything. \
                 Pass replacement values or enable strict slots to make this an error."
            );
            return Ok(Expression::Sequence(Sequence::alternative(Vec::new())));
        };
        let items = values
            .iter()
            .map(|value| {
                let expanded = self.expression(value, intent, depth + 1)?;
                Ok(match expanded {
                    branch @ Expression::Sequence(_) => branch,
                    other => Expression::Sequence(Sequence::sequence(vec![other])),
                })
            })
            .collect::<Result<Vec<_>, ExpansionError>>()?;
        Ok(Expression::Sequence(Sequence::alternative(items)))
    }

    fn check_depth(&self, depth: usize, context: &str) -> Result<(), ExpansionError> {
        if depth >= self.config.max_depth {
            Err(ExpansionError::MaxDepthExceeded {
                max_depth: self.config.max_depth,
                context: context.to_string(),
            })
        } else {
            Ok(())
        }
    }
}
