//! The grammar module: intents, their sentence templates and named rules.

use ahash::AHashMap;

use crate::ast::Expression;

/// One intent's templates: its sentences and its named rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentDefinition {
    pub(crate) sentences: Vec<Expression>,
    pub(crate) rules: AHashMap<String, Expression>,
}

impl IntentDefinition {
    /// The intent's sentence expressions, in template order.
    #[inline]
    pub fn sentences(&self) -> &[Expression] {
        &self.sentences
    }

    /// The intent's named rules.
    #[inline]
    pub fn rules(&self) -> &AHashMap<String, Expression> {
        &self.rules
    }
}

/// A parsed template grammar: a mapping from intent name to that intent's
/// sentences and rules.
///
/// Rule names are unique within an intent; cross-intent references use the
/// dotted form `Intent.rule`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grammar {
    intents: AHashMap<String, IntentDefinition>,
}

impl Grammar {
    /// Parses a template text with default options.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`](crate::parser::ParseError) on the first
    /// malformed line.
    pub fn parse(text: &str) -> Result<Self, crate::parser::ParseError> {
        crate::parser::parse(text, &Default::default())
    }

    /// Whether the grammar has no intents at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Intent names in sorted order.
    pub fn intent_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.intents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Looks up one intent's definition.
    #[inline]
    pub fn intent(&self, name: &str) -> Option<&IntentDefinition> {
        self.intents.get(name)
    }

    /// Looks up a rule body by owning intent and rule name.
    #[inline]
    pub fn rule(&self, intent: &str, rule: &str) -> Option<&Expression> {
        self.intents.get(intent)?.rules.get(rule)
    }

    /// Iterates over `(intent name, definition)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IntentDefinition)> {
        self.intents.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub(crate) fn ensure_intent(&mut self, name: &str) -> &mut IntentDefinition {
        self.intents.entry(name.to_string()).or_default()
    }

    pub(crate) fn add_sentence(&mut self, intent: &str, sentence: Expression) {
        self.ensure_intent(intent).sentences.push(sentence);
    }

    /// Returns the previous body when the rule was already defined.
    pub(crate) fn add_rule(
        &mut self,
        intent: &str,
        rule: &str,
        body: Expression,
    ) -> Option<Expression> {
        self.ensure_intent(intent)
            .rules
            .insert(rule.to_string(), body)
    }
}
