//! The template parser: turns an intent template text into a [`Grammar`].
//!
//! A template is a line-oriented format. `[IntentName]` opens an intent
//! section, `name = body` defines a rule, every other non-empty line is a
//! sentence. Sentence bodies use a JSGF-derived expression mini-language
//! parsed with `nom`; see the crate-level documentation for the syntax.

use std::fmt;

use ahash::AHashSet;
use nom::character::complete::space0;
use nom::error::ErrorKind;
use nom::IResult;

use crate::ast::{Expression, NumberRange, Sequence, Tag, Word};
use crate::grammar::Grammar;

/// Characters that terminate a word and carry structural meaning.
const SPECIAL_CHARS: &str = "()[]{}<>|:!$";
/// Characters that may appear after a `\` escape.
const ESCAPABLE_CHARS: &str = "()[]{}<>|:!$\\#;";

/// Position of a parse failure inside the template text.
///
/// `line` and `column` are 1-based; `column` counts Unicode scalar values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Name of the template source, e.g. a file path.
    pub source: String,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

/// The error type for template parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// A group, optional, rule reference or tag was never closed.
    #[error("{location}: unbalanced `{delimiter}` near \"{span}\"")]
    UnbalancedDelimiter {
        /// Where the unbalanced construct was detected.
        location: Location,
        /// The delimiter that was expected.
        delimiter: char,
        /// The offending stretch of input.
        span: String,
    },
    /// An alternatives branch contains nothing, e.g. `(a | )`.
    #[error("{location}: empty alternatives branch near \"{span}\"")]
    EmptyAlternative {
        /// Where the empty branch starts.
        location: Location,
        /// The offending stretch of input.
        span: String,
    },
    /// A `\` escape of a character that has no escaped meaning.
    #[error("{location}: unknown escape `\\{escape}`")]
    UnknownEscape {
        /// Where the escape occurs.
        location: Location,
        /// The escaped character.
        escape: char,
    },
    /// A branch starts with a numeric literal that is not a valid weight.
    #[error("{location}: malformed weight near \"{span}\"")]
    MalformedWeight {
        /// Where the weight starts.
        location: Location,
        /// The offending stretch of input.
        span: String,
    },
    /// A number range with reversed bounds or a zero step.
    #[error("{location}: malformed number range \"{span}\"")]
    MalformedRange {
        /// Where the range starts.
        location: Location,
        /// The offending stretch of input.
        span: String,
    },
    /// A sentence or rule line before any `[Intent]` section header.
    #[error("{location}: sentence before any [Intent] section: \"{span}\"")]
    SentenceOutsideSection {
        /// Where the line starts.
        location: Location,
        /// The offending line.
        span: String,
    },
    /// Any other malformed expression.
    #[error("{location}: malformed expression near \"{span}\"")]
    Expression {
        /// Where the failure was detected.
        location: Location,
        /// The offending stretch of input.
        span: String,
    },
}

/// Options for [`parse`].
#[derive(Default)]
pub struct ParseOptions<'a> {
    /// When set, sections whose name is not in the filter are skipped.
    pub intent_filter: Option<AHashSet<String>>,
    /// Applied to every sentence and rule body before parsing, e.g. for
    /// case folding.
    pub sentence_transform: Option<&'a (dyn Fn(&str) -> String + Send + Sync)>,
    /// Name reported in error locations; defaults to `<input>`.
    pub source_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Expression parsing (nom)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum ExprErrorKind {
    Nom(ErrorKind),
    Unbalanced(char),
    EmptyAlternative,
    UnknownEscape(char),
    DanglingEscape,
    MalformedWeight(String),
    MalformedRange(String),
}

#[derive(Debug, Clone, PartialEq)]
struct ExprError<'a> {
    input: &'a str,
    kind: ExprErrorKind,
}

impl<'a> ExprError<'a> {
    fn new(input: &'a str, kind: ExprErrorKind) -> Self {
        Self { input, kind }
    }

    fn failure(input: &'a str, kind: ExprErrorKind) -> nom::Err<Self> {
        nom::Err::Failure(Self::new(input, kind))
    }
}

impl<'a> nom::error::ParseError<&'a str> for ExprError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        Self::new(input, ExprErrorKind::Nom(kind))
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, ExprError<'a>>;

fn shorten(input: &str) -> String {
    const MAX: usize = 24;
    if input.chars().count() <= MAX {
        input.to_string()
    } else {
        let end = input
            .char_indices()
            .nth(MAX)
            .map(|(i, _)| i)
            .unwrap_or(input.len());
        format!("{}…", &input[..end])
    }
}

/// A word terminal: any run of characters outside the special set, with
/// `\` escapes for special characters.
fn take_word(input: &str) -> PResult<'_, String> {
    let mut out = String::new();
    let mut end = 0usize;
    let mut iter = input.char_indices();
    while let Some((i, c)) = iter.next() {
        if c == '\\' {
            match iter.next() {
                Some((j, e)) if ESCAPABLE_CHARS.contains(e) => {
                    out.push(e);
                    end = j + e.len_utf8();
                }
                Some((_, e)) => {
                    return Err(ExprError::failure(
                        &input[i..],
                        ExprErrorKind::UnknownEscape(e),
                    ))
                }
                None => {
                    return Err(ExprError::failure(
                        &input[i..],
                        ExprErrorKind::DanglingEscape,
                    ))
                }
            }
        } else if c.is_whitespace() || SPECIAL_CHARS.contains(c) {
            break;
        } else {
            out.push(c);
            end = i + c.len_utf8();
        }
    }
    if out.is_empty() {
        Err(nom::Err::Error(ExprError::new(
            input,
            ExprErrorKind::Nom(ErrorKind::TakeWhile1),
        )))
    } else {
        Ok((&input[end..], out))
    }
}

/// A name: alphanumerics, underscores and the given extra characters.
fn take_name<'a>(input: &'a str, extra: &str) -> PResult<'a, String> {
    let end = input
        .char_indices()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || extra.contains(c)))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    if end == 0 {
        Err(nom::Err::Error(ExprError::new(
            input,
            ExprErrorKind::Nom(ErrorKind::TakeWhile1),
        )))
    } else {
        Ok((&input[end..], input[..end].to_string()))
    }
}

/// Tries to read `N..M` or `N..M,STEP` where a word atom would be accepted.
fn try_number_range(input: &str) -> Result<Option<(&str, NumberRange)>, nom::Err<ExprError<'_>>> {
    let digits = |s: &str| s.bytes().take_while(u8::is_ascii_digit).count();
    let d1 = digits(input);
    if d1 == 0 || !input[d1..].starts_with("..") {
        return Ok(None);
    }
    let after_dots = &input[d1 + 2..];
    let d2 = digits(after_dots);
    if d2 == 0 {
        return Ok(None);
    }
    let mut end = d1 + 2 + d2;
    let mut step_text: Option<&str> = None;
    if input[end..].starts_with(',') {
        let d3 = digits(&input[end + 1..]);
        if d3 == 0 {
            return Ok(None);
        }
        step_text = Some(&input[end + 1..end + 1 + d3]);
        end += 1 + d3;
    }
    // Must stop at a word boundary, otherwise this is an ordinary word.
    match input[end..].chars().next() {
        Some(c) if !(c.is_whitespace() || SPECIAL_CHARS.contains(c)) => return Ok(None),
        _ => {}
    }
    let span = &input[..end];
    let bad = || ExprError::failure(input, ExprErrorKind::MalformedRange(span.to_string()));
    let start: i64 = input[..d1].parse().map_err(|_| bad())?;
    let stop: i64 = input[d1 + 2..d1 + 2 + d2].parse().map_err(|_| bad())?;
    let step: i64 = match step_text {
        Some(t) => t.parse().map_err(|_| bad())?,
        None => 1,
    };
    if stop < start || step < 1 {
        return Err(bad());
    }
    Ok(Some((
        &input[end..],
        NumberRange {
            start,
            end: stop,
            step,
        },
    )))
}

/// A branch-leading weight: a numeric literal followed by whitespace.
fn parse_branch_weight(input: &str) -> PResult<'_, Option<f64>> {
    let end = input
        .char_indices()
        .find(|&(_, c)| c.is_whitespace() || SPECIAL_CHARS.contains(c))
        .map(|(i, _)| i)
        .unwrap_or(input.len());
    let run = &input[..end];
    if run.is_empty()
        || !run.bytes().any(|b| b.is_ascii_digit())
        || !run.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        || run.contains("..")
    {
        return Ok((input, None));
    }
    match input[end..].chars().next() {
        Some(c) if c.is_whitespace() => {}
        _ => return Ok((input, None)),
    }
    match run.parse::<f64>() {
        Ok(weight) => Ok((&input[end..], Some(weight))),
        Err(_) => Err(ExprError::failure(
            input,
            ExprErrorKind::MalformedWeight(run.to_string()),
        )),
    }
}

/// Output replacement after `:`. Empty when the output is dropped, one word,
/// or a parenthesized word sequence.
fn parse_substitution_output(input: &str) -> PResult<'_, Vec<Word>> {
    if let Some(mut rest) = input.strip_prefix('(') {
        let mut words = Vec::new();
        loop {
            (rest, _) = space0(rest)?;
            if let Some(after) = rest.strip_prefix(')') {
                return Ok((after, words));
            }
            if rest.is_empty() {
                return Err(ExprError::failure(input, ExprErrorKind::Unbalanced(')')));
            }
            let (after, text) = take_word(rest)?;
            words.push(Word::new(text));
            rest = after;
        }
    }
    match input.chars().next() {
        Some(c) if !(c.is_whitespace() || SPECIAL_CHARS.contains(c)) || c == '\\' => {
            let (rest, text) = take_word(input)?;
            Ok((rest, vec![Word::new(text)]))
        }
        _ => Ok((input, Vec::new())),
    }
}

struct TagParts {
    name: String,
    substitution: Option<Vec<Word>>,
    converters: Vec<String>,
}

/// `{name}`, `{name:output}`, `{name!conv}` and combinations.
fn parse_tag(input: &str) -> PResult<'_, Option<TagParts>> {
    let Some(rest) = input.strip_prefix('{') else {
        return Ok((input, None));
    };
    let (rest, name) = take_name(rest, "-")?;
    let (rest, substitution) = match rest.strip_prefix(':') {
        Some(after) => {
            let (after, words) = parse_substitution_output(after)?;
            (after, Some(words))
        }
        None => (rest, None),
    };
    let (rest, converters) = parse_converters(rest)?;
    let Some(rest) = rest.strip_prefix('}') else {
        return Err(ExprError::failure(input, ExprErrorKind::Unbalanced('}')));
    };
    Ok((
        rest,
        Some(TagParts {
            name,
            substitution,
            converters,
        }),
    ))
}

/// A chain of `!converter` names.
fn parse_converters(mut input: &str) -> PResult<'_, Vec<String>> {
    let mut converters = Vec::new();
    while let Some(rest) = input.strip_prefix('!') {
        let (rest, name) = take_name(rest, "")?;
        converters.push(name);
        input = rest;
    }
    Ok((input, converters))
}

fn group_from_branches(branches: Vec<Sequence>) -> Expression {
    if branches.len() == 1 {
        let mut only = branches.into_iter().next().unwrap();
        only.weight = 1.0;
        Expression::Sequence(only)
    } else {
        Expression::Sequence(Sequence::alternative(
            branches.into_iter().map(Expression::Sequence).collect(),
        ))
    }
}

fn parse_atom(input: &str) -> PResult<'_, Expression> {
    if let Some(rest) = input.strip_prefix('(') {
        let (rest, branches) = parse_expr_list(rest, ')')?;
        Ok((rest, group_from_branches(branches)))
    } else if let Some(rest) = input.strip_prefix('[') {
        let (rest, branches) = parse_expr_list(rest, ']')?;
        Ok((
            rest,
            Expression::Sequence(Sequence::optional(
                branches.into_iter().map(Expression::Sequence).collect(),
            )),
        ))
    } else if let Some(rest) = input.strip_prefix('<') {
        let (after, name) = take_name(rest, ".")?;
        let Some(after) = after.strip_prefix('>') else {
            return Err(ExprError::failure(input, ExprErrorKind::Unbalanced('>')));
        };
        Ok((after, Expression::RuleRef(name)))
    } else if let Some(rest) = input.strip_prefix('$') {
        let (after, name) = take_name(rest, "/-.")?;
        Ok((after, Expression::SlotRef(name)))
    } else if let Some((rest, range)) = try_number_range(input)? {
        Ok((rest, Expression::NumberRange(range)))
    } else {
        let (rest, text) = take_word(input)?;
        Ok((rest, Expression::Word(Word::new(text))))
    }
}

fn attach_converters(expr: Expression, converters: Vec<String>) -> Expression {
    if converters.is_empty() {
        return expr;
    }
    match expr {
        Expression::Word(mut w) => {
            w.converters.extend(converters);
            Expression::Word(w)
        }
        Expression::Sequence(mut s) => {
            s.converters.extend(converters);
            Expression::Sequence(s)
        }
        Expression::Tag(mut t) => {
            t.converters.extend(converters);
            Expression::Tag(t)
        }
        other => {
            let mut wrapper = Sequence::sequence(vec![other]);
            wrapper.converters = converters;
            Expression::Sequence(wrapper)
        }
    }
}

fn attach_substitution(expr: Expression, output: Vec<Word>) -> Expression {
    match expr {
        Expression::Word(mut w) if output.len() <= 1 => {
            w.substitution = Some(output.first().map(|o| o.text.clone()).unwrap_or_default());
            Expression::Word(w)
        }
        Expression::Sequence(mut s) => {
            s.substitution = Some(output);
            Expression::Sequence(s)
        }
        other => {
            let mut wrapper = Sequence::sequence(vec![other]);
            wrapper.substitution = Some(output);
            Expression::Sequence(wrapper)
        }
    }
}

/// One sequence element: an atom with optional substitution, tag and
/// converter chain.
fn parse_seq_elem(input: &str) -> PResult<'_, Expression> {
    let (rest, atom) = parse_atom(input)?;
    let (rest, substitution) = match rest.strip_prefix(':') {
        Some(after) => {
            let (after, words) = parse_substitution_output(after)?;
            (after, Some(words))
        }
        None => (rest, None),
    };
    let (rest, tag) = parse_tag(rest)?;
    let (rest, converters) = parse_converters(rest)?;

    let mut expr = match substitution {
        Some(words) => attach_substitution(atom, words),
        None => atom,
    };
    if let Some(parts) = tag {
        expr = Expression::Tag(Tag {
            name: parts.name,
            inner: Box::new(expr),
            substitution: parts.substitution,
            converters: parts.converters,
        });
    }
    Ok((rest, attach_converters(expr, converters)))
}

/// A whitespace-separated run of sequence elements. Stops before `|` and
/// any closing delimiter.
fn parse_expr(mut input: &str) -> PResult<'_, Vec<Expression>> {
    let mut items = Vec::new();
    loop {
        let (rest, _) = space0(input)?;
        match rest.chars().next() {
            None | Some('|') | Some(')') | Some(']') | Some('}') => return Ok((rest, items)),
            _ => {}
        }
        let (rest, elem) = parse_seq_elem(rest)?;
        items.push(elem);
        input = rest;
    }
}

/// The interior of a group: `|`-separated branches with optional weights,
/// closed by `closer`.
fn parse_expr_list(input: &str, closer: char) -> PResult<'_, Vec<Sequence>> {
    let mut branches = Vec::new();
    let mut rest = input;
    loop {
        let branch_start = rest;
        let (r, _) = space0(rest)?;
        let (r, weight) = parse_branch_weight(r)?;
        let (r, items) = parse_expr(r)?;
        if items.is_empty() {
            return Err(ExprError::failure(
                branch_start,
                ExprErrorKind::EmptyAlternative,
            ));
        }
        let mut branch = Sequence::sequence(items);
        branch.weight = weight.unwrap_or(1.0);
        branches.push(branch);
        if let Some(after) = r.strip_prefix('|') {
            rest = after;
            continue;
        }
        if let Some(after) = r.strip_prefix(closer) {
            return Ok((after, branches));
        }
        let at = if r.is_empty() { input } else { r };
        return Err(ExprError::failure(at, ExprErrorKind::Unbalanced(closer)));
    }
}

fn convert_error(err: ExprError<'_>, body: &str, source: &str, line: usize) -> ParseError {
    let offset = body.len().saturating_sub(err.input.len());
    let location = Location {
        source: source.to_string(),
        line,
        column: body[..offset.min(body.len())].chars().count() + 1,
    };
    let span = shorten(err.input);
    match err.kind {
        ExprErrorKind::Unbalanced(delimiter) => ParseError::UnbalancedDelimiter {
            location,
            delimiter,
            span,
        },
        ExprErrorKind::EmptyAlternative => ParseError::EmptyAlternative { location, span },
        ExprErrorKind::UnknownEscape(escape) => ParseError::UnknownEscape { location, escape },
        ExprErrorKind::DanglingEscape => ParseError::UnknownEscape {
            location,
            escape: ' ',
        },
        ExprErrorKind::MalformedWeight(w) => ParseError::MalformedWeight {
            location,
            span: w,
        },
        ExprErrorKind::MalformedRange(r) => ParseError::MalformedRange {
            location,
            span: r,
        },
        ExprErrorKind::Nom(_) => ParseError::Expression { location, span },
    }
}

/// Parses one sentence body into its expression.
fn parse_expression(body: &str, source: &str, line: usize) -> Result<Expression, ParseError> {
    match parse_expr(body) {
        Ok((rest, items)) => {
            let trailing = rest.trim_start();
            if !trailing.is_empty() {
                let err = match trailing.chars().next().unwrap() {
                    c @ (')' | ']' | '}' | '|') => ExprError::new(rest, ExprErrorKind::Unbalanced(c)),
                    _ => ExprError::new(rest, ExprErrorKind::Nom(ErrorKind::Eof)),
                };
                return Err(convert_error(err, body, source, line));
            }
            if items.is_empty() {
                return Err(convert_error(
                    ExprError::new(body, ExprErrorKind::Nom(ErrorKind::NonEmpty)),
                    body,
                    source,
                    line,
                ));
            }
            Ok(Expression::Sequence(Sequence::sequence(items)))
        }
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(convert_error(e, body, source, line)),
        Err(nom::Err::Incomplete(_)) => Err(ParseError::Expression {
            location: Location {
                source: source.to_string(),
                line,
                column: 1,
            },
            span: shorten(body),
        }),
    }
}

/// Parses a standalone sentence body, e.g. a slot value.
pub fn parse_sentence(text: &str) -> Result<Expression, ParseError> {
    parse_expression(text.trim(), "<sentence>", 1)
}

// ---------------------------------------------------------------------------
// Line handling
// ---------------------------------------------------------------------------

/// Cuts a `#` or `;` comment: at column 0 or preceded by whitespace, and
/// not escaped.
fn strip_comment(line: &str) -> &str {
    let mut prev_is_space = true;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            prev_is_space = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            prev_is_space = false;
            continue;
        }
        if (c == '#' || c == ';') && prev_is_space {
            return &line[..i];
        }
        prev_is_space = c.is_whitespace();
    }
    line
}

/// `[IntentName]` alone on a line. Word characters only, so an optional
/// group can never be mistaken for a header.
fn section_header(line: &str) -> Option<&str> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    if !inner.is_empty() && inner.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Some(inner)
    } else {
        None
    }
}

/// `name = body` with a valid rule identifier on the left.
fn rule_line(line: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = line.split_once('=')?;
    let name = lhs.trim();
    let mut chars = name.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some((name, rhs.trim()))
    } else {
        None
    }
}

/// Parses a template text into a [`Grammar`].
///
/// # Errors
///
/// Returns a [`ParseError`] carrying source name, line and column on the
/// first malformed line.
pub fn parse(text: &str, options: &ParseOptions<'_>) -> Result<Grammar, ParseError> {
    let source = options.source_name.as_deref().unwrap_or("<input>");
    let transform = |s: &str| match options.sentence_transform {
        Some(f) => f(s),
        None => s.to_string(),
    };

    let mut grammar = Grammar::default();
    // Current section and whether the intent filter keeps it.
    let mut current: Option<(String, bool)> = None;
    let mut lines = text.lines().enumerate();

    while let Some((idx, raw)) = lines.next() {
        let line_no = idx + 1;
        let mut content = strip_comment(raw).trim_end().to_string();
        while content.ends_with('\\') {
            content.pop();
            let Some((_, next)) = lines.next() else { break };
            content.push(' ');
            content.push_str(strip_comment(next).trim());
        }
        let line = content.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(name) = section_header(line) {
            let enabled = options
                .intent_filter
                .as_ref()
                .map_or(true, |filter| filter.contains(name));
            if enabled {
                grammar.ensure_intent(name);
            }
            current = Some((name.to_string(), enabled));
            continue;
        }

        let Some((intent, enabled)) = &current else {
            return Err(ParseError::SentenceOutsideSection {
                location: Location {
                    source: source.to_string(),
                    line: line_no,
                    column: 1,
                },
                span: shorten(line),
            });
        };
        if !*enabled {
            continue;
        }

        if let Some((rule_name, body)) = rule_line(line) {
            let expr = parse_expression(&transform(body), source, line_no)?;
            if grammar.add_rule(intent, rule_name, expr).is_some() {
                log::warn!(
                    "Rule `{rule_name}` in intent `{intent}` is defined more than once. \
                     The later definition replaces the earlier one."
                );
            }
        } else {
            let expr = parse_expression(&transform(line), source, line_no)?;
            grammar.add_sentence(intent, expr);
        }
    }
    Ok(grammar)
}
