//! `value|filter:arg|other` expressions.
//!
//! The grammar, scanned left to right with every match starting exactly where the
//! previous one ended:
//!
//! ```text
//! expression := base clause*
//! base       := constant | var
//! clause     := ws* "|" ws* name (":" (constant | var))?
//! constant   := '"' ([^"\\] | \\.)* '"' | "'" ([^'\\] | \\.)* "'"
//! var        := [\w.]+ | [-+.]? digit [digit . e]*
//! name       := \w+
//! ```
use std::fmt;

use tracing::warn;

use crate::args::Args;
use crate::context::Context;
use crate::errors::{Error, TesseraResult};
use crate::filters::StoredFilter;
use crate::lexer::quoted_len;
use crate::parser::Parser;
use crate::tags::inheritance::render_block_super;
use crate::variable::{LookupMiss, Variable};
use crate::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterArg {
    /// A quoted string, always safe
    Constant(Value),
    /// Resolved against the context at render time
    Variable(Variable),
}

#[derive(Debug, Clone)]
struct FilterCall {
    name: String,
    filter: StoredFilter,
    arg: Option<FilterArg>,
}

#[derive(Debug, Clone)]
pub struct FilterExpression {
    token: String,
    /// The text of the base expression, used in the invalid placeholder
    var_text: String,
    var: Variable,
    filters: Vec<FilterCall>,
    /// Set by the parser when the expression reads `block.super`
    pub(crate) block_super: bool,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn skip_whitespace(s: &str, from: usize) -> usize {
    s[from..]
        .find(|c: char| !c.is_whitespace())
        .map(|i| from + i)
        .unwrap_or(s.len())
}

fn constant_len(s: &str) -> Option<usize> {
    if s.starts_with('"') || s.starts_with('\'') {
        quoted_len(s)
    } else {
        None
    }
}

/// A run of word chars and dots, or a number. 0 if neither starts `s`.
fn var_len(s: &str) -> usize {
    let word = s
        .find(|c: char| !(is_word_char(c) || c == '.'))
        .unwrap_or(s.len());
    if word > 0 {
        return word;
    }

    let bytes = s.as_bytes();
    let mut i = usize::from(matches!(bytes.first(), Some(b'-' | b'+' | b'.')));
    if !bytes.get(i).is_some_and(u8::is_ascii_digit) {
        return 0;
    }
    while bytes
        .get(i)
        .is_some_and(|b| b.is_ascii_digit() || *b == b'.' || *b == b'e')
    {
        i += 1;
    }
    i
}

struct ClauseMatch<'a> {
    /// Relative to the start of the clause
    len: usize,
    name: &'a str,
    /// (is the arg a constant, its text)
    arg: Option<(bool, &'a str)>,
}

fn match_clause(s: &str) -> Option<ClauseMatch<'_>> {
    let mut i = skip_whitespace(s, 0);
    if !s[i..].starts_with('|') {
        return None;
    }
    i = skip_whitespace(s, i + 1);
    let name_len = s[i..]
        .find(|c: char| !is_word_char(c))
        .unwrap_or(s.len() - i);
    if name_len == 0 {
        return None;
    }
    let name = &s[i..i + name_len];
    i += name_len;

    let mut arg = None;
    if let Some(rest) = s[i..].strip_prefix(':') {
        if let Some(len) = constant_len(rest) {
            arg = Some((true, &rest[..len]));
            i += 1 + len;
        } else {
            let len = var_len(rest);
            if len > 0 {
                arg = Some((false, &rest[..len]));
                i += 1 + len;
            }
        }
    }

    Some(ClauseMatch { len: i, name, arg })
}

/// The next filter clause at or after `from`, with its start offset.
fn find_clause(token: &str, from: usize) -> Option<(usize, ClauseMatch<'_>)> {
    token
        .char_indices()
        .map(|(i, _)| i)
        .filter(|i| *i >= from)
        .find_map(|i| match_clause(&token[i..]).map(|m| (i, m)))
}

impl FilterExpression {
    pub fn new(token: &str, parser: &Parser) -> TesseraResult<Self> {
        Self::parse(token, |name| parser.find_filter(name))
    }

    pub(crate) fn parse(
        token: &str,
        find_filter: impl Fn(&str) -> TesseraResult<StoredFilter>,
    ) -> TesseraResult<Self> {
        let base_len = constant_len(token).unwrap_or_else(|| var_len(token));
        let (var_text, mut upto) = if base_len > 0 {
            (&token[..base_len], base_len)
        } else {
            if let Some((start, _)) = find_clause(token, 0) {
                if start == 0 {
                    return Err(Error::syntax(format!(
                        "Could not find variable at start of {token}."
                    )));
                }
                return Err(Error::syntax(format!(
                    "Could not parse some characters: |{}|{}",
                    &token[..start],
                    &token[start..]
                )));
            }
            return Err(Error::syntax(format!(
                "Could not parse the remainder: '{token}' from '{token}'"
            )));
        };
        let var = Variable::new(var_text)?;

        let mut filters = Vec::new();
        while let Some((start, clause)) = find_clause(token, upto) {
            if start != upto {
                return Err(Error::syntax(format!(
                    "Could not parse some characters: {}|{}|{}",
                    &token[..upto],
                    &token[upto..start],
                    &token[start..]
                )));
            }

            let filter = find_filter(clause.name)?;
            let arg = match clause.arg {
                Some((true, text)) => Some(FilterArg::Constant(
                    Variable::new(text)?
                        .literal()
                        .cloned()
                        .unwrap_or(Value::Undefined)
                        .mark_safe(),
                )),
                Some((false, text)) => Some(FilterArg::Variable(Variable::new(text)?)),
                None => None,
            };
            filter.meta().check_args(clause.name, arg.is_some())?;

            filters.push(FilterCall {
                name: clause.name.to_string(),
                filter,
                arg,
            });
            upto = start + clause.len;
        }

        if upto != token.len() {
            return Err(Error::syntax(format!(
                "Could not parse the remainder: '{}' from '{token}'",
                &token[upto..]
            )));
        }

        Ok(Self {
            token: token.to_string(),
            var_text: var_text.to_string(),
            var,
            filters,
            block_super: false,
        })
    }

    /// The full expression text
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn var(&self) -> &Variable {
        &self.var
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|f| f.name.as_str())
    }

    pub fn filter_args(&self) -> impl Iterator<Item = Option<&FilterArg>> {
        self.filters.iter().map(|f| f.arg.as_ref())
    }

    /// Every variable the expression reads: the base first, then filter arguments.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        std::iter::once(&self.var).chain(self.filters.iter().filter_map(|f| match &f.arg {
            Some(FilterArg::Variable(v)) => Some(v),
            _ => None,
        }))
    }

    /// Resolves the base value and runs it through the filters.
    ///
    /// With `ignore_failures`, a lookup miss goes through the filters as `Undefined`.
    /// Otherwise it becomes the invalid placeholder: a non-empty placeholder is returned
    /// as is, skipping the filters, while an empty one goes through them as `""`.
    ///
    /// The context is mutable because reading `block.super` renders the parent block
    /// the first time.
    pub fn resolve(&self, context: &mut Context, ignore_failures: bool) -> TesseraResult<Value> {
        if self.block_super {
            render_block_super(context)?;
        }
        let context = &*context;

        let mut obj = match self.var.resolve(context) {
            Ok(v) => v,
            Err(LookupMiss) if ignore_failures => Value::Undefined,
            Err(LookupMiss) => {
                let invalid = context
                    .env
                    .as_ref()
                    .map(|env| env.string_if_invalid())
                    .unwrap_or("");
                if !invalid.is_empty() {
                    warn!(expression = %self.token, "variable lookup failed, using the invalid placeholder");
                    return Ok(Value::from(invalid.replace("%s", &self.var_text)));
                }
                Value::from("")
            }
        };

        for call in &self.filters {
            let meta = call.filter.meta();
            let mut args = Args::new(call.name.as_str(), Vec::with_capacity(2));
            match &call.arg {
                Some(FilterArg::Constant(v)) => args.push(v.clone()),
                Some(FilterArg::Variable(v)) => {
                    args.push(v.resolve(context).unwrap_or(Value::Undefined))
                }
                None => (),
            }
            if meta.needs_autoescape {
                args.push(Value::Bool(context.autoescape()));
            }

            let new_obj = call.filter.call(&obj, args).map_err(|e| {
                let message = format!("Filter `{}` failed: {e}", call.name);
                Error::chain(message, e)
            })?;

            obj = if meta.is_safe && obj.is_safe() {
                new_obj.mark_safe()
            } else if obj.is_marked_for_escaping() {
                new_obj.mark_for_escaping()
            } else {
                new_obj
            };
        }

        Ok(obj)
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
