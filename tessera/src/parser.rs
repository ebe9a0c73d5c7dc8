use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::errors::{Error, TesseraResult};
use crate::filter_expression::FilterExpression;
use crate::filters::StoredFilter;
use crate::lexer::{Token, TokenKind};
use crate::library::Library;
use crate::loader::Origin;
use crate::nodes::{Node, NodeList, NodeType, VariableNode};
use crate::tags::loops::CycleNode;
use crate::tessera::Environment;
use crate::utils::Span;
use crate::{HashMap, HashSet};

type TagFunc = dyn Fn(&mut Parser, Token) -> TesseraResult<Node> + Sync + Send + 'static;

/// A tag compiler: given the parser and the opening token, consume the tag's body and
/// return its node.
#[derive(Clone)]
pub struct StoredTag(Arc<TagFunc>);

impl StoredTag {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Parser, Token) -> TesseraResult<Node> + Sync + Send + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, parser: &mut Parser, token: Token) -> TesseraResult<Node> {
        (self.0)(parser, token)
    }
}

impl fmt::Debug for StoredTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoredTag")
    }
}

/// Callbacks around the compilation of each block tag.
///
/// The default implementations do nothing. [`SourceHooks`] is what debug mode uses to
/// point errors at the token that caused them.
pub trait ParseHooks: Send {
    fn enter_command(&mut self, _command: &str, _token: &Token) {}

    fn exit_command(&mut self) {}

    /// Called with every error raised while compiling `token`.
    fn decorate_error(&self, error: Error, _token: &Token) -> Error {
        error
    }
}

#[derive(Debug, Default)]
pub struct NoHooks;

impl ParseHooks for NoHooks {}

/// Attaches the span of the offending token to errors.
#[derive(Debug, Default)]
pub struct SourceHooks {
    open: Vec<(String, Option<Span>)>,
}

impl SourceHooks {
    /// The tags currently being compiled, outermost first
    pub fn open_commands(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(|(c, _)| c.as_str())
    }
}

impl ParseHooks for SourceHooks {
    fn enter_command(&mut self, command: &str, token: &Token) {
        self.open.push((command.to_string(), token.span.clone()));
    }

    fn exit_command(&mut self) {
        self.open.pop();
    }

    fn decorate_error(&self, error: Error, token: &Token) -> Error {
        error.with_span(token.span.as_ref())
    }
}

/// Formats `['a', 'b', 'c']` as `'a', 'b' or 'c'`.
fn text_list(items: &[&str], last_word: &str) -> String {
    let quoted: Vec<_> = items.iter().map(|i| format!("'{i}'")).collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} {last_word} {last}", rest.join(", ")),
    }
}

/// Builds the node tree out of the tokens, handing block tags to their compilers.
pub struct Parser {
    tokens: VecDeque<Token>,
    tags: HashMap<String, StoredTag>,
    filters: HashMap<String, StoredFilter>,
    env: Arc<Environment>,
    origin: Origin,
    command_stack: Vec<(String, Token)>,
    hooks: Box<dyn ParseHooks>,
    /// `{% cycle ... as name %}` seen so far
    pub(crate) named_cycles: HashMap<String, CycleNode>,
    /// `{% block %}` names seen so far
    pub(crate) block_names: HashSet<String>,
    /// How many expressions starting with `block.super` were compiled
    pub(crate) block_super_refs: Cell<usize>,
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("origin", &self.origin)
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl Parser {
    /// A parser with the tags and filters of the environment. It uses [`SourceHooks`]
    /// when the environment is in debug mode.
    pub fn new(tokens: Vec<Token>, env: Arc<Environment>, origin: Origin) -> Self {
        let hooks: Box<dyn ParseHooks> = if env.debug {
            Box::new(SourceHooks::default())
        } else {
            Box::new(NoHooks)
        };
        Self {
            tokens: tokens.into(),
            tags: env.tags.clone(),
            filters: env.filters.clone(),
            env,
            origin,
            command_stack: Vec::new(),
            hooks,
            named_cycles: HashMap::new(),
            block_names: HashSet::new(),
            block_super_refs: Cell::new(0),
        }
    }

    pub fn with_hooks(mut self, hooks: impl ParseHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Parses until one of the `until` block tags is found, leaving it as the next token.
    ///
    /// Running out of tokens is an error unless `until` is empty.
    pub fn parse(&mut self, until: &[&str]) -> TesseraResult<NodeList> {
        let mut nodelist = NodeList::new();

        while let Some(token) = self.next_token() {
            match token.kind {
                TokenKind::Text => {
                    let span = token.span.clone();
                    nodelist.push(Node::Text(token.contents), span);
                }
                TokenKind::Variable => {
                    if token.contents.is_empty() {
                        return Err(self.error(Error::syntax("Empty variable tag"), &token));
                    }
                    let expr = self
                        .compile_filter(&token.contents)
                        .map_err(|e| self.error(e, &token))?;
                    nodelist.push(Node::Variable(VariableNode::new(expr)), token.span);
                }
                TokenKind::Block => {
                    let command = token.command().to_string();
                    if until.contains(&command.as_str()) {
                        self.prepend_token(token);
                        return Ok(nodelist);
                    }
                    if command.is_empty() {
                        return Err(self.error(Error::syntax("Empty block tag"), &token));
                    }
                    let node = self.compile_tag(&command, token.clone(), until, &nodelist)?;
                    nodelist.push(node, token.span);
                }
                TokenKind::Comment => (),
            }
        }

        if !until.is_empty() {
            return Err(self.unclosed_tag(until));
        }
        Ok(nodelist)
    }

    fn compile_tag(
        &mut self,
        command: &str,
        token: Token,
        until: &[&str],
        nodelist: &NodeList,
    ) -> TesseraResult<Node> {
        let Some(tag) = self.tags.get(command).cloned() else {
            let message = if until.is_empty() {
                format!("Invalid block tag: '{command}'")
            } else {
                format!(
                    "Invalid block tag: '{command}', expected {}",
                    text_list(until, "or")
                )
            };
            return Err(self.error(Error::syntax(message), &token));
        };

        trace!(command, line = token.line_no, "compiling tag");
        self.hooks.enter_command(command, &token);
        self.command_stack.push((command.to_string(), token.clone()));
        let res = tag.call(self, token.clone());
        self.command_stack.pop();
        self.hooks.exit_command();

        let node = res.map_err(|e| self.error(e, &token))?;
        if matches!(node, Node::Extends(_)) && nodelist.contains_nontext() {
            return Err(self.error(
                Error::syntax(format!(
                    "'{}' must be the first tag in the template.",
                    token.contents
                )),
                &token,
            ));
        }
        Ok(node)
    }

    fn error(&self, error: Error, token: &Token) -> Error {
        self.hooks.decorate_error(error, token)
    }

    fn unclosed_tag(&self, until: &[&str]) -> Error {
        let looking_for = until.join(", ");
        match self.command_stack.last() {
            Some((command, token)) => self.error(
                Error::syntax(format!(
                    "Unclosed tag '{command}'. Looking for one of: {looking_for}"
                )),
                token,
            ),
            None => Error::syntax(format!("Unclosed tag. Looking for one of: {looking_for}")),
        }
    }

    /// Discards tokens up to and including the block tag whose contents are `end_tag`.
    pub fn skip_past(&mut self, end_tag: &str) -> TesseraResult<()> {
        while let Some(token) = self.next_token() {
            if token.kind == TokenKind::Block && token.contents == end_tag {
                return Ok(());
            }
        }
        Err(self.unclosed_tag(&[end_tag]))
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.tokens.pop_front()
    }

    /// Like [`Parser::next_token`] but running out of tokens is an unclosed tag error.
    pub fn expect_token(&mut self, until: &[&str]) -> TesseraResult<Token> {
        match self.next_token() {
            Some(t) => Ok(t),
            None => Err(self.unclosed_tag(until)),
        }
    }

    pub fn prepend_token(&mut self, token: Token) {
        self.tokens.push_front(token);
    }

    pub fn delete_first_token(&mut self) {
        self.tokens.pop_front();
    }

    pub fn compile_filter(&self, token: &str) -> TesseraResult<FilterExpression> {
        let mut expr = FilterExpression::new(token, self)?;
        let block_super = expr.variables().any(|var| {
            matches!(var.lookups(), Some([first, second, ..]) if first == "block" && second == "super")
        });
        expr.block_super = block_super;
        if expr.block_super {
            self.block_super_refs.set(self.block_super_refs.get() + 1);
        }
        Ok(expr)
    }

    pub fn find_filter(&self, name: &str) -> TesseraResult<StoredFilter> {
        self.filters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::syntax(format!("Invalid filter: '{name}'")))
    }

    /// Makes the tags and filters of the library available for the rest of the template.
    pub fn add_library(&mut self, library: &Library) {
        for (name, tag) in library.tags() {
            self.tags.insert(name.to_string(), tag.clone());
        }
        for (name, filter) in library.filters() {
            self.filters.insert(name.to_string(), filter.clone());
        }
    }

    /// Parses `key=value` arguments, or `value as key and value as key` when
    /// `support_legacy` is set and the first bit isn't in the `key=value` form.
    ///
    /// Consumed bits are removed from `bits`, parsing stops at the first bit that doesn't fit.
    pub fn token_kwargs(
        &self,
        bits: &mut Vec<String>,
        support_legacy: bool,
    ) -> TesseraResult<Vec<(String, FilterExpression)>> {
        fn split_kwarg(bit: &str) -> Option<(&str, &str)> {
            let (key, value) = bit.split_once('=')?;
            let is_word = !key.is_empty() && key.chars().all(|c| c.is_alphanumeric() || c == '_');
            (is_word && !value.is_empty()).then_some((key, value))
        }

        let mut kwargs = Vec::new();
        let Some(first) = bits.first() else {
            return Ok(kwargs);
        };
        let kwarg_format = split_kwarg(first).is_some();
        if !kwarg_format && (!support_legacy || bits.len() < 3 || bits[1] != "as") {
            return Ok(kwargs);
        }

        while !bits.is_empty() {
            let (key, value) = if kwarg_format {
                let Some((key, value)) = split_kwarg(&bits[0]) else {
                    return Ok(kwargs);
                };
                let pair = (key.to_string(), value.to_string());
                bits.remove(0);
                pair
            } else {
                if bits.len() < 3 || bits[1] != "as" {
                    return Ok(kwargs);
                }
                let pair = (bits[2].clone(), bits[0].clone());
                bits.drain(..3);
                pair
            };
            kwargs.push((key, self.compile_filter(&value)?));

            if !kwarg_format && !bits.is_empty() {
                if bits[0] != "and" {
                    return Ok(kwargs);
                }
                bits.remove(0);
            }
        }

        Ok(kwargs)
    }

    /// Whether something in `nodelist` is a node of that type. Used by tags that can
    /// only appear once.
    pub(crate) fn contains_type(nodelist: &NodeList, kind: &NodeType) -> bool {
        !nodelist.get_nodes_by_type(kind).is_empty()
    }
}
