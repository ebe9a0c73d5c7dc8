//! Template composition: `{% include %}`, `{% extends %}` and `{% block %}`
use std::sync::Arc;

use crate::context::{Context, Frame, StateKey};
use crate::errors::{Error, ErrorKind, TesseraResult};
use crate::filter_expression::FilterExpression;
use crate::lexer::Token;
use crate::nodes::{Node, NodeList, NodeType};
use crate::parser::Parser;
use crate::template::Template;
use crate::tessera::Environment;
use crate::value::{Key, Map};
use crate::{HashMap, Value};

const BLOCK_CONTEXT: StateKey = StateKey::shared("block_context");
const EXTENDS_HISTORY: StateKey = StateKey::shared("extends_history");
const BLOCK_SUPER: StateKey = StateKey::shared("block_super");

/// The `block.super` of a block being rendered. The parent block only renders when the
/// child reads it, so its side effects happen where and if the child asks for it.
enum SuperState {
    Pending(BlockNode),
    Rendered,
}

fn push_super(context: &mut Context, state: SuperState) {
    let rc = context.render_context_mut();
    match rc.get_mut::<Vec<SuperState>>(&BLOCK_SUPER) {
        Some(stack) => stack.push(state),
        None => rc.insert(BLOCK_SUPER, vec![state]),
    }
}

fn pop_super(context: &mut Context) {
    if let Some(stack) = context
        .render_context_mut()
        .get_mut::<Vec<SuperState>>(&BLOCK_SUPER)
    {
        stack.pop();
    }
}

/// Renders the parent of the innermost block being rendered, if not done already, and
/// exposes it as `block.super`.
pub(crate) fn render_block_super(context: &mut Context) -> TesseraResult<()> {
    let Some(state) = context
        .render_context_mut()
        .get_mut::<Vec<SuperState>>(&BLOCK_SUPER)
        .and_then(|stack| stack.last_mut())
    else {
        return Ok(());
    };
    let SuperState::Pending(block) = std::mem::replace(state, SuperState::Rendered) else {
        return Ok(());
    };

    let rendered = block.render(context)?;
    let mut map = Map::new();
    map.insert(Key::from("super"), Value::safe_string(&rendered));
    context.set_upward("block", Value::Map(Arc::new(map)));
    Ok(())
}

/// The blocks of every template in the inheritance chain, most derived last.
#[derive(Debug, Default)]
struct BlockContext {
    blocks: HashMap<String, Vec<BlockNode>>,
}

impl BlockContext {
    /// Adds the blocks of a template higher up in the chain than everything seen so far
    fn add_blocks<'a>(&mut self, blocks: impl Iterator<Item = &'a BlockNode>) {
        for block in blocks {
            self.blocks
                .entry(block.name.clone())
                .or_default()
                .insert(0, block.clone());
        }
    }

    fn pop(&mut self, name: &str) -> Option<BlockNode> {
        self.blocks.get_mut(name)?.pop()
    }

    fn push(&mut self, name: &str, block: BlockNode) {
        self.blocks.entry(name.to_string()).or_default().push(block);
    }

    fn has_block(&self, name: &str) -> bool {
        self.blocks.get(name).is_some_and(|b| !b.is_empty())
    }
}

fn current_env(context: &Context) -> TesseraResult<Arc<Environment>> {
    context
        .env
        .clone()
        .ok_or_else(|| Error::message("Templates can only be loaded while rendering"))
}

#[derive(Debug, Clone)]
pub struct BlockNode {
    pub name: String,
    pub(crate) nodelist: Arc<NodeList>,
    uses_super: bool,
}

impl BlockNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let popped = context
            .render_context_mut()
            .get_mut::<BlockContext>(&BLOCK_CONTEXT)
            .map(|bc| bc.pop(&self.name));

        let Some(popped) = popped else {
            return self.render_body(context, false);
        };

        let block = popped.clone().unwrap_or_else(|| self.clone());
        let res = block.render_body(context, true);
        if let Some(popped) = popped {
            if let Some(bc) = context
                .render_context_mut()
                .get_mut::<BlockContext>(&BLOCK_CONTEXT)
            {
                bc.push(&self.name, popped);
            }
        }
        res
    }

    fn render_body(&self, context: &mut Context, in_chain: bool) -> TesseraResult<String> {
        let mut block = Map::new();
        if self.uses_super {
            let has_parent = in_chain
                && context
                    .render_context()
                    .get::<BlockContext>(&BLOCK_CONTEXT)
                    .is_some_and(|bc| bc.has_block(&self.name));
            let state = if has_parent {
                SuperState::Pending(self.clone())
            } else {
                block.insert(Key::from("super"), Value::safe_string(""));
                SuperState::Rendered
            };
            push_super(context, state);
        }

        let mut frame = Frame::new();
        frame.insert("block".into(), Value::Map(Arc::new(block)));
        let res = context.scoped(frame, |context| self.nodelist.render(context));
        if self.uses_super {
            pop_super(context);
        }
        res
    }
}

/// `{% block name %} ... {% endblock [name] %}`
pub(crate) fn do_block(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits: Vec<_> = token.contents.split_whitespace().collect();
    if bits.len() != 2 {
        return Err(Error::syntax(format!(
            "'{}' tag takes only one argument",
            bits[0]
        )));
    }
    let name = bits[1].to_string();
    if !parser.block_names.insert(name.clone()) {
        return Err(Error::syntax(format!(
            "'{}' tag with name '{name}' appears more than once",
            bits[0]
        )));
    }

    let outer_refs = parser.block_super_refs.replace(0);
    let nodelist = parser.parse(&["endblock"]);
    let uses_super = parser.block_super_refs.replace(outer_refs) > 0;
    let nodelist = nodelist?;

    let endblock = parser.expect_token(&["endblock"])?;
    let named_end = format!("endblock {name}");
    if endblock.contents != "endblock" && endblock.contents != named_end {
        return Err(Error::syntax(format!(
            "Invalid block tag: 'endblock', expected 'endblock' or '{named_end}'"
        )));
    }

    Ok(Node::Block(BlockNode {
        name,
        nodelist: Arc::new(nodelist),
        uses_super,
    }))
}

#[derive(Debug, Clone)]
pub struct ExtendsNode {
    parent_name: FilterExpression,
    pub(crate) nodelist: NodeList,
    blocks: Vec<BlockNode>,
    /// The name of the template this node is in
    template_name: String,
}

impl ExtendsNode {
    fn parent(&self, context: &mut Context) -> TesseraResult<Arc<Template>> {
        let parent = self.parent_name.resolve(context, false)?;
        let name = match parent.as_str() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => {
                let mut message = format!("Invalid template name in 'extends' tag: '{parent}'.");
                let from_variable = !self.parent_name.var().is_literal()
                    || self.parent_name.filter_names().next().is_some();
                if from_variable {
                    message.push_str(&format!(
                        " Got this from the '{}' variable.",
                        self.parent_name.token()
                    ));
                }
                return Err(Error::syntax(message));
            }
        };

        let rc = context.render_context_mut();
        if rc.get::<Vec<String>>(&EXTENDS_HISTORY).is_none() {
            rc.insert(EXTENDS_HISTORY, vec![self.template_name.clone()]);
        }
        let Some(history) = rc.get_mut::<Vec<String>>(&EXTENDS_HISTORY) else {
            return Err(Error::message("Inheritance history is missing"));
        };
        if history.contains(&name) {
            let mut chain = history.clone();
            chain.push(name.clone());
            return Err(Error::circular_extend(name, chain));
        }
        history.push(name.clone());

        current_env(context)?.get_template(&name)
    }

    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let parent = self.parent(context)?;

        let parent_blocks: Vec<BlockNode> =
            if matches!(parent.nodelist().first_nontext(), Some(Node::Extends(_))) {
                Vec::new()
            } else {
                parent
                    .nodelist()
                    .get_nodes_by_type(&NodeType::Block)
                    .into_iter()
                    .filter_map(|n| match n {
                        Node::Block(b) => Some(b.clone()),
                        _ => None,
                    })
                    .collect()
            };

        let rc = context.render_context_mut();
        if rc.get::<BlockContext>(&BLOCK_CONTEXT).is_none() {
            rc.insert(BLOCK_CONTEXT, BlockContext::default());
        }
        if let Some(bc) = rc.get_mut::<BlockContext>(&BLOCK_CONTEXT) {
            bc.add_blocks(self.blocks.iter());
            bc.add_blocks(parent_blocks.iter());
        }

        parent.render_nodelist(context)
    }
}

/// `{% extends "base.html" %}`: the rest of the template only matters for its blocks.
pub(crate) fn do_extends(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits = token.split_contents();
    if bits.len() != 2 {
        return Err(Error::syntax(format!("'{}' takes one argument", bits[0])));
    }
    let parent_name = parser.compile_filter(&bits[1])?;
    let nodelist = parser.parse(&[])?;
    if Parser::contains_type(&nodelist, &NodeType::Extends) {
        return Err(Error::syntax(format!(
            "'{}' cannot appear more than once in the same template",
            bits[0]
        )));
    }

    let blocks = nodelist
        .get_nodes_by_type(&NodeType::Block)
        .into_iter()
        .filter_map(|n| match n {
            Node::Block(b) => Some(b.clone()),
            _ => None,
        })
        .collect();

    Ok(Node::Extends(ExtendsNode {
        parent_name,
        nodelist,
        blocks,
        template_name: parser.origin().name.clone(),
    }))
}

type IncludeCache = HashMap<Vec<String>, Arc<Template>>;

#[derive(Debug, Clone)]
pub struct IncludeNode {
    template: FilterExpression,
    extra: Vec<(String, FilterExpression)>,
    isolated: bool,
    cache_key: StateKey,
}

impl IncludeNode {
    fn template(&self, context: &mut Context) -> TesseraResult<Arc<Template>> {
        let names = match self.template.resolve(context, false)? {
            Value::String(s, _) => vec![s.to_string()],
            Value::Array(arr) => arr.iter().map(|v| v.render_to_string()).collect(),
            other => {
                return Err(Error::message(format!(
                    "Invalid template name in 'include' tag: '{other}'."
                )))
            }
        };

        let cached = context
            .render_context()
            .get::<IncludeCache>(&self.cache_key)
            .and_then(|cache| cache.get(&names))
            .cloned();
        if let Some(template) = cached {
            return Ok(template);
        }

        let template = current_env(context)?.select_template(&names)?;
        let rc = context.render_context_mut();
        match rc.get_mut::<IncludeCache>(&self.cache_key) {
            Some(cache) => {
                cache.insert(names, template.clone());
            }
            None => {
                let mut cache = IncludeCache::new();
                cache.insert(names, template.clone());
                rc.insert(self.cache_key, cache);
            }
        }
        Ok(template)
    }

    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let template = self.template(context)?;
        let mut frame = Frame::new();
        for (name, expr) in &self.extra {
            frame.insert(name.clone().into(), expr.resolve(context, false)?);
        }

        if self.isolated {
            let mut isolated = Context::new();
            isolated.set_autoescape(context.autoescape());
            isolated.push_frame(frame);
            return template.render(&mut isolated);
        }
        context.scoped(frame, |context| template.render(context))
    }
}

/// `{% include "name" [with a=b ...] [only] %}`
pub(crate) fn do_include(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits = token.split_contents();
    if bits.len() < 2 {
        return Err(Error::syntax(format!(
            "'{}' tag takes at least one argument: the name of the template to be included.",
            bits[0]
        )));
    }

    let mut extra = None;
    let mut isolated = false;
    let mut remaining = bits[2..].to_vec();
    while !remaining.is_empty() {
        let option = remaining.remove(0);
        let seen = match option.as_str() {
            "with" => extra.is_some(),
            "only" => isolated,
            _ => {
                return Err(Error::syntax(format!(
                    "Unknown argument for '{}' tag: '{option}'.",
                    bits[0]
                )))
            }
        };
        if seen {
            return Err(Error::syntax(format!(
                "The '{option}' option was specified more than once."
            )));
        }

        if option == "with" {
            let kwargs = parser.token_kwargs(&mut remaining, false)?;
            if kwargs.is_empty() {
                return Err(Error::syntax(format!(
                    "\"with\" in '{}' tag needs at least one keyword argument.",
                    bits[0]
                )));
            }
            extra = Some(kwargs);
        } else {
            isolated = true;
        }
    }

    Ok(Node::Include(IncludeNode {
        template: parser.compile_filter(&bits[1])?,
        extra: extra.unwrap_or_default(),
        isolated,
        cache_key: StateKey::fresh("include"),
    }))
}

/// Whether the error means a template could not be found
pub(crate) fn is_not_found(error: &Error) -> bool {
    matches!(error.kind, ErrorKind::TemplateNotFound(_))
}
