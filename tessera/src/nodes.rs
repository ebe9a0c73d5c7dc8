//! The compiled form of a template: a tree of nodes rendered depth first.
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::TesseraResult;
use crate::filter_expression::FilterExpression;
use crate::safe::render_value_in_context;
use crate::tags::conditionals::{IfEqualNode, IfNode};
use crate::tags::inheritance::{BlockNode, ExtendsNode, IncludeNode};
use crate::tags::loops::{CycleNode, ForNode, IfChangedNode};
use crate::tags::output::{
    AutoescapeNode, FilterNode, FirstOfNode, SpacelessNode, WidthRatioNode,
};
use crate::tags::scope::WithNode;
use crate::utils::Span;
use crate::Value;

/// A node defined outside of this crate, returned by a custom tag compiler.
pub trait CustomNode: fmt::Debug + Send + Sync {
    /// What [`NodeType::Custom`] matches against
    fn name(&self) -> &str;

    fn render(&self, context: &mut Context) -> TesseraResult<String>;

    /// The node lists this node owns, for [`Node::get_nodes_by_type`]
    fn nodelists(&self) -> Vec<&NodeList> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeType {
    Text,
    Variable,
    For,
    Cycle,
    IfChanged,
    IfEqual,
    If,
    Comment,
    Autoescape,
    Filter,
    FirstOf,
    Spaceless,
    With,
    Verbatim,
    Load,
    WidthRatio,
    Include,
    Extends,
    Block,
    TemplateTag,
    Custom(String),
}

/// `{{ expression }}`
#[derive(Debug, Clone)]
pub struct VariableNode {
    expr: FilterExpression,
}

impl VariableNode {
    pub fn new(expr: FilterExpression) -> Self {
        Self { expr }
    }

    pub fn expr(&self) -> &FilterExpression {
        &self.expr
    }

    fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let value = self.expr.resolve(context, false)?;
        Ok(render_value_in_context(&value, context))
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(String),
    Variable(VariableNode),
    For(ForNode),
    Cycle(CycleNode),
    IfChanged(IfChangedNode),
    IfEqual(IfEqualNode),
    If(IfNode),
    Comment,
    Autoescape(AutoescapeNode),
    Filter(FilterNode),
    FirstOf(FirstOfNode),
    Spaceless(SpacelessNode),
    With(WithNode),
    /// The untouched content of a `{% verbatim %}` block
    Verbatim(String),
    Load,
    WidthRatio(WidthRatioNode),
    Include(IncludeNode),
    Extends(ExtendsNode),
    Block(BlockNode),
    /// The output of a `{% templatetag %}`
    TemplateTag(String),
    Custom(Arc<dyn CustomNode>),
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Text(_) => NodeType::Text,
            Node::Variable(_) => NodeType::Variable,
            Node::For(_) => NodeType::For,
            Node::Cycle(_) => NodeType::Cycle,
            Node::IfChanged(_) => NodeType::IfChanged,
            Node::IfEqual(_) => NodeType::IfEqual,
            Node::If(_) => NodeType::If,
            Node::Comment => NodeType::Comment,
            Node::Autoescape(_) => NodeType::Autoescape,
            Node::Filter(_) => NodeType::Filter,
            Node::FirstOf(_) => NodeType::FirstOf,
            Node::Spaceless(_) => NodeType::Spaceless,
            Node::With(_) => NodeType::With,
            Node::Verbatim(_) => NodeType::Verbatim,
            Node::Load => NodeType::Load,
            Node::WidthRatio(_) => NodeType::WidthRatio,
            Node::Include(_) => NodeType::Include,
            Node::Extends(_) => NodeType::Extends,
            Node::Block(_) => NodeType::Block,
            Node::TemplateTag(_) => NodeType::TemplateTag,
            Node::Custom(c) => NodeType::Custom(c.name().to_string()),
        }
    }

    pub fn render(&self, context: &mut Context) -> TesseraResult<String> {
        match self {
            Node::Text(s) | Node::Verbatim(s) | Node::TemplateTag(s) => Ok(s.clone()),
            Node::Comment | Node::Load => Ok(String::new()),
            Node::Variable(n) => n.render(context),
            Node::For(n) => n.render(context),
            Node::Cycle(n) => n.render(context),
            Node::IfChanged(n) => n.render(context),
            Node::IfEqual(n) => n.render(context),
            Node::If(n) => n.render(context),
            Node::Autoescape(n) => n.render(context),
            Node::Filter(n) => n.render(context),
            Node::FirstOf(n) => n.render(context),
            Node::Spaceless(n) => n.render(context),
            Node::With(n) => n.render(context),
            Node::WidthRatio(n) => n.render(context),
            Node::Include(n) => n.render(context),
            Node::Extends(n) => n.render(context),
            Node::Block(n) => n.render(context),
            Node::Custom(n) => n.render(context),
        }
    }

    /// The node lists directly owned by this node.
    pub fn nodelists(&self) -> Vec<&NodeList> {
        match self {
            Node::For(n) => vec![&n.nodelist_loop, &n.nodelist_empty],
            Node::IfChanged(n) => vec![&n.nodelist_true, &n.nodelist_false],
            Node::IfEqual(n) => vec![&n.nodelist_true, &n.nodelist_false],
            Node::If(n) => n.branches.iter().map(|(_, nodelist)| nodelist).collect(),
            Node::Autoescape(n) => vec![&n.nodelist],
            Node::Filter(n) => vec![&n.nodelist],
            Node::Spaceless(n) => vec![&n.nodelist],
            Node::With(n) => vec![&n.nodelist],
            Node::Extends(n) => vec![&n.nodelist],
            Node::Block(n) => vec![n.nodelist.as_ref()],
            Node::Custom(n) => n.nodelists(),
            _ => Vec::new(),
        }
    }

    /// This node if it has the given type followed by all the matching nodes below it,
    /// in source order.
    pub fn get_nodes_by_type(&self, kind: &NodeType) -> Vec<&Node> {
        let mut out = Vec::new();
        self.collect_nodes(kind, &mut out);
        out
    }

    fn collect_nodes<'a>(&'a self, kind: &NodeType, out: &mut Vec<&'a Node>) {
        if &self.node_type() == kind {
            out.push(self);
        }
        for nodelist in self.nodelists() {
            for node in nodelist.iter() {
                node.collect_nodes(kind, out);
            }
        }
    }
}

/// An ordered sequence of nodes, rendered by concatenating their output.
///
/// Nodes compiled in debug mode keep the span of the token they come from and errors
/// raised while rendering them point there.
#[derive(Debug, Clone, Default)]
pub struct NodeList {
    nodes: Vec<(Node, Option<Span>)>,
    contains_nontext: bool,
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node, span: Option<Span>) {
        if !matches!(node, Node::Text(_)) {
            self.contains_nontext = true;
        }
        self.nodes.push((node, span));
    }

    /// Whether anything else than text was added
    pub fn contains_nontext(&self) -> bool {
        self.contains_nontext
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().map(|(node, _)| node)
    }

    /// The first node that isn't text, if any.
    pub fn first_nontext(&self) -> Option<&Node> {
        self.iter().find(|n| !matches!(n, Node::Text(_)))
    }

    pub fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let mut out = String::new();
        for (node, span) in &self.nodes {
            let rendered = node
                .render(context)
                .map_err(|e| e.with_span(span.as_ref()))?;
            out.push_str(&rendered);
        }
        Ok(out)
    }

    /// The output of a node list is made of already escaped pieces: it is safe.
    pub fn render_safe(&self, context: &mut Context) -> TesseraResult<Value> {
        Ok(Value::safe_string(&self.render(context)?))
    }

    pub fn get_nodes_by_type(&self, kind: &NodeType) -> Vec<&Node> {
        let mut out = Vec::new();
        for node in self.iter() {
            node.collect_nodes(kind, &mut out);
        }
        out
    }
}
