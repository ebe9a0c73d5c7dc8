//! `{% with %}` and `{% load %}`
use tracing::debug;

use crate::context::{Context, Frame};
use crate::errors::{Error, TesseraResult};
use crate::filter_expression::FilterExpression;
use crate::lexer::Token;
use crate::library::Library;
use crate::nodes::{Node, NodeList};
use crate::parser::Parser;

#[derive(Debug, Clone)]
pub struct WithNode {
    extra: Vec<(String, FilterExpression)>,
    pub(crate) nodelist: NodeList,
}

impl WithNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let mut frame = Frame::new();
        for (name, expr) in &self.extra {
            frame.insert(name.clone().into(), expr.resolve(context, false)?);
        }
        context.scoped(frame, |context| self.nodelist.render(context))
    }
}

/// `{% with a=b c=d %}` or `{% with b as a %} ... {% endwith %}`
pub(crate) fn do_with(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let mut bits = token.split_contents();
    let tag_name = bits.remove(0);
    let extra = parser.token_kwargs(&mut bits, true)?;
    if extra.is_empty() {
        return Err(Error::syntax(format!(
            "'{tag_name}' expected at least one variable assignment"
        )));
    }
    if let Some(bit) = bits.first() {
        return Err(Error::syntax(format!(
            "'{tag_name}' received an invalid token: '{bit}'"
        )));
    }
    let nodelist = parser.parse(&["endwith"])?;
    parser.delete_first_token();
    Ok(Node::With(WithNode { extra, nodelist }))
}

fn find_library(parser: &Parser, name: &str) -> TesseraResult<Library> {
    let env = parser.env();
    if let Some(lib) = env.libraries.get(name) {
        return Ok(lib.clone());
    }
    if let Some(ref loader) = env.loader {
        if let Some(lib) = loader.load_library(name)? {
            return Ok(lib);
        }
    }
    let mut known: Vec<_> = env.libraries.keys().map(|k| k.as_str()).collect();
    known.sort_unstable();
    Err(Error::syntax(format!(
        "'{name}' is not a registered tag library. Must be one of:\n{}",
        known.join("\n")
    )))
}

/// `{% load lib other %}` or `{% load name other_name from lib %}`
pub(crate) fn do_load(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits: Vec<String> = token
        .contents
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    if bits.len() >= 4 && bits[bits.len() - 2] == "from" {
        let label = &bits[bits.len() - 1];
        let names = &bits[1..bits.len() - 2];
        let subset = find_library(parser, label)?.subset(label, names)?;
        debug!(library = %label, ?names, "loading from library");
        parser.add_library(&subset);
    } else {
        for name in &bits[1..] {
            let library = find_library(parser, name)?;
            debug!(library = %name, "loading library");
            parser.add_library(&library);
        }
    }
    Ok(Node::Load)
}
