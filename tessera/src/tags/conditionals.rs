//! `{% if %}`, `{% ifequal %}` and `{% ifnotequal %}`
use crate::context::Context;
use crate::errors::{Error, TesseraResult};
use crate::filter_expression::FilterExpression;
use crate::lexer::Token;
use crate::nodes::{Node, NodeList};
use crate::parser::Parser;
use crate::smartif::{Expr, IfParser, Operand};
use crate::Value;

/// Failed lookups compare as `None`.
fn resolve_operand(expr: &FilterExpression, context: &mut Context) -> TesseraResult<Value> {
    let value = expr.resolve(context, true)?;
    Ok(if value.is_undefined() { Value::Null } else { value })
}

/// An operand of an `{% if %}` condition.
#[derive(Debug, Clone)]
pub struct TemplateLiteral {
    expr: FilterExpression,
}

impl Operand<Context> for TemplateLiteral {
    fn eval(&self, context: &mut Context) -> TesseraResult<Value> {
        resolve_operand(&self.expr, context)
    }
}

#[derive(Debug, Clone)]
pub struct IfNode {
    /// `None` is the `{% else %}` branch
    pub(crate) branches: Vec<(Option<Expr<TemplateLiteral>>, NodeList)>,
}

impl IfNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        for (condition, nodelist) in &self.branches {
            let matched = match condition {
                Some(cond) => cond.eval(context)?.is_truthy(),
                None => true,
            };
            if matched {
                return nodelist.render(context);
            }
        }
        Ok(String::new())
    }
}

fn parse_condition(parser: &Parser, token: &Token) -> TesseraResult<Expr<TemplateLiteral>> {
    let bits = token.split_contents().into_iter().skip(1).collect::<Vec<_>>();
    IfParser::new(bits, |bit: String| {
        Ok(TemplateLiteral {
            expr: parser.compile_filter(&bit)?,
        })
    })?
    .parse()
}

/// `{% if cond %} ... [{% elif cond %} ...]* [{% else %} ...] {% endif %}`
pub(crate) fn do_if(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    const UNTIL: [&str; 3] = ["elif", "else", "endif"];

    let mut branches = vec![(Some(parse_condition(parser, &token)?), parser.parse(&UNTIL)?)];
    let mut token = parser.expect_token(&UNTIL)?;

    while token.command() == "elif" {
        let condition = parse_condition(parser, &token)?;
        branches.push((Some(condition), parser.parse(&UNTIL)?));
        token = parser.expect_token(&UNTIL)?;
    }

    if token.contents == "else" {
        branches.push((None, parser.parse(&["endif"])?));
        token = parser.expect_token(&["endif"])?;
    }

    if token.contents != "endif" {
        return Err(Error::syntax(format!(
            "Malformed template tag at line {}: \"{}\"",
            token.line_no, token.contents
        )));
    }

    Ok(Node::If(IfNode { branches }))
}

#[derive(Debug, Clone)]
pub struct IfEqualNode {
    var1: FilterExpression,
    var2: FilterExpression,
    pub(crate) nodelist_true: NodeList,
    pub(crate) nodelist_false: NodeList,
    negate: bool,
}

impl IfEqualNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let val1 = resolve_operand(&self.var1, context)?;
        let val2 = resolve_operand(&self.var2, context)?;
        if (val1 == val2) != self.negate {
            self.nodelist_true.render(context)
        } else {
            self.nodelist_false.render(context)
        }
    }
}

/// `{% ifequal a b %}` and `{% ifnotequal a b %}`, both with an optional `{% else %}`
pub(crate) fn do_ifequal(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits = token.split_contents();
    if bits.len() != 3 {
        return Err(Error::syntax(format!("'{}' takes two arguments", bits[0])));
    }
    let negate = bits[0] == "ifnotequal";
    let end_tag = format!("end{}", bits[0]);
    let until = ["else", end_tag.as_str()];

    let nodelist_true = parser.parse(&until)?;
    let nodelist_false = if parser.expect_token(&until)?.contents == "else" {
        let nodelist = parser.parse(&[end_tag.as_str()])?;
        parser.delete_first_token();
        nodelist
    } else {
        NodeList::new()
    };

    Ok(Node::IfEqual(IfEqualNode {
        var1: parser.compile_filter(&bits[1])?,
        var2: parser.compile_filter(&bits[2])?,
        nodelist_true,
        nodelist_false,
        negate,
    }))
}
