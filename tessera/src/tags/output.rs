//! Tags transforming or producing output: `autoescape`, `filter`, `spaceless`,
//! `firstof`, `widthratio`, `templatetag`, `verbatim` and `comment`.
use crate::context::{Context, Frame};
use crate::errors::{Error, TesseraResult};
use crate::filter_expression::FilterExpression;
use crate::filters::to_int;
use crate::lexer::{Token, TokenKind};
use crate::nodes::{Node, NodeList};
use crate::parser::Parser;
use crate::safe::render_value_in_context;
use crate::Value;

#[derive(Debug, Clone)]
pub struct AutoescapeNode {
    setting: bool,
    pub(crate) nodelist: NodeList,
}

impl AutoescapeNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let previous = context.autoescape();
        context.set_autoescape(self.setting);
        let res = self.nodelist.render(context);
        context.set_autoescape(previous);
        res
    }
}

/// `{% autoescape on|off %} ... {% endautoescape %}`
pub(crate) fn do_autoescape(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let args: Vec<_> = token.contents.split_whitespace().collect();
    if args.len() != 2 {
        return Err(Error::syntax(
            "'autoescape' tag requires exactly one argument.",
        ));
    }
    let setting = match args[1] {
        "on" => true,
        "off" => false,
        _ => return Err(Error::syntax("'autoescape' argument should be 'on' or 'off'")),
    };
    let nodelist = parser.parse(&["endautoescape"])?;
    parser.delete_first_token();
    Ok(Node::Autoescape(AutoescapeNode { setting, nodelist }))
}

/// Runs the rendered body through filters. The body is available as `var`.
#[derive(Debug, Clone)]
pub struct FilterNode {
    expr: FilterExpression,
    pub(crate) nodelist: NodeList,
}

impl FilterNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let output = self.nodelist.render_safe(context)?;
        let mut frame = Frame::new();
        frame.insert("var".into(), output);
        let value = context.scoped(frame, |context| self.expr.resolve(context, false))?;
        Ok(value.render_to_string())
    }
}

/// `{% filter lower|cut:" " %} ... {% endfilter %}`
pub(crate) fn do_filter(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let Some((_, rest)) = token.contents.split_once(char::is_whitespace) else {
        return Err(Error::syntax("'filter' tag requires an argument"));
    };
    let expr = parser.compile_filter(&format!("var|{}", rest.trim()))?;
    for name in expr.filter_names() {
        if name == "escape" || name == "safe" {
            return Err(Error::syntax(format!(
                "\"filter {name}\" is not permitted.  Use the \"autoescape\" tag instead."
            )));
        }
    }
    let nodelist = parser.parse(&["endfilter"])?;
    parser.delete_first_token();
    Ok(Node::Filter(FilterNode { expr, nodelist }))
}

#[derive(Debug, Clone)]
pub struct FirstOfNode {
    vars: Vec<FilterExpression>,
    asvar: Option<String>,
}

impl FirstOfNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let mut first = String::new();
        for var in &self.vars {
            let value = var.resolve(context, true)?;
            if value.is_truthy() {
                first = render_value_in_context(&value, context);
                break;
            }
        }
        match self.asvar {
            Some(ref name) => {
                context.set(name.clone(), Value::safe_string(&first));
                Ok(String::new())
            }
            None => Ok(first),
        }
    }
}

/// `{% firstof a b "fallback" [as name] %}`
pub(crate) fn do_firstof(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let mut bits = token.split_contents().split_off(1);
    if bits.is_empty() {
        return Err(Error::syntax(
            "'firstof' statement requires at least one argument",
        ));
    }
    let mut asvar = None;
    if bits.len() >= 2 && bits[bits.len() - 2] == "as" {
        asvar = bits.pop();
        bits.pop();
    }
    let vars = bits
        .iter()
        .map(|b| parser.compile_filter(b))
        .collect::<TesseraResult<Vec<_>>>()?;
    Ok(Node::FirstOf(FirstOfNode { vars, asvar }))
}

/// Removes whitespace between a `>` and the following `<`.
pub(crate) fn strip_spaces_between_tags(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find('>') {
        out.push_str(&rest[..=idx]);
        rest = &rest[idx + 1..];
        let trimmed = rest.trim_start();
        if trimmed.len() != rest.len() && trimmed.starts_with('<') {
            rest = trimmed;
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone)]
pub struct SpacelessNode {
    pub(crate) nodelist: NodeList,
}

impl SpacelessNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let output = self.nodelist.render(context)?;
        Ok(strip_spaces_between_tags(output.trim()))
    }
}

/// `{% spaceless %} ... {% endspaceless %}`
pub(crate) fn do_spaceless(parser: &mut Parser, _token: Token) -> TesseraResult<Node> {
    let nodelist = parser.parse(&["endspaceless"])?;
    parser.delete_first_token();
    Ok(Node::Spaceless(SpacelessNode { nodelist }))
}

/// Like Python's `float()`
fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::String(s, _) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as u8 as f64),
        _ => value.to_f64_lossy(),
    }
}

#[derive(Debug, Clone)]
pub struct WidthRatioNode {
    value: FilterExpression,
    max_value: FilterExpression,
    max_width: FilterExpression,
    asvar: Option<String>,
}

impl WidthRatioNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let value = self.value.resolve(context, false)?;
        let max_value = self.max_value.resolve(context, false)?;
        let max_width = to_int(&self.max_width.resolve(context, false)?)
            .ok_or_else(|| Error::message("widthratio final argument must be a number"))?;

        let result = match (to_float(&value), to_float(&max_value)) {
            (Some(_), Some(max)) if max == 0.0 => "0".to_string(),
            (Some(value), Some(max)) => {
                let ratio = (value / max) * max_width as f64;
                if ratio.is_finite() {
                    format!("{}", ratio.round_ties_even() as i128)
                } else {
                    String::new()
                }
            }
            _ => String::new(),
        };

        match self.asvar {
            Some(ref name) => {
                context.set(name.clone(), Value::from(result));
                Ok(String::new())
            }
            None => Ok(result),
        }
    }
}

/// `{% widthratio value max_value max_width [as name] %}`
pub(crate) fn do_widthratio(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits = token.split_contents();
    let asvar = match bits.len() {
        4 => None,
        6 if bits[4] == "as" => Some(bits[5].clone()),
        6 => {
            return Err(Error::syntax(
                "Invalid syntax in widthratio tag. Expecting 'as' keyword",
            ))
        }
        _ => return Err(Error::syntax("widthratio takes at least three arguments")),
    };
    Ok(Node::WidthRatio(WidthRatioNode {
        value: parser.compile_filter(&bits[1])?,
        max_value: parser.compile_filter(&bits[2])?,
        max_width: parser.compile_filter(&bits[3])?,
        asvar,
    }))
}

const TEMPLATETAG_NAMES: [&str; 8] = [
    "openblock",
    "closeblock",
    "openvariable",
    "closevariable",
    "openbrace",
    "closebrace",
    "opencomment",
    "closecomment",
];

/// `{% templatetag openblock %}` outputs the delimiter text
pub(crate) fn do_templatetag(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits: Vec<_> = token.contents.split_whitespace().collect();
    if bits.len() != 2 {
        return Err(Error::syntax("'templatetag' statement takes one argument"));
    }
    match parser.env().delimiters.templatetag(bits[1]) {
        Some(text) => Ok(Node::TemplateTag(text)),
        None => Err(Error::syntax(format!(
            "Invalid templatetag argument: '{}'. Must be one of: {}",
            bits[1],
            TEMPLATETAG_NAMES.join(", ")
        ))),
    }
}

/// `{% verbatim [name] %} ... {% endverbatim [name] %}`: everything in between is output
/// as written. Comments are dropped.
pub(crate) fn do_verbatim(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let end_tag = format!("end{}", token.contents);
    let mut content = String::new();
    while let Some(t) = parser.next_token() {
        match (t.kind, t.raw()) {
            (TokenKind::Block, None) if t.contents == end_tag => {
                return Ok(Node::Verbatim(content));
            }
            (TokenKind::Comment, _) => (),
            (_, Some(raw)) => content.push_str(raw),
            (_, None) => content.push_str(&t.contents),
        }
    }
    Err(Error::syntax(format!(
        "Unclosed tag '{}'. Looking for one of: {end_tag}",
        token.command()
    )))
}

/// `{% comment [note] %} ... {% endcomment %}`
pub(crate) fn do_comment(parser: &mut Parser, _token: Token) -> TesseraResult<Node> {
    parser.skip_past("endcomment")?;
    Ok(Node::Comment)
}
