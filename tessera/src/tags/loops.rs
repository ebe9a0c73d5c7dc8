//! `{% for %}`, `{% cycle %}` and `{% ifchanged %}`
use std::sync::Arc;

use crate::context::{Context, Frame, StateKey};
use crate::errors::{Error, TesseraResult};
use crate::filter_expression::FilterExpression;
use crate::lexer::Token;
use crate::nodes::{Node, NodeList};
use crate::parser::Parser;
use crate::safe::render_value_in_context;
use crate::value::{Key, Map};
use crate::Value;

#[derive(Debug, Clone)]
pub struct ForNode {
    pub loop_vars: Vec<String>,
    pub sequence: FilterExpression,
    pub reversed: bool,
    pub(crate) nodelist_loop: NodeList,
    pub(crate) nodelist_empty: NodeList,
}

fn forloop_value(idx: usize, len: usize, parent: &Value) -> Value {
    let mut map = Map::new();
    map.insert(Key::from("counter0"), Value::from(idx));
    map.insert(Key::from("counter"), Value::from(idx + 1));
    map.insert(Key::from("revcounter"), Value::from(len - idx));
    map.insert(Key::from("revcounter0"), Value::from(len - idx - 1));
    map.insert(Key::from("first"), Value::Bool(idx == 0));
    map.insert(Key::from("last"), Value::Bool(idx == len - 1));
    map.insert(Key::from("length"), Value::from(len));
    map.insert(Key::from("parentloop"), parent.clone());
    Value::Map(Arc::new(map))
}

impl ForNode {
    fn bind_loop_vars(&self, context: &mut Context, item: Value) -> TesseraResult<()> {
        if let [name] = self.loop_vars.as_slice() {
            context.set(name.clone(), item);
            return Ok(());
        }

        let parts = match item {
            Value::Array(_) | Value::String(..) | Value::Map(_) | Value::Bytes(_) => {
                item.iter_items(false)?
            }
            _ => vec![item],
        };
        if parts.len() != self.loop_vars.len() {
            return Err(Error::message(format!(
                "Need {} values to unpack in for loop; got {}.",
                self.loop_vars.len(),
                parts.len()
            )));
        }
        for (name, value) in self.loop_vars.iter().zip(parts) {
            context.set(name.clone(), value);
        }
        Ok(())
    }

    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let parent_loop = context
            .get("forloop")
            .cloned()
            .unwrap_or_else(|| Value::Map(Arc::new(Map::new())));
        let values = self.sequence.resolve(context, true)?;
        let mut items = values.iter_items(self.loop_vars.len() > 1)?;
        if items.is_empty() {
            return self.nodelist_empty.render(context);
        }
        if self.reversed {
            items.reverse();
        }

        let len = items.len();
        let mut out = String::new();
        context.in_loop_state(|context| {
            context.scoped(Frame::new(), |context| {
                for (idx, item) in items.into_iter().enumerate() {
                    context.set("forloop", forloop_value(idx, len, &parent_loop));
                    self.bind_loop_vars(context, item)?;
                    out.push_str(&self.nodelist_loop.render(context)?);
                }
                Ok(())
            })
        })?;
        Ok(out)
    }
}

/// `{% for x in y [reversed] %} ... [{% empty %} ...] {% endfor %}`
pub(crate) fn do_for(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits = token.split_contents();
    if bits.len() < 4 {
        return Err(Error::syntax(format!(
            "'for' statements should have at least four words: {}",
            token.contents
        )));
    }

    let reversed = bits[bits.len() - 1] == "reversed";
    let in_index = if reversed { bits.len() - 3 } else { bits.len() - 2 };
    if bits[in_index] != "in" {
        return Err(Error::syntax(format!(
            "'for' statements should use the format 'for x in y': {}",
            token.contents
        )));
    }

    let joined = bits[1..in_index].join(" ");
    let mut loop_vars = Vec::new();
    for var in joined.split(',').map(|v| v.trim_matches(' ')) {
        if var.is_empty() || var.contains([' ', '"', '\'', '|']) {
            return Err(Error::syntax(format!(
                "'for' tag received an invalid argument: {}",
                token.contents
            )));
        }
        loop_vars.push(var.to_string());
    }

    let sequence = parser.compile_filter(&bits[in_index + 1])?;
    let nodelist_loop = parser.parse(&["empty", "endfor"])?;
    let nodelist_empty = if parser.expect_token(&["empty", "endfor"])?.contents == "empty" {
        let nodelist = parser.parse(&["endfor"])?;
        parser.delete_first_token();
        nodelist
    } else {
        NodeList::new()
    };

    Ok(Node::For(ForNode {
        loop_vars,
        sequence,
        reversed,
        nodelist_loop,
        nodelist_empty,
    }))
}

/// Outputs its values in turn, one per render. The position is template render state.
#[derive(Debug, Clone)]
pub struct CycleNode {
    values: Vec<FilterExpression>,
    variable_name: Option<String>,
    silent: bool,
    key: StateKey,
}

impl CycleNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        if self.values.is_empty() {
            return Ok(String::new());
        }
        let idx = context
            .render_context()
            .get::<usize>(&self.key)
            .copied()
            .unwrap_or(0);
        let value = self.values[idx].resolve(context, false)?;
        context
            .render_context_mut()
            .insert(self.key, (idx + 1) % self.values.len());

        if let Some(ref name) = self.variable_name {
            context.set_upward(name.clone(), value.clone());
        }
        if self.silent {
            return Ok(String::new());
        }
        Ok(render_value_in_context(&value, context))
    }
}

/// `{% cycle a b c %}`, `{% cycle a b c as name [silent] %}` or `{% cycle name %}`
pub(crate) fn do_cycle(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let mut args = token.split_contents();
    if args.len() < 2 {
        return Err(Error::syntax("'cycle' tag requires at least two arguments"));
    }

    if args.len() == 2 {
        let name = &args[1];
        if parser.named_cycles.is_empty() {
            return Err(Error::syntax(format!(
                "No named cycles in template. '{name}' is not defined"
            )));
        }
        return match parser.named_cycles.get(name) {
            Some(node) => Ok(Node::Cycle(node.clone())),
            None => Err(Error::syntax(format!("Named cycle '{name}' does not exist"))),
        };
    }

    let mut as_form = None;
    if args.len() > 4 {
        if args[args.len() - 3] == "as" {
            let flag = &args[args.len() - 1];
            if flag != "silent" {
                return Err(Error::syntax(format!(
                    "Only 'silent' flag is allowed after cycle's name, not '{flag}'."
                )));
            }
            args.pop();
            as_form = Some(true);
        } else if args[args.len() - 2] == "as" {
            as_form = Some(false);
        }
    }

    let node = match as_form {
        Some(silent) => {
            let name = args[args.len() - 1].clone();
            let values = args[1..args.len() - 2]
                .iter()
                .map(|a| parser.compile_filter(a))
                .collect::<TesseraResult<Vec<_>>>()?;
            let node = CycleNode {
                values,
                variable_name: Some(name.clone()),
                silent,
                key: StateKey::fresh("cycle"),
            };
            parser.named_cycles.insert(name, node.clone());
            node
        }
        None => CycleNode {
            values: args[1..]
                .iter()
                .map(|a| parser.compile_filter(a))
                .collect::<TesseraResult<Vec<_>>>()?,
            variable_name: None,
            silent: false,
            key: StateKey::fresh("cycle"),
        },
    };
    Ok(Node::Cycle(node))
}

/// Renders its body only when it differs from the last time, or when the watched
/// variables changed.
#[derive(Debug, Clone)]
pub struct IfChangedNode {
    pub(crate) nodelist_true: NodeList,
    pub(crate) nodelist_false: NodeList,
    vars: Vec<FilterExpression>,
    key: StateKey,
}

impl IfChangedNode {
    pub(crate) fn render(&self, context: &mut Context) -> TesseraResult<String> {
        let (compare_to, output) = if self.vars.is_empty() {
            let output = self.nodelist_true.render(context)?;
            (vec![Value::from(output.as_str())], Some(output))
        } else {
            let values = self
                .vars
                .iter()
                .map(|v| v.resolve(context, true))
                .collect::<TesseraResult<Vec<_>>>()?;
            (values, None)
        };

        let seen = context.render_context().loop_get::<Vec<Value>>(&self.key);
        if seen != Some(&compare_to) {
            context.render_context_mut().loop_insert(self.key, compare_to);
            return match output {
                Some(output) => Ok(output),
                None => self.nodelist_true.render(context),
            };
        }
        self.nodelist_false.render(context)
    }
}

/// `{% ifchanged [var ...] %} ... [{% else %} ...] {% endifchanged %}`
pub(crate) fn do_ifchanged(parser: &mut Parser, token: Token) -> TesseraResult<Node> {
    let bits = token.split_contents();
    let nodelist_true = parser.parse(&["else", "endifchanged"])?;
    let nodelist_false = if parser.expect_token(&["else", "endifchanged"])?.contents == "else" {
        let nodelist = parser.parse(&["endifchanged"])?;
        parser.delete_first_token();
        nodelist
    } else {
        NodeList::new()
    };
    let vars = bits[1..]
        .iter()
        .map(|b| parser.compile_filter(b))
        .collect::<TesseraResult<Vec<_>>>()?;

    Ok(Node::IfChanged(IfChangedNode {
        nodelist_true,
        nodelist_false,
        vars,
        key: StateKey::fresh("ifchanged"),
    }))
}
