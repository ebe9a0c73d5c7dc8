use std::fmt;

use crate::context::Context;
use crate::errors::{Error, TesseraResult};
use crate::value::number::Number;
use crate::value::Value;

/// A lookup didn't find anything, or found `null` somewhere along the way.
///
/// This is not an error: whoever resolved the variable decides what to do with it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LookupMiss;

impl fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("variable lookup failed")
    }
}

/// A literal or a dotted path such as `user.address.city`.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Literal(Value),
    Lookup(Vec<String>),
}

/// Removes the quotes around a string literal, which must start and end with the same
/// quote character, and unescapes that quote and backslashes.
pub(crate) fn unescape_string_literal(s: &str) -> Option<String> {
    let quote = s.chars().next()?;
    if (quote != '"' && quote != '\'') || s.len() < 2 || !s.ends_with(quote) {
        return None;
    }
    let inner = &s[1..s.len() - 1];
    Some(
        inner
            .replace(&format!("\\{quote}"), &quote.to_string())
            .replace("\\\\", "\\"),
    )
}

impl Variable {
    pub fn new(var: &str) -> TesseraResult<Self> {
        if let Some(number) = Number::parse_literal(var) {
            return Ok(Variable::Literal(number.into()));
        }

        if let Some(s) = unescape_string_literal(var) {
            return Ok(Variable::Literal(Value::safe_string(&s)));
        }

        match var {
            "true" | "True" => return Ok(Variable::Literal(Value::Bool(true))),
            "false" | "False" => return Ok(Variable::Literal(Value::Bool(false))),
            "null" | "None" => return Ok(Variable::Literal(Value::Null)),
            _ => (),
        }

        if var.starts_with('_') || var.contains("._") {
            return Err(Error::syntax(format!(
                "Variables and attributes may not begin with underscores: '{var}'"
            )));
        }

        Ok(Variable::Lookup(var.split('.').map(String::from).collect()))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Variable::Literal(_))
    }

    pub fn literal(&self) -> Option<&Value> {
        match self {
            Variable::Literal(v) => Some(v),
            Variable::Lookup(_) => None,
        }
    }

    pub fn lookups(&self) -> Option<&[String]> {
        match self {
            Variable::Literal(_) => None,
            Variable::Lookup(parts) => Some(parts),
        }
    }

    /// Walks the path through the context.
    ///
    /// Callables found along the way are called with the value they were found on,
    /// and their result is used instead.
    pub fn resolve(&self, context: &Context) -> Result<Value, LookupMiss> {
        let parts = match self {
            Variable::Literal(v) => return Ok(v.clone()),
            Variable::Lookup(parts) => parts,
        };

        let mut current = Value::Undefined;
        for (idx, segment) in parts.iter().enumerate() {
            let found = if idx == 0 {
                context.get(segment).cloned().unwrap_or(Value::Undefined)
            } else {
                current.lookup(segment)
            };
            let found = match found {
                // Top level callables have no owner
                Value::Callable(ref c) => c.call(&current),
                other => other,
            };
            if found.is_none() {
                return Err(LookupMiss);
            }
            current = found;
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use std::sync::Arc;

    #[test]
    fn classifies_literals() {
        let tests = vec![
            ("1", Value::from(1i128)),
            ("-1.5", Value::from(-1.5)),
            ("'hello'", Value::from("hello")),
            (r#""a \"b\" \\ c""#, Value::from(r#"a "b" \ c"#)),
            ("true", Value::Bool(true)),
            ("False", Value::Bool(false)),
            ("None", Value::Null),
        ];
        for (input, expected) in tests {
            let var = Variable::new(input).unwrap();
            assert_eq!(var.literal(), Some(&expected), "{input}");
        }
        assert!(Variable::new("'s'").unwrap().literal().unwrap().is_safe());
    }

    #[test]
    fn other_quotes_are_not_unescaped() {
        let var = Variable::new(r#""it\'s""#).unwrap();
        assert_eq!(var.literal(), Some(&Value::from(r"it\'s")));
    }

    #[test]
    fn builds_lookups() {
        let var = Variable::new("user.friends.0.name").unwrap();
        assert_eq!(
            var.lookups().unwrap(),
            &["user", "friends", "0", "name"].map(String::from)
        );
        // Not valid numbers
        assert!(!Variable::new("1.").unwrap().is_literal());
        assert!(!Variable::new("inf").unwrap().is_literal());
    }

    #[test]
    fn rejects_underscores() {
        for input in ["_private", "user._secret"] {
            let err = Variable::new(input).unwrap_err();
            assert!(err.is_syntax_error());
            assert_eq!(
                err.to_string(),
                format!("Variables and attributes may not begin with underscores: '{input}'")
            );
        }
        assert!(Variable::new("user.name_").is_ok());
    }

    #[derive(serde_derive::Serialize)]
    struct User {
        name: String,
        tags: Vec<String>,
        boss: Option<String>,
    }

    #[test]
    fn resolves_paths() {
        let ctx = context! {
            user => &User {
                name: "Bob".to_string(),
                tags: vec!["a".to_string(), "b".to_string()],
                boss: None,
            }
        };
        let resolve = |s: &str| Variable::new(s).unwrap().resolve(&ctx);
        assert_eq!(resolve("user.name"), Ok(Value::from("Bob")));
        assert_eq!(resolve("user.tags.1"), Ok(Value::from("b")));
        assert_eq!(resolve("user.tags.5"), Err(LookupMiss));
        assert_eq!(resolve("user.missing.deeper"), Err(LookupMiss));
        assert_eq!(resolve("user.boss"), Err(LookupMiss));
        assert_eq!(resolve("user.boss.name"), Err(LookupMiss));
        assert_eq!(resolve("nope"), Err(LookupMiss));
        assert_eq!(resolve("'lit'"), Ok(Value::from("lit")));
    }

    #[test]
    fn calls_callables_with_their_owner() {
        let mut map = crate::value::Map::new();
        map.insert("first".into(), Value::from("Ada"));
        map.insert(
            "greet".into(),
            Value::callable(|owner| {
                Value::from(format!("Hi {}", owner.get_attr("first").render_to_string()))
            }),
        );
        let mut ctx = Context::new();
        ctx.insert_value("person", Value::Map(Arc::new(map)));
        ctx.insert_value("answer", Value::callable(|_| Value::from(42)));
        ctx.insert_value("nothing", Value::callable(|_| Value::Null));

        let resolve = |s: &str| Variable::new(s).unwrap().resolve(&ctx);
        assert_eq!(resolve("person.greet"), Ok(Value::from("Hi Ada")));
        assert_eq!(resolve("answer"), Ok(Value::from(42)));
        assert_eq!(resolve("nothing"), Err(LookupMiss));
    }
}
