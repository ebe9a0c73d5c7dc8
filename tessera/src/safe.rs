//! The escaping algebra.
//!
//! Every string value carries one of three tags (see [`StringKind`]): plain, safe or
//! marked for escaping. Tagging never changes the characters, only the tag.
//! Safe dominates: once a value is safe, marking it for escaping does nothing.
use std::sync::Arc;

use crate::context::Context;
use crate::utils::escape_str;
use crate::value::{StringKind, Value};

pub fn mark_safe(value: Value) -> Value {
    value.mark_safe()
}

pub fn mark_for_escaping(value: Value) -> Value {
    value.mark_for_escaping()
}

pub fn is_safe(value: &Value) -> bool {
    value.is_safe()
}

pub fn is_marked_for_escaping(value: &Value) -> bool {
    value.is_marked_for_escaping()
}

/// HTML-escapes the string version of the value and tags the result as safe.
/// This escapes even values that are already safe.
pub fn escape(value: &Value) -> Value {
    let text = value.render_to_string();
    Value::String(Arc::from(escape_str(&text)), StringKind::Safe)
}

/// Escapes the value unless it is already safe.
pub fn conditional_escape(value: &Value) -> Value {
    if value.is_safe() {
        value.clone()
    } else {
        escape(value)
    }
}

/// Converts a value to the text printed for `{{ value }}` given the ambient autoescape flag.
///
/// With autoescape on, anything not safe is escaped. Values marked for escaping
/// are escaped even when it is off, unless they are safe.
pub fn render_value_in_context(value: &Value, context: &Context) -> String {
    if (context.autoescape() && !value.is_safe()) || value.is_marked_for_escaping() {
        escape_str(&value.render_to_string())
    } else {
        value.render_to_string()
    }
}
