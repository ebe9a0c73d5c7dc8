use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::args::{ArgFromValue, Args};
use crate::errors::{Error, TesseraResult};
use crate::safe::{conditional_escape, escape};
use crate::utils::escape_str;
use crate::value::number;
use crate::value::FunctionResult;
use crate::Value;

/// How many arguments a filter takes from the template, on top of its input.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Arity {
    /// `value|filter`
    None,
    /// `value|filter` or `value|filter:arg`
    #[default]
    Optional,
    /// `value|filter:arg`
    Required,
}

/// What the rendering machinery needs to know about a filter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FilterMeta {
    /// The output of the filter is safe if its input was
    pub is_safe: bool,
    /// The filter gets the ambient autoescape flag as a trailing argument
    pub needs_autoescape: bool,
    pub arity: Arity,
}

impl FilterMeta {
    pub const fn new() -> Self {
        Self {
            is_safe: false,
            needs_autoescape: false,
            arity: Arity::Optional,
        }
    }

    pub const fn safe(mut self) -> Self {
        self.is_safe = true;
        self
    }

    pub const fn needs_autoescape(mut self) -> Self {
        self.needs_autoescape = true;
        self
    }

    pub const fn arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    /// Checks the number of arguments given in the template.
    pub(crate) fn check_args(&self, name: &str, has_arg: bool) -> TesseraResult<()> {
        // Counts include the filtered value, like a function signature would
        let (required, provided) = match (self.arity, has_arg) {
            (Arity::None, true) => (1, 2),
            (Arity::Required, false) => (2, 1),
            _ => return Ok(()),
        };
        Err(Error::syntax(format!(
            "{name} requires {required} arguments, {provided} provided"
        )))
    }
}

/// The filter function type definition
pub trait Filter<Arg, Res>: Sync + Send + 'static {
    /// The filter function type definition
    fn call(&self, value: Arg, args: Args) -> Res;
}

impl<Func, Arg, Res> Filter<Arg, Res> for Func
where
    Func: Fn(Arg, Args) -> Res + Sync + Send + 'static,
    Arg: for<'a> ArgFromValue<'a>,
    Res: FunctionResult,
{
    fn call(&self, value: Arg, args: Args) -> Res {
        (self)(value, args)
    }
}

type FilterFunc = dyn Fn(&Value, Args) -> TesseraResult<Value> + Sync + Send + 'static;

#[derive(Clone)]
pub struct StoredFilter {
    func: Arc<FilterFunc>,
    meta: FilterMeta,
}

impl StoredFilter {
    pub fn new<Func, Arg, Res>(f: Func, meta: FilterMeta) -> Self
    where
        Func: Filter<Arg, Res> + for<'a> Filter<<Arg as ArgFromValue<'a>>::Output, Res>,
        Arg: for<'a> ArgFromValue<'a>,
        Res: FunctionResult,
    {
        let closure = move |arg: &Value, args| -> TesseraResult<Value> {
            f.call(Arg::from_value(arg)?, args).into_result()
        };

        StoredFilter {
            func: Arc::new(closure),
            meta,
        }
    }

    pub fn meta(&self) -> FilterMeta {
        self.meta
    }

    pub fn call(&self, arg: &Value, args: Args) -> TesseraResult<Value> {
        (self.func)(arg, args)
    }
}

impl fmt::Debug for StoredFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredFilter")
            .field("meta", &self.meta)
            .finish()
    }
}

/// Like Python's `int()`: floats are truncated and strings parsed.
pub(crate) fn to_int(val: &Value) -> Option<i128> {
    match val {
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i128),
        Value::String(s, _) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as i128),
        _ => val.as_i128(),
    }
}

pub(crate) fn safe(val: Value, _: Args) -> Value {
    val.mark_safe()
}

pub(crate) fn escape_filter(val: Value, _: Args) -> Value {
    val.mark_for_escaping()
}

pub(crate) fn force_escape(val: Value, _: Args) -> Value {
    escape(&val)
}

pub(crate) fn upper(val: Cow<'_, str>, _: Args) -> String {
    val.to_uppercase()
}

pub(crate) fn lower(val: Cow<'_, str>, _: Args) -> String {
    val.to_lowercase()
}

/// Uppercase the first letter of each word, without uppercasing letters following
/// an apostrophe or a digit
pub(crate) fn title(val: Cow<'_, str>, _: Args) -> String {
    let mut chars: Vec<char> = Vec::with_capacity(val.len());
    let mut previous_is_cased = false;
    for c in val.chars() {
        if previous_is_cased {
            chars.extend(c.to_lowercase());
        } else {
            chars.extend(c.to_uppercase());
        }
        previous_is_cased = c.is_alphabetic();
    }

    for i in 1..chars.len() {
        if !chars[i].is_ascii_uppercase() {
            continue;
        }
        let after_digit = chars[i - 1].is_ascii_digit();
        let after_contraction =
            i >= 2 && chars[i - 1] == '\'' && chars[i - 2].is_ascii_lowercase();
        if after_digit || after_contraction {
            chars[i] = chars[i].to_ascii_lowercase();
        }
    }
    chars.into_iter().collect()
}

pub(crate) fn capfirst(val: Cow<'_, str>, _: Args) -> String {
    let mut chars = val.chars();
    match chars.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

pub(crate) fn length(val: Value, _: Args) -> usize {
    val.len().unwrap_or(0)
}

pub(crate) fn default(val: Value, args: Args) -> TesseraResult<Value> {
    if val.is_truthy() {
        Ok(val)
    } else {
        args.must_get::<Value>(0)
    }
}

pub(crate) fn default_if_none(val: Value, args: Args) -> TesseraResult<Value> {
    if val.is_none() {
        args.must_get::<Value>(0)
    } else {
        Ok(val)
    }
}

pub(crate) fn join(val: Value, args: Args) -> TesseraResult<Value> {
    let sep = args.must_get::<Value>(0)?;
    let items = match val {
        Value::Array(_) | Value::String(..) | Value::Map(_) => val.iter_items(false)?,
        _ => return Ok(val),
    };

    let data = if args.autoescape() {
        let sep = conditional_escape(&sep).render_to_string();
        items
            .iter()
            .map(|v| conditional_escape(v).render_to_string())
            .collect::<Vec<_>>()
            .join(&sep)
    } else {
        items
            .iter()
            .map(Value::render_to_string)
            .collect::<Vec<_>>()
            .join(&sep.render_to_string())
    };
    Ok(Value::safe_string(&data))
}

fn nth_item(val: &Value, from_end: bool) -> TesseraResult<Value> {
    let items = match val {
        Value::Undefined | Value::Null => return Ok(Value::from("")),
        Value::Array(_) | Value::String(..) => val.iter_items(false)?,
        _ => {
            return Err(Error::message(format!(
                "'{}' object is not subscriptable",
                val.name()
            )))
        }
    };
    let item = if from_end {
        items.last()
    } else {
        items.first()
    };
    Ok(item.cloned().unwrap_or_else(|| Value::from("")))
}

pub(crate) fn first(val: Value, _: Args) -> TesseraResult<Value> {
    nth_item(&val, false)
}

pub(crate) fn last(val: Value, _: Args) -> TesseraResult<Value> {
    nth_item(&val, true)
}

/// Integer addition if both sides look like integers, otherwise concatenation of
/// strings or arrays, otherwise an empty string.
pub(crate) fn add(val: Value, args: Args) -> TesseraResult<Value> {
    let arg = args.must_get::<Value>(0)?;
    if let (Some(a), Some(b)) = (to_int(&val), to_int(&arg)) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }

    let res = match (&val, &arg) {
        (Value::String(a, _), Value::String(b, _)) => Value::from(format!("{a}{b}")),
        (Value::Array(a), Value::Array(b)) => {
            Value::from(a.iter().chain(b.iter()).cloned().collect::<Vec<_>>())
        }
        _ if val.is_number() && arg.is_number() => {
            number::add(&val, &arg).unwrap_or_else(|_| Value::from(""))
        }
        _ => Value::from(""),
    };
    Ok(res)
}

pub(crate) fn cut(val: Value, args: Args) -> TesseraResult<Value> {
    let arg = args.must_get::<String>(0)?;
    let out = val.render_to_string().replace(&arg, "");
    // Removing semicolons could break an entity
    if val.is_safe() && arg != ";" {
        Ok(Value::safe_string(&out))
    } else {
        Ok(Value::from(out))
    }
}

pub(crate) fn linebreaksbr(val: Value, args: Args) -> Value {
    let autoescape = args.autoescape() && !val.is_safe();
    let text = val
        .render_to_string()
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    let text = if autoescape { escape_str(&text) } else { text };
    Value::safe_string(&text.replace('\n', "<br>"))
}

pub(crate) fn yesno(val: Value, args: Args) -> TesseraResult<Value> {
    let mapping = args
        .get::<String>(0)?
        .unwrap_or_else(|| "yes,no,maybe".to_string());
    let bits: Vec<&str> = mapping.split(',').collect();
    let (yes, no, maybe) = match bits.as_slice() {
        [yes, no] => (*yes, *no, *no),
        [yes, no, maybe, ..] => (*yes, *no, *maybe),
        // Invalid mapping
        _ => return Ok(val),
    };

    let out = if val.is_none() {
        maybe
    } else if val.is_truthy() {
        yes
    } else {
        no
    };
    Ok(Value::from(out))
}

/// Truncates to `length` characters, the ellipsis included.
pub(crate) fn truncatechars(val: Cow<'_, str>, args: Args) -> Value {
    let length = match args.get::<i64>(0) {
        Ok(Some(l)) => l,
        _ => return Value::from(val.as_ref()),
    };
    if length <= 0 {
        return Value::from("");
    }
    let length = length as usize;
    #[cfg(feature = "unicode")]
    let pieces: Vec<&str> = unic_segment::Graphemes::new(val.as_ref()).collect();
    #[cfg(not(feature = "unicode"))]
    let pieces: Vec<&str> = val
        .char_indices()
        .map(|(i, c)| &val[i..i + c.len_utf8()])
        .collect();
    if pieces.len() <= length {
        return Value::from(val.as_ref());
    }
    let mut out: String = pieces[..length - 1].concat();
    out.push('…');
    Value::from(out)
}

pub(crate) fn wordcount(val: Cow<'_, str>, _: Args) -> usize {
    val.split_whitespace().count()
}

/// Returns the suffix for the plural form: `s` by default, or `singular,plural` from
/// the argument.
pub(crate) fn pluralize(val: Value, args: Args) -> TesseraResult<String> {
    let arg = args.get::<String>(0)?.unwrap_or_else(|| "s".to_string());
    let arg = if arg.contains(',') {
        arg
    } else {
        format!(",{arg}")
    };
    let (singular, plural) = match arg.split(',').collect::<Vec<_>>().as_slice() {
        [singular, plural] => (singular.to_string(), plural.to_string()),
        _ => return Ok(String::new()),
    };

    let is_one = match &val {
        Value::String(s, _) => match s.trim().parse::<f64>() {
            Ok(f) => f == 1.0,
            Err(_) => return Ok(String::new()),
        },
        Value::Bool(b) => *b,
        v if v.is_number() => v.as_f64() == Some(1.0),
        v => match v.len() {
            Some(l) => l == 1,
            None => return Ok(String::new()),
        },
    };
    Ok(if is_one { singular } else { plural })
}

/// Python slicing: negative indices count from the end and a negative step goes backwards.
fn python_slice<T: Clone>(items: &[T], start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<T> {
    let len = items.len() as i64;
    let mut out = Vec::new();
    if step > 0 {
        let clamp = |i: i64| if i < 0 { (i + len).max(0) } else { i.min(len) };
        let mut i = start.map(clamp).unwrap_or(0);
        let stop = stop.map(clamp).unwrap_or(len);
        while i < stop {
            out.push(items[i as usize].clone());
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let clamp = |i: i64| if i < 0 { (i + len).max(-1) } else { i.min(len - 1) };
        let mut i = start.map(clamp).unwrap_or(len - 1);
        let stop = stop.map(clamp).unwrap_or(-1);
        while i > stop {
            out.push(items[i as usize].clone());
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    out
}

/// `items|slice:"1:3"`. Invalid slices return the value unchanged.
pub(crate) fn slice(val: Value, args: Args) -> TesseraResult<Value> {
    let spec = args.must_get::<String>(0)?;
    let mut bits = Vec::new();
    for bit in spec.split(':') {
        if bit.is_empty() {
            bits.push(None);
        } else {
            match bit.trim().parse::<i64>() {
                Ok(n) => bits.push(Some(n)),
                Err(_) => return Ok(val),
            }
        }
    }
    let (start, stop, step) = match bits.as_slice() {
        [stop] => (None, *stop, None),
        [start, stop] => (*start, *stop, None),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Ok(val),
    };
    let step = step.unwrap_or(1);
    if step == 0 {
        return Ok(val);
    }

    match &val {
        Value::Array(arr) => Ok(Value::from(python_slice(arr, start, stop, step))),
        Value::String(s, _) => {
            let chars: Vec<char> = s.chars().collect();
            let sliced: String = python_slice(&chars, start, stop, step).into_iter().collect();
            Ok(Value::from(sliced))
        }
        _ => Ok(val),
    }
}

/// Removes everything that looks like a tag.
pub(crate) fn striptags(val: Cow<'_, str>, _: Args) -> String {
    let mut out = String::with_capacity(val.len());
    let mut rest = val.as_ref();
    while let Some(start) = rest.find('<') {
        let Some(end) = rest[start..].find('>') else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

fn width_arg(args: &Args) -> TesseraResult<usize> {
    let width = args.must_get::<i64>(0)?;
    Ok(width.max(0) as usize)
}

pub(crate) fn center(val: Cow<'_, str>, args: Args) -> TesseraResult<String> {
    let width = width_arg(&args)?;
    let len = val.chars().count();
    if width <= len {
        return Ok(val.into_owned());
    }
    let margin = width - len;
    // Same rounding as Python `str.center`
    let left = margin / 2 + (margin & width & 1);
    Ok(format!(
        "{}{val}{}",
        " ".repeat(left),
        " ".repeat(margin - left)
    ))
}

pub(crate) fn ljust(val: Cow<'_, str>, args: Args) -> TesseraResult<String> {
    let width = width_arg(&args)?;
    Ok(format!("{val:<width$}"))
}

pub(crate) fn rjust(val: Cow<'_, str>, args: Args) -> TesseraResult<String> {
    let width = width_arg(&args)?;
    Ok(format!("{val:>width$}"))
}

pub(crate) fn length_is(val: Value, args: Args) -> Value {
    match (val.len(), args.get::<i64>(0)) {
        (Some(len), Ok(Some(expected))) => Value::Bool(len as i64 == expected),
        _ => Value::from(""),
    }
}

pub(crate) fn divisibleby(val: Value, args: Args) -> TesseraResult<bool> {
    let arg = args.must_get::<Value>(0)?;
    match (to_int(&val), to_int(&arg)) {
        (Some(_), Some(0)) => Err(Error::message("integer division or modulo by zero")),
        (Some(a), Some(b)) => Ok(a % b == 0),
        _ => Err(Error::message(format!(
            "`divisibleby` cannot be used on `{}` and `{}`",
            val.name(),
            arg.name()
        ))),
    }
}

/// Rounds half away from zero on the shortest decimal representation of `number`,
/// so that `2.675` rounds to `2.68` like it reads.
fn round_half_up(number: f64, places: usize) -> String {
    let repr = format!("{}", number.abs());
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let mut digits: Vec<u8> = int_part.bytes().map(|b| b - b'0').collect();
    let mut frac: Vec<u8> = frac_part.bytes().map(|b| b - b'0').collect();
    let round_up = frac.get(places).is_some_and(|d| *d >= 5);
    frac.resize(places, 0);
    digits.extend(frac);

    if round_up {
        let mut idx = digits.len();
        loop {
            if idx == 0 {
                digits.insert(0, 1);
                break;
            }
            idx -= 1;
            if digits[idx] == 9 {
                digits[idx] = 0;
            } else {
                digits[idx] += 1;
                break;
            }
        }
    }

    let int_len = digits.len() - places;
    let mut out = String::with_capacity(digits.len() + 2);
    if number.is_sign_negative() && digits.iter().any(|d| *d != 0) {
        out.push('-');
    }
    for (idx, d) in digits.iter().enumerate() {
        if idx == int_len {
            out.push('.');
        }
        out.push((b'0' + d) as char);
    }
    out
}

/// Rounds to the number of decimal places given as argument. A negative argument
/// only shows the decimals if there are any, by default `-1`.
pub(crate) fn floatformat(val: Value, args: Args) -> Value {
    let input = val.render_to_string();
    let Some(number) = val.to_f64_lossy() else {
        return Value::from("");
    };
    let precision = match args.get::<i64>(0) {
        Ok(p) => p.unwrap_or(-1),
        Err(_) => return Value::from(input),
    };
    if !number.is_finite() {
        return Value::from(input);
    }

    if number.fract() == 0.0 && precision <= 0 {
        return Value::safe_string(&format!("{}", number as i128));
    }
    Value::safe_string(&round_half_up(number, precision.unsigned_abs() as usize))
}

pub(crate) fn make_list(val: Cow<'_, str>, _: Args) -> TesseraResult<Value> {
    Ok(Value::from(Value::from(val.as_ref()).iter_items(false)?))
}

/// All the filters available without loading anything.
pub(crate) fn builtins() -> Vec<(&'static str, StoredFilter)> {
    let plain = FilterMeta::new().arity(Arity::None);
    let safe_plain = plain.safe();
    let with_arg = FilterMeta::new().arity(Arity::Required);

    vec![
        ("safe", StoredFilter::new(safe, safe_plain)),
        ("escape", StoredFilter::new(escape_filter, safe_plain)),
        ("force_escape", StoredFilter::new(force_escape, safe_plain)),
        ("upper", StoredFilter::new(upper, plain)),
        ("lower", StoredFilter::new(lower, safe_plain)),
        ("title", StoredFilter::new(title, safe_plain)),
        ("capfirst", StoredFilter::new(capfirst, safe_plain)),
        ("length", StoredFilter::new(length, plain)),
        ("default", StoredFilter::new(default, with_arg)),
        ("default_if_none", StoredFilter::new(default_if_none, with_arg)),
        (
            "join",
            StoredFilter::new(join, with_arg.safe().needs_autoescape()),
        ),
        ("first", StoredFilter::new(first, plain)),
        ("last", StoredFilter::new(last, safe_plain)),
        ("add", StoredFilter::new(add, with_arg)),
        ("cut", StoredFilter::new(cut, with_arg)),
        (
            "linebreaksbr",
            StoredFilter::new(linebreaksbr, safe_plain.needs_autoescape()),
        ),
        ("yesno", StoredFilter::new(yesno, FilterMeta::new())),
        ("truncatechars", StoredFilter::new(truncatechars, with_arg.safe())),
        ("wordcount", StoredFilter::new(wordcount, plain)),
        ("pluralize", StoredFilter::new(pluralize, FilterMeta::new())),
        ("slice", StoredFilter::new(slice, with_arg.safe())),
        ("striptags", StoredFilter::new(striptags, safe_plain)),
        ("center", StoredFilter::new(center, with_arg.safe())),
        ("ljust", StoredFilter::new(ljust, with_arg.safe())),
        ("rjust", StoredFilter::new(rjust, with_arg.safe())),
        ("length_is", StoredFilter::new(length_is, with_arg)),
        ("divisibleby", StoredFilter::new(divisibleby, with_arg)),
        ("floatformat", StoredFilter::new(floatformat, FilterMeta::new().safe())),
        ("make_list", StoredFilter::new(make_list, plain)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(v: impl Into<Value>) -> Args {
        Args::new("test", vec![v.into()])
    }

    fn no_args() -> Args {
        Args::default()
    }

    #[test]
    fn test_upper_lower() {
        assert_eq!(upper(Cow::Borrowed("hello"), no_args()), "HELLO");
        assert_eq!(lower(Cow::Borrowed("HELLO"), no_args()), "hello");
    }

    #[test]
    fn test_title() {
        let tests = vec![
            ("foo bar", "Foo Bar"),
            ("FOO\tBAR", "Foo\tBar"),
            ("foo-bar", "Foo-Bar"),
            ("foo (bar)", "Foo (Bar)"),
            ("joe's crab shack", "Joe's Crab Shack"),
            ("555 WEST 53RD STREET", "555 West 53rd Street"),
        ];
        for (input, expected) in tests {
            assert_eq!(title(Cow::Borrowed(input), no_args()), expected);
        }
    }

    #[test]
    fn test_capfirst() {
        assert_eq!(capfirst(Cow::Borrowed("hello World"), no_args()), "Hello World");
        assert_eq!(capfirst(Cow::Borrowed(""), no_args()), "");
    }

    #[test]
    fn test_default() {
        assert_eq!(
            default(Value::from(""), arg("x")).unwrap(),
            Value::from("x")
        );
        assert_eq!(default(Value::from(0), arg("x")).unwrap(), Value::from("x"));
        assert_eq!(default(Value::from("a"), arg("x")).unwrap(), Value::from("a"));
        assert_eq!(
            default_if_none(Value::Null, arg("x")).unwrap(),
            Value::from("x")
        );
        assert_eq!(
            default_if_none(Value::from(""), arg("x")).unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_join_escapes_items_with_autoescape() {
        let items = Value::from(vec![Value::from("<a>"), Value::safe_string("<b>")]);
        let mut args = arg(Value::safe_string(", "));
        args.push(Value::Bool(true));
        let out = join(items.clone(), args).unwrap();
        assert!(out.is_safe());
        assert_eq!(out.as_str(), Some("&lt;a&gt;, <b>"));

        let mut args = arg(", ");
        args.push(Value::Bool(false));
        assert_eq!(join(items, args).unwrap().as_str(), Some("<a>, <b>"));

        // not iterable: unchanged
        assert_eq!(join(Value::from(1), arg(",")).unwrap(), Value::from(1));
        assert_eq!(
            join(Value::from("abc"), arg("-")).unwrap().as_str(),
            Some("a-b-c")
        );
    }

    #[test]
    fn test_first_last() {
        let items = Value::from(vec![1, 2, 3]);
        assert_eq!(first(items.clone(), no_args()).unwrap(), Value::from(1));
        assert_eq!(last(items, no_args()).unwrap(), Value::from(3));
        assert_eq!(first(Value::from("abc"), no_args()).unwrap(), Value::from("a"));
        assert_eq!(
            first(Value::from(Vec::<Value>::new()), no_args()).unwrap(),
            Value::from("")
        );
        assert!(first(Value::from(1), no_args()).is_err());
    }

    #[test]
    fn test_add() {
        let tests: Vec<(Value, Value, Value)> = vec![
            (1.into(), 2.into(), 3.into()),
            ("1".into(), "2".into(), 3.into()),
            (1.5.into(), 1.into(), 2.into()),
            ("a".into(), "b".into(), "ab".into()),
            (
                vec![1].into(),
                vec![2].into(),
                Value::from(vec![1, 2]),
            ),
            ("a".into(), 1.into(), "".into()),
        ];
        for (lhs, rhs, expected) in tests {
            assert_eq!(add(lhs.clone(), arg(rhs.clone())).unwrap(), expected, "{lhs} + {rhs}");
        }
    }

    #[test]
    fn test_cut_keeps_safety() {
        let out = cut(Value::safe_string("a b c"), arg(" ")).unwrap();
        assert!(out.is_safe());
        assert_eq!(out.as_str(), Some("abc"));
        let out = cut(Value::safe_string("&amp;"), arg(";")).unwrap();
        assert!(!out.is_safe());
    }

    #[test]
    fn test_linebreaksbr() {
        let mut args = no_args();
        args.push(Value::Bool(true));
        let out = linebreaksbr(Value::from("<a>\r\nb\nc"), args);
        assert_eq!(out.as_str(), Some("&lt;a&gt;<br>b<br>c"));
        assert!(out.is_safe());

        let mut args = no_args();
        args.push(Value::Bool(false));
        assert_eq!(linebreaksbr(Value::from("<a>\n"), args).as_str(), Some("<a><br>"));
    }

    #[test]
    fn test_yesno() {
        assert_eq!(yesno(Value::Bool(true), no_args()).unwrap(), Value::from("yes"));
        assert_eq!(yesno(Value::Bool(false), no_args()).unwrap(), Value::from("no"));
        assert_eq!(yesno(Value::Null, no_args()).unwrap(), Value::from("maybe"));
        assert_eq!(yesno(Value::Null, arg("y,n")).unwrap(), Value::from("n"));
        assert_eq!(yesno(Value::Bool(true), arg("bad")).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_truncatechars() {
        let tests = vec![
            ("Joel is a slug", Value::from(7), "Joel i…"),
            ("Joel", Value::from(7), "Joel"),
            ("Joel", Value::from("abc"), "Joel"),
            ("Joel", Value::from(0), ""),
        ];
        for (input, length, expected) in tests {
            assert_eq!(
                truncatechars(Cow::Borrowed(input), arg(length)),
                Value::from(expected)
            );
        }
    }

    #[test]
    fn test_pluralize() {
        let tests: Vec<(Value, Option<&str>, &str)> = vec![
            (1.into(), None, ""),
            (2.into(), None, "s"),
            (0.into(), None, "s"),
            ("1".into(), None, ""),
            (vec![1].into(), None, ""),
            (vec![1, 2].into(), Some("es"), "es"),
            (1.into(), Some("y,ies"), "y"),
            (3.into(), Some("y,ies"), "ies"),
            (3.into(), Some("a,b,c"), ""),
            ("abc".into(), None, ""),
        ];
        for (value, suffix, expected) in tests {
            let args = match suffix {
                Some(s) => arg(s),
                None => no_args(),
            };
            assert_eq!(pluralize(value, args).unwrap(), expected);
        }
    }

    #[test]
    fn test_slice() {
        let items = Value::from(vec![0, 1, 2, 3, 4]);
        let tests = vec![
            (":2", Value::from(vec![0, 1])),
            ("1:3", Value::from(vec![1, 2])),
            ("-2:", Value::from(vec![3, 4])),
            ("::2", Value::from(vec![0, 2, 4])),
            ("::-1", Value::from(vec![4, 3, 2, 1, 0])),
            ("3:1:-1", Value::from(vec![3, 2])),
            ("10:", Value::from(Vec::<Value>::new())),
            ("1:3:9223372036854775807", Value::from(vec![1])),
            ("3::-9223372036854775808", Value::from(vec![3])),
        ];
        for (spec, expected) in tests {
            assert_eq!(slice(items.clone(), arg(spec)).unwrap(), expected, "{spec}");
        }
        assert_eq!(slice(Value::from("hello"), arg("1:-1")).unwrap(), Value::from("ell"));
        assert_eq!(slice(items.clone(), arg("a:b")).unwrap(), items);
        assert_eq!(slice(items.clone(), arg("::0")).unwrap(), items);
    }

    #[test]
    fn test_striptags() {
        assert_eq!(
            striptags(Cow::Borrowed("<p>Hello <b>world</b></p> 1 < 2"), no_args()),
            "Hello world 1 < 2"
        );
    }

    #[test]
    fn test_justify() {
        assert_eq!(center(Cow::Borrowed("ab"), arg(6)).unwrap(), "  ab  ");
        assert_eq!(center(Cow::Borrowed("abc"), arg(6)).unwrap(), " abc  ");
        assert_eq!(center(Cow::Borrowed("ab"), arg(5)).unwrap(), "  ab ");
        assert_eq!(ljust(Cow::Borrowed("ab"), arg(4)).unwrap(), "ab  ");
        assert_eq!(rjust(Cow::Borrowed("ab"), arg("4")).unwrap(), "  ab");
        assert_eq!(rjust(Cow::Borrowed("abc"), arg(1)).unwrap(), "abc");
    }

    #[test]
    fn test_length_is_and_divisibleby() {
        assert_eq!(length_is(Value::from("abc"), arg(3)), Value::Bool(true));
        assert_eq!(length_is(Value::from(1), arg(3)), Value::from(""));
        assert!(divisibleby(Value::from(21), arg(3)).unwrap());
        assert!(!divisibleby(Value::from("22"), arg(3)).unwrap());
        assert!(divisibleby(Value::from(1), arg(0)).is_err());
    }

    #[test]
    fn test_floatformat() {
        let tests: Vec<(Value, Option<Value>, &str)> = vec![
            (34.23234.into(), None, "34.2"),
            (34.0.into(), None, "34"),
            (34.26.into(), None, "34.3"),
            (34.23234.into(), Some(3.into()), "34.232"),
            (34.0.into(), Some(3.into()), "34.000"),
            (34.26.into(), Some((-3).into()), "34.260"),
            (2.675.into(), Some(2.into()), "2.68"),
            (9.99.into(), Some(1.into()), "10.0"),
            ((-0.01).into(), Some(1.into()), "0.0"),
            ((-1.25).into(), Some(1.into()), "-1.3"),
            ("12.5".into(), Some(0.into()), "13"),
            ("foo".into(), None, ""),
            (1.5.into(), Some("bar".into()), "1.5"),
        ];
        for (value, precision, expected) in tests {
            let args = match precision {
                Some(p) => arg(p),
                None => no_args(),
            };
            assert_eq!(floatformat(value.clone(), args).as_str(), Some(expected), "{value}");
        }
    }

    #[test]
    fn test_make_list_and_wordcount() {
        assert_eq!(
            make_list(Cow::Borrowed("ab"), no_args()).unwrap(),
            Value::from(vec!["a", "b"])
        );
        assert_eq!(wordcount(Cow::Borrowed(" a b  c "), no_args()), 3);
    }

    #[test]
    fn arity_errors_count_the_value() {
        let required = FilterMeta::new().arity(Arity::Required);
        assert_eq!(
            required.check_args("default", false).unwrap_err().to_string(),
            "default requires 2 arguments, 1 provided"
        );
        assert!(required.check_args("default", true).is_ok());
        let none = FilterMeta::new().arity(Arity::None);
        assert_eq!(
            none.check_args("upper", true).unwrap_err().to_string(),
            "upper requires 1 arguments, 2 provided"
        );
        assert!(FilterMeta::new().check_args("yesno", true).is_ok());
    }

    #[test]
    fn stored_filters_convert_their_input() {
        let filter = StoredFilter::new(upper, FilterMeta::new());
        assert_eq!(
            filter.call(&Value::from(12), no_args()).unwrap(),
            Value::from("12")
        );
        assert!(builtins().iter().any(|(name, _)| *name == "safe"));
    }
}
