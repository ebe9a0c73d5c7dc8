use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Formatter;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

mod key;
pub(crate) mod number;
mod ser;

use crate::errors::{Error, TesseraResult};
use crate::value::number::Number;
use crate::HashMap;
pub use key::Key;

#[cfg(not(feature = "preserve_order"))]
pub type Map = HashMap<Key<'static>, Value>;

#[cfg(feature = "preserve_order")]
pub type Map = indexmap::IndexMap<Key<'static>, Value>;

pub(crate) fn format_int(v: i128, f: &mut impl std::io::Write) -> std::io::Result<()> {
    #[cfg(feature = "no_fmt")]
    {
        let mut buf = itoa::Buffer::new();
        f.write_all(buf.format(v).as_bytes())
    }
    #[cfg(not(feature = "no_fmt"))]
    write!(f, "{v}")
}

/// Serializes with the narrowest integer type that fits, many serializers don't handle 128 bits.
pub(crate) fn serialize_int<S: Serializer>(v: i128, serializer: S) -> Result<S::Ok, S::Error> {
    if let Ok(i) = i64::try_from(v) {
        serializer.serialize_i64(i)
    } else if let Ok(u) = u64::try_from(v) {
        serializer.serialize_u64(u)
    } else {
        serializer.serialize_i128(v)
    }
}

#[inline]
pub(crate) fn format_map(map: &Map, f: &mut impl std::io::Write) -> std::io::Result<()> {
    let mut key_val: Box<_> = map.iter().collect();
    // Keys are sorted to have deterministic output if preserve_order is not used
    if cfg!(not(feature = "preserve_order")) {
        key_val.sort_by_key(|elem| elem.0);
    }
    f.write_all(b"{")?;
    for (idx, (key, value)) in key_val.iter().enumerate() {
        if idx > 0 {
            f.write_all(b", ")?;
        }
        if let Some(v) = key.as_str() {
            write!(f, "{v:?}")?
        } else {
            key.format(f)?;
        }

        f.write_all(b": ")?;
        match value {
            Value::String(v, _) => write!(f, "{v:?}")?,
            _ => value.format(f)?,
        }
    }
    f.write_all(b"}")
}

/// The escaping state of a string.
///
/// A string is at most one of safe or marked for escaping: marking a safe string
/// for escaping leaves it safe.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StringKind {
    Normal,
    /// Never escaped on output
    Safe,
    /// Always escaped on output, even when autoescape is off
    Escape,
}

/// A value computed on lookup: `{{ user.full_name }}` calls it with `user`.
#[derive(Clone)]
pub struct Callable(Arc<dyn Fn(&Value) -> Value + Send + Sync>);

impl Callable {
    pub fn new(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, parent: &Value) -> Value {
        (self.0)(parent)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Callable")
    }
}

/// Everything a template can see. Context data is converted into this through serde.
///
/// All integers are held as `i128`; unsigned values too large for it become floats.
#[derive(Debug, Clone)]
pub enum Value {
    /// The result of a failed lookup
    Undefined,
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Array(Arc<Vec<Value>>),
    Bytes(Arc<Vec<u8>>),
    String(Arc<str>, StringKind),
    Map(Arc<Map>),
    Callable(Callable),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        if self.format(&mut out).is_err() {
            return Err(fmt::Error);
        }
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // First the easy ones
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(v), Value::Bool(v2)) => v == v2,
            (Value::Array(v), Value::Array(v2)) => v == v2,
            (Value::Bytes(v), Value::Bytes(v2)) => v == v2,
            // The escaping state is not part of equality: `"a"|safe == "a"`
            (Value::String(v, _), Value::String(v2, _)) => v == v2,
            (Value::Map(v), Value::Map(v2)) => v == v2,
            (Value::Callable(v), Value::Callable(v2)) => Arc::ptr_eq(&v.0, &v2.0),
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(_), Value::Int(_) | Value::Float(_))
            | (Value::Int(_), Value::Float(_)) => self.as_f64() == other.as_f64(),
            (_, _) => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => Some(Ordering::Equal),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(v), Value::Bool(v2)) => v.partial_cmp(v2),
            (Value::Array(v), Value::Array(v2)) => v.partial_cmp(v2),
            (Value::Bytes(v), Value::Bytes(v2)) => v.partial_cmp(v2),
            (Value::String(v, _), Value::String(v2, _)) => v.partial_cmp(v2),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(_), Value::Int(_) | Value::Float(_))
            | (Value::Int(_), Value::Float(_)) => self.as_f64()?.partial_cmp(&other.as_f64()?),
            (_, _) => None,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        if let Some(res) = self.partial_cmp(other) {
            return res;
        }

        // Nonsensical hardcoded ordering, don't compare arrays and integers...
        Ordering::Greater
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Undefined | Value::Null | Value::Callable(_) => 0.hash(state),
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            // Whole floats equal the matching integer so they have to hash like it
            Value::Float(v) => match Number::Float(*v).as_integer() {
                Some(i) => i.hash(state),
                None => v.to_bits().hash(state),
            },
            Value::Bytes(v) => v.hash(state),
            Value::String(v, _) => v.hash(state),
            Value::Array(v) => v.hash(state),
            // Equal maps can iterate in different orders
            Value::Map(v) => v.len().hash(state),
        }
    }
}

impl Value {
    pub(crate) fn format(&self, f: &mut impl std::io::Write) -> std::io::Result<()> {
        match self {
            Value::Null | Value::Undefined | Value::Callable(_) => Ok(()),
            Value::Bool(v) => f.write_all(if *v { b"true" } else { b"false" }),
            Value::Bytes(v) => f.write_all(v),
            Value::String(v, _) => f.write_all(v.as_bytes()),
            Value::Array(v) => {
                f.write_all(b"[")?;

                for (idx, elem) in v.iter().enumerate() {
                    if idx > 0 {
                        f.write_all(b", ")?;
                    }

                    match elem {
                        Value::String(v, _) => write!(f, "{v:?}")?,
                        _ => elem.format(f)?,
                    }
                }
                f.write_all(b"]")
            }
            Value::Map(v) => format_map(v, f),
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => format_int(*v, f),
        }
    }

    /// Converts anything serializable into a Value.
    /// Types that cannot be represented (eg a map with float keys) become `Undefined`.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Value {
        Self::try_from_serializable(value).unwrap_or(Value::Undefined)
    }

    pub fn try_from_serializable<T: Serialize + ?Sized>(value: &T) -> TesseraResult<Value> {
        Serialize::serialize(value, ser::ValueSerializer)
            .map_err(|e| Error::chain("Failed to convert value", e))
    }

    pub fn safe_string(val: &str) -> Value {
        Value::String(Arc::from(val), StringKind::Safe)
    }

    pub fn callable(f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Value {
        Value::Callable(Callable::new(f))
    }

    pub(crate) fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(v) => Some(Number::Integer(*v)),
            Value::Float(v) => Some(Number::Float(*v)),
            _ => None,
        }
    }

    /// Numbers, or strings that look like numbers: `"3"`, `" 1.5 "`.
    pub(crate) fn to_f64_lossy(&self) -> Option<f64> {
        match self {
            Value::String(s, _) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => self.as_f64(),
        }
    }

    pub(crate) fn is_number(&self) -> bool {
        matches!(self, Value::Int(..) | Value::Float(..))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s, _) => Some(s),
            _ => None,
        }
    }

    /// The escaping state of this value. Anything that isn't a string is `Normal`.
    pub fn string_kind(&self) -> StringKind {
        match self {
            Value::String(_, kind) => *kind,
            _ => StringKind::Normal,
        }
    }

    #[inline]
    pub fn is_safe(&self) -> bool {
        self.string_kind() == StringKind::Safe
    }

    #[inline]
    pub fn is_marked_for_escaping(&self) -> bool {
        self.string_kind() == StringKind::Escape
    }

    /// Tags the value as safe, stringifying it if it isn't a string.
    #[inline]
    pub fn mark_safe(self) -> Self {
        match self {
            Value::String(s, _) => Value::String(s, StringKind::Safe),
            _ => Value::String(Arc::from(self.render_to_string()), StringKind::Safe),
        }
    }

    /// Tags the value for escaping, unless it is already safe.
    #[inline]
    pub fn mark_for_escaping(self) -> Self {
        match self {
            Value::String(_, StringKind::Safe) => self,
            Value::String(s, _) => Value::String(s, StringKind::Escape),
            _ => Value::String(Arc::from(self.render_to_string()), StringKind::Escape),
        }
    }

    /// The plain string version of the value, as it would be output
    pub fn render_to_string(&self) -> String {
        match self {
            Value::String(s, _) => s.to_string(),
            _ => self.to_string(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vec(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<Arc<Map>> {
        match self {
            Value::Map(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Null => false,
            Value::Bool(v) => *v,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Array(v) => !v.is_empty(),
            Value::Bytes(v) => !v.is_empty(),
            Value::String(v, _) => !v.is_empty(),
            Value::Map(v) => !v.is_empty(),
            Value::Callable(_) => true,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Map(v) => Some(v.len()),
            Value::Array(v) => Some(v.len()),
            Value::Bytes(v) => Some(v.len()),
            Value::String(v, _) => {
                #[cfg(feature = "unicode")]
                {
                    Some(unic_segment::Graphemes::new(v).count())
                }
                #[cfg(not(feature = "unicode"))]
                {
                    Some(v.chars().count())
                }
            }
            _ => None,
        }
    }

    /// Turns the value into the items a `{% for %}` iterates on.
    /// Maps yield their keys; `pairs` is true when the keys and values are wanted.
    pub(crate) fn iter_items(&self, pairs: bool) -> TesseraResult<Vec<Value>> {
        match self {
            Value::Undefined | Value::Null => Ok(Vec::new()),
            Value::Array(arr) => Ok(arr.as_ref().clone()),
            Value::Bytes(b) => Ok(b.iter().map(|byte| Value::from(*byte)).collect()),
            Value::String(s, kind) => {
                #[cfg(feature = "unicode")]
                let items = unic_segment::Graphemes::new(s)
                    .map(|g| Value::String(Arc::from(g), *kind))
                    .collect();
                #[cfg(not(feature = "unicode"))]
                let items = s
                    .chars()
                    .map(|c| Value::String(Arc::from(c.to_string()), *kind))
                    .collect();
                Ok(items)
            }
            Value::Map(m) => {
                let mut keys: Vec<_> = m.iter().collect();
                if cfg!(not(feature = "preserve_order")) {
                    keys.sort_by_key(|elem| elem.0);
                }
                Ok(keys
                    .into_iter()
                    .map(|(k, v)| {
                        if pairs {
                            Value::from(vec![k.as_value(), v.clone()])
                        } else {
                            k.as_value()
                        }
                    })
                    .collect())
            }
            _ => Err(Error::message(format!(
                "'{}' object is not iterable",
                self.name()
            ))),
        }
    }

    pub(crate) fn as_key(&self) -> TesseraResult<Key<'static>> {
        let key = match self {
            Value::Bool(v) => Key::Bool(*v),
            Value::Int(v) => Key::Int(*v),
            Value::Float(v) => match Number::Float(*v).as_integer() {
                Some(i) => Key::Int(i),
                None => return Err(Error::message(format!("`{v}` cannot be a map key"))),
            },
            Value::String(v, _) => Key::String(v.clone()),
            _ => {
                return Err(Error::message(format!(
                    "`{}` cannot be a map key: only integers, bools and strings are allowed",
                    self.name()
                )))
            }
        };
        Ok(key)
    }

    /// The `in` operator: substring for strings, element for arrays and key for maps.
    pub(crate) fn contains(&self, needle: &Value) -> TesseraResult<bool> {
        match self {
            Value::Array(arr) => Ok(arr.contains(needle)),
            Value::String(s, _) => {
                if let Some(needle_str) = needle.as_str() {
                    Ok(s.contains(needle_str))
                } else {
                    Err(Error::message(format!(
                        "'in <string>' requires string as left operand, not {}",
                        needle.name()
                    )))
                }
            }
            Value::Map(m) => match &needle.as_key() {
                Ok(k) => Ok(m.contains_key(k)),
                Err(_) => Ok(false),
            },
            _ => Err(Error::message(format!(
                "`in` cannot be used on a container of type `{}`. It can only be used on arrays, strings and map/structs",
                self.name()
            ))),
        }
    }

    /// When doing hello.name, name is the attr
    pub fn get_attr(&self, attr: &str) -> Value {
        match self {
            Value::Map(m) => m.get(&Key::Str(attr)).cloned().unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    }

    /// One segment of a dotted lookup: map keys first, then array indices.
    pub(crate) fn lookup(&self, segment: &str) -> Value {
        match self {
            Value::Map(m) => {
                if let Some(v) = m.get(&Key::Str(segment)) {
                    return v.clone();
                }
                match segment.parse::<i128>() {
                    Ok(idx) => m.get(&Key::Int(idx)).cloned().unwrap_or(Value::Undefined),
                    Err(_) => Value::Undefined,
                }
            }
            Value::Array(arr) => match segment.parse::<usize>() {
                Ok(idx) => arr.get(idx).cloned().unwrap_or(Value::Undefined),
                Err(_) => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    /// Returns a string name for the current enum member.
    /// Used in error messages
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Array(_) => "array",
            Value::Bytes(_) => "bytes",
            Value::String(_, _) => "string",
            Value::Map(_) => "map/struct",
            Value::Callable(_) => "callable",
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null | Value::Undefined | Value::Callable(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serialize_int(*i, serializer),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::String(s, _) => serializer.serialize_str(s),
            Value::Array(arr) => {
                let mut seq = serializer.serialize_seq(Some(arr.len()))?;
                for val in arr.iter() {
                    seq.serialize_element(val)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (key, val) in map.iter() {
                    m.serialize_entry(key, val)?;
                }
                m.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value), StringKind::Normal)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value), StringKind::Normal)
    }
}

macro_rules! value_from_int {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Int(value as i128)
                }
            }
        )+
    };
}

value_from_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, i128);

impl From<u128> for Value {
    fn from(value: u128) -> Self {
        match i128::try_from(value) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(value as f64),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Key<'static>> for Value {
    fn from(value: Key<'static>) -> Self {
        value.as_value()
    }
}

impl From<&[Value]> for Value {
    fn from(value: &[Value]) -> Self {
        Value::Array(Arc::new(value.to_vec()))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(Arc::new(value.into_iter().map(|v| v.into()).collect()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl<T: Into<Value>> From<BTreeSet<T>> for Value {
    fn from(value: BTreeSet<T>) -> Self {
        Value::Array(Arc::new(value.into_iter().map(|v| v.into()).collect()))
    }
}

impl<K: Into<Key<'static>>, T: Into<Value>> From<HashMap<K, T>> for Value {
    fn from(input: HashMap<K, T>) -> Self {
        let mut map = Map::with_capacity(input.len());
        for (key, value) in input {
            map.insert(key.into(), value.into());
        }
        Value::Map(Arc::new(map))
    }
}

impl<K: Into<Key<'static>>, T: Into<Value>> From<BTreeMap<K, T>> for Value {
    fn from(input: BTreeMap<K, T>) -> Self {
        let mut map = Map::with_capacity(input.len());
        for (key, value) in input {
            map.insert(key.into(), value.into());
        }
        Value::Map(Arc::new(map))
    }
}

/// What a filter can return: a value or a result of a value.
pub trait FunctionResult {
    fn into_result(self) -> TesseraResult<Value>;
}

impl<I: Into<Value>> FunctionResult for TesseraResult<I> {
    fn into_result(self) -> TesseraResult<Value> {
        self.map(Into::into)
    }
}

impl<I: Into<Value>> FunctionResult for I {
    fn into_result(self) -> TesseraResult<Value> {
        Ok(self.into())
    }
}
