use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::value::{serialize_int, StringKind, Value};

/// A map key. Anything serialized as a map or a struct ends up keyed by these.
///
/// `Str` exists so lookups like `map.get(&Key::Str("name"))` don't allocate: it is equal
/// to, and hashes like, the owned `String` version.
#[derive(Debug, Clone)]
pub enum Key<'a> {
    Bool(bool),
    Int(i128),
    String(Arc<str>),
    Str(&'a str),
}

impl<'a> Key<'a> {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::String(s) => Some(s),
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::String(s) => Value::String(s.clone(), StringKind::Normal),
            Key::Str(s) => Value::from(*s),
        }
    }

    pub(crate) fn format(&self, f: &mut impl std::io::Write) -> std::io::Result<()> {
        match self {
            Key::Bool(v) => f.write_all(if *v { b"true" } else { b"false" }),
            Key::Int(v) => crate::value::format_int(*v, f),
            Key::String(v) => f.write_all(v.as_bytes()),
            Key::Str(v) => f.write_all(v.as_bytes()),
        }
    }

    /// Bools sort first, then numbers, then strings.
    fn rank(&self) -> u8 {
        match self {
            Key::Bool(_) => 0,
            Key::Int(_) => 1,
            Key::String(_) | Key::Str(_) => 2,
        }
    }
}

impl PartialEq for Key<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key<'_> {}

impl PartialOrd for Key<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            _ => match (self.as_str(), other.as_str()) {
                (Some(a), Some(b)) => a.cmp(b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

impl Hash for Key<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Key::Bool(v) => v.hash(state),
            Key::Int(v) => v.hash(state),
            Key::String(s) => s.as_ref().hash(state),
            Key::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(v) => write!(f, "{v}"),
            Key::Int(v) => write!(f, "{v}"),
            Key::Str(v) => f.write_str(v),
            Key::String(v) => f.write_str(v),
        }
    }
}

impl Serialize for Key<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Key::Bool(b) => serializer.serialize_bool(*b),
            Key::Int(i) => serialize_int(*i, serializer),
            Key::String(s) => serializer.serialize_str(s),
            Key::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&'static str> for Key<'static> {
    fn from(value: &'static str) -> Self {
        Key::Str(value)
    }
}

impl From<String> for Key<'static> {
    fn from(value: String) -> Self {
        Key::String(Arc::from(value))
    }
}

impl From<Arc<str>> for Key<'static> {
    fn from(value: Arc<str>) -> Self {
        Key::String(value)
    }
}

impl From<Cow<'_, str>> for Key<'static> {
    fn from(value: Cow<'_, str>) -> Self {
        Key::String(Arc::from(value.as_ref()))
    }
}

impl From<bool> for Key<'static> {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

macro_rules! key_from_int {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Key<'static> {
                fn from(value: $ty) -> Self {
                    Key::Int(value as i128)
                }
            }
        )+
    };
}

key_from_int!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, i128);
