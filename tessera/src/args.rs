use std::borrow::Cow;

use crate::errors::{Error, TesseraResult};
use crate::value::number::Number;
use crate::value::Map;
use crate::Value;

/// Converts a `Value` into the type a filter wants for its input or arguments.
pub trait ArgFromValue<'k> {
    type Output;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output>;
}

macro_rules! impl_for_primitive {
    ($ty:ident, $name:literal, $convert:expr) => {
        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let convert: fn(&Value) -> Option<$ty> = $convert;
                convert(&value).ok_or_else(|| Error::invalid_arg_type($name, value.name()))
            }
        }

        impl<'k> ArgFromValue<'k> for $ty {
            type Output = Self;

            fn from_value(value: &Value) -> Result<Self, Error> {
                TryFrom::try_from(value.clone())
            }
        }
    };
}

/// Whole numbers, including whole floats and strings holding an integer: filter arguments
/// are often written quoted, eg `truncatechars:"10"`
fn whole_number(value: &Value) -> Option<i128> {
    match value {
        Value::Int(v) => Some(*v),
        Value::Float(v) => Number::Float(*v).as_integer(),
        Value::String(s, _) => s.trim().parse().ok(),
        _ => None,
    }
}

macro_rules! impl_for_int {
    ($($ty:ident),+) => {
        $(
            impl_for_primitive!($ty, "integer", |v| {
                whole_number(v).and_then(|i| $ty::try_from(i).ok())
            });
        )+
    };
}

impl_for_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl_for_primitive!(bool, "bool", |v| v.as_bool());

impl_for_primitive!(f64, "float", |v| v.as_f64());

impl<'k> ArgFromValue<'k> for String {
    type Output = String;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        Ok(value.render_to_string())
    }
}

/// Missing values are treated as empty strings.
impl<'k> ArgFromValue<'k> for &str {
    type Output = &'k str;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        match value {
            Value::String(s, _) => Ok(s),
            Value::Undefined | Value::Null => Ok(""),
            _ => Err(Error::invalid_arg_type("&str", value.name())),
        }
    }
}

impl<'k> ArgFromValue<'k> for Cow<'_, str> {
    type Output = Cow<'k, str>;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        match value {
            Value::String(s, _) => Ok(Cow::Borrowed(s)),
            _ => Ok(Cow::Owned(value.render_to_string())),
        }
    }
}

impl<'k> ArgFromValue<'k> for &Value {
    type Output = &'k Value;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        Ok(value)
    }
}

impl<'k> ArgFromValue<'k> for Value {
    type Output = Value;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        Ok(value.clone())
    }
}

impl<'k> ArgFromValue<'k> for Number {
    type Output = Number;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        value
            .as_number()
            .ok_or_else(|| Error::invalid_arg_type("Number", value.name()))
    }
}

impl<'k> ArgFromValue<'k> for Map {
    type Output = Map;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        value
            .as_map()
            .cloned()
            .ok_or_else(|| Error::invalid_arg_type("Map", value.name()))
    }
}

impl<'k, T: ArgFromValue<'k, Output = T>> ArgFromValue<'k> for Vec<T> {
    type Output = Vec<T>;

    fn from_value(value: &'k Value) -> TesseraResult<Self::Output> {
        match value {
            Value::Array(arr) => {
                let mut res = Vec::with_capacity(arr.len());
                for v in arr.iter() {
                    res.push(T::from_value(v)?);
                }
                Ok(res)
            }
            _ => Err(Error::invalid_arg_type("Vec<Value>", value.name())),
        }
    }
}

/// The positional arguments a filter is called with.
///
/// Templates pass at most one argument (`value|filter:arg`). Filters declared as needing
/// the autoescape flag get it appended as a trailing boolean.
#[derive(Debug, Clone, Default)]
pub struct Args {
    filter: String,
    values: Vec<Value>,
}

impl Args {
    pub fn new(filter: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            filter: filter.into(),
            values,
        }
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The raw value at that position
    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn get<'k, T>(&'k self, idx: usize) -> TesseraResult<Option<T>>
    where
        T: ArgFromValue<'k, Output = T>,
    {
        match self.values.get(idx) {
            Some(v) => T::from_value(v).map(|v| Some(v)),
            None => Ok(None),
        }
    }

    pub fn must_get<'k, T>(&'k self, idx: usize) -> TesseraResult<T>
    where
        T: ArgFromValue<'k, Output = T>,
    {
        if let Some(v) = self.get(idx)? {
            Ok(v)
        } else {
            Err(Error::missing_arg(&self.filter))
        }
    }

    /// The trailing autoescape flag. Anything else than `false` means on.
    pub fn autoescape(&self) -> bool {
        !matches!(self.values.last(), Some(Value::Bool(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_get_args_with_type() {
        let args = Args::new("test", vec![Value::from("world"), Value::from(1.1)]);
        assert_eq!(args.get::<&str>(0).unwrap(), Some("world"));
        assert_eq!(args.get::<f64>(1).unwrap(), Some(1.1));
        assert_eq!(args.get::<i64>(2).unwrap(), None);
        assert!(args.get::<i64>(0).is_err());
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn missing_required_arg_names_the_filter() {
        let args = Args::new("default", vec![]);
        let err = args.must_get::<Value>(0).unwrap_err();
        assert_eq!(err.to_string(), "Filter `default` is missing its argument");
    }

    #[test]
    fn integers_can_come_from_strings() {
        let args = Args::new("t", vec![Value::from(" 12 "), Value::from("1.5")]);
        assert_eq!(args.get::<usize>(0).unwrap(), Some(12));
        assert!(args.get::<usize>(1).is_err());
    }

    #[test]
    fn autoescape_flag_is_the_last_arg() {
        let mut args = Args::new("join", vec![Value::from(",")]);
        assert!(args.autoescape());
        args.push(Value::Bool(false));
        assert!(!args.autoescape());
    }
}
