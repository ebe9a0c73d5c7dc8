//! `serde::Serializer` turning any `Serialize` type into a [`Value`].
use std::fmt;
use std::sync::Arc;

use serde::ser::{self, Serialize};

use crate::value::{Key, Map, StringKind, Value};

#[derive(Debug)]
pub struct SerializationFailed(String);

impl fmt::Display for SerializationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "serialization failed: {}", self.0)
    }
}

impl std::error::Error for SerializationFailed {}

impl ser::Error for SerializationFailed {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        SerializationFailed(msg.to_string())
    }
}

type Res<T> = Result<T, SerializationFailed>;

/// `{"Variant": inner}`, the externally tagged representation serde uses by default
fn tagged(variant: &'static str, inner: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(Key::Str(variant), inner);
    Value::Map(Arc::new(map))
}

pub(crate) struct ValueSerializer;

macro_rules! serialize_ints {
    ($($method:ident: $ty:ty),+ $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Res<Value> {
                Ok(Value::Int(v as i128))
            }
        )+
    };
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = SerializationFailed;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder>;
    type SerializeMap = MapBuilder;
    type SerializeStruct = StructBuilder;
    type SerializeStructVariant = VariantBuilder<StructBuilder>;

    serialize_ints!(
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
    );

    fn serialize_u128(self, v: u128) -> Res<Value> {
        Ok(Value::from(v))
    }

    fn serialize_bool(self, v: bool) -> Res<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_f32(self, v: f32) -> Res<Value> {
        Ok(Value::Float(v as f64))
    }

    fn serialize_f64(self, v: f64) -> Res<Value> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Res<Value> {
        let mut buf = [0u8; 4];
        Ok(Value::from(&*v.encode_utf8(&mut buf)))
    }

    fn serialize_str(self, v: &str) -> Res<Value> {
        Ok(Value::String(Arc::from(v), StringKind::Normal))
    }

    fn serialize_bytes(self, v: &[u8]) -> Res<Value> {
        Ok(Value::Bytes(Arc::new(v.to_vec())))
    }

    fn serialize_none(self) -> Res<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Res<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Res<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Res<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Res<Value> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Res<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Res<Value> {
        Ok(tagged(variant, value.serialize(self)?))
    }

    fn serialize_seq(self, len: Option<usize>) -> Res<SeqBuilder> {
        Ok(SeqBuilder(Vec::with_capacity(len.unwrap_or(0))))
    }

    fn serialize_tuple(self, len: usize) -> Res<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Res<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Res<VariantBuilder<SeqBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: self.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Res<MapBuilder> {
        Ok(MapBuilder {
            entries: Map::with_capacity(len.unwrap_or(0)),
            key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Res<StructBuilder> {
        Ok(StructBuilder(Map::with_capacity(len)))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Res<VariantBuilder<StructBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: StructBuilder(Map::with_capacity(len)),
        })
    }
}

pub(crate) struct SeqBuilder(Vec<Value>);

macro_rules! impl_seq_builder {
    ($($trait:ident::$method:ident),+) => {
        $(
            impl ser::$trait for SeqBuilder {
                type Ok = Value;
                type Error = SerializationFailed;

                fn $method<T: Serialize + ?Sized>(&mut self, value: &T) -> Res<()> {
                    self.0.push(value.serialize(ValueSerializer)?);
                    Ok(())
                }

                fn end(self) -> Res<Value> {
                    Ok(Value::Array(Arc::new(self.0)))
                }
            }
        )+
    };
}

impl_seq_builder!(
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field
);

pub(crate) struct StructBuilder(Map);

impl ser::SerializeStruct for StructBuilder {
    type Ok = Value;
    type Error = SerializationFailed;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Res<()> {
        self.0.insert(Key::Str(key), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Res<Value> {
        Ok(Value::Map(Arc::new(self.0)))
    }
}

pub(crate) struct VariantBuilder<T> {
    variant: &'static str,
    inner: T,
}

impl ser::SerializeTupleVariant for VariantBuilder<SeqBuilder> {
    type Ok = Value;
    type Error = SerializationFailed;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Res<()> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Res<Value> {
        Ok(tagged(self.variant, ser::SerializeSeq::end(self.inner)?))
    }
}

impl ser::SerializeStructVariant for VariantBuilder<StructBuilder> {
    type Ok = Value;
    type Error = SerializationFailed;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Res<()> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Res<Value> {
        Ok(tagged(self.variant, ser::SerializeStruct::end(self.inner)?))
    }
}

pub(crate) struct MapBuilder {
    entries: Map,
    key: Option<Key<'static>>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = SerializationFailed;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Res<()> {
        let key = key.serialize(ValueSerializer)?;
        match key.as_key() {
            Ok(k) => {
                self.key = Some(k);
                Ok(())
            }
            Err(_) => Err(SerializationFailed(format!(
                "map key must be a string, an integer or a bool, not {}",
                key.name()
            ))),
        }
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Res<()> {
        let Some(key) = self.key.take() else {
            return Err(SerializationFailed(
                "serialize_value called before serialize_key".to_string(),
            ));
        };
        self.entries.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Res<Value> {
        Ok(Value::Map(Arc::new(self.entries)))
    }
}
