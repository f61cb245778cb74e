use serde::{ser, Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::value::{take_value_handle, Value, ValueMap, ValueRepr, VALUE_HANDLE_MARKER};
use std::sync::Arc;

fn invalid_key() -> Error {
    Error::new(ErrorKind::BadSerialization, "map key is not a string")
}

pub struct ValueSerializer;

impl Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Error> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Error> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Error> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Error> {
        Ok(Value(ValueRepr::I64(v)))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, Error> {
        i64::try_from(v)
            .map(|v| Value(ValueRepr::I64(v)))
            .map_err(|_| Error::new(ErrorKind::BadSerialization, "integer out of range"))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Error> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Error> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Error> {
        Ok(Value(ValueRepr::I64(v as i64)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Error> {
        i64::try_from(v)
            .map(|v| Value(ValueRepr::I64(v)))
            .map_err(|_| Error::new(ErrorKind::BadSerialization, "integer out of range"))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, Error> {
        i64::try_from(v)
            .map(|v| Value(ValueRepr::I64(v)))
            .map_err(|_| Error::new(ErrorKind::BadSerialization, "integer out of range"))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Error> {
        Ok(Value(ValueRepr::F64(v as f64)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Error> {
        Ok(Value(ValueRepr::F64(v)))
    }

    fn serialize_char(self, v: char) -> Result<Value, Error> {
        Ok(Value::from(v))
    }

    fn serialize_str(self, value: &str) -> Result<Value, Error> {
        Ok(Value::from(value))
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<Value, Error> {
        Ok(Value::from(
            value.iter().map(|&b| Value::from(b)).collect::<Vec<_>>(),
        ))
    }

    fn serialize_none(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Error> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Error> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Error> {
        let mut map = ValueMap::new();
        map.insert(variant.to_string(), ok!(value.serialize(self)));
        Ok(Value(ValueRepr::Map(Arc::new(map))))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(len.unwrap_or(0).min(1024)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Ok(SerializeTupleVariant {
            name: variant,
            fields: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Ok(SerializeMap {
            entries: ValueMap::new(),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Ok(SerializeStruct {
            name,
            fields: ValueMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Ok(SerializeStructVariant {
            variant,
            map: ValueMap::new(),
        })
    }
}

/// Serializes map keys into owned strings.
struct KeySerializer;

macro_rules! key_from_display {
    ($method:ident, $ty:ty) => {
        fn $method(self, v: $ty) -> Result<String, Error> {
            Ok(v.to_string())
        }
    };
}

impl Serializer for KeySerializer {
    type Ok = String;
    type Error = Error;

    type SerializeSeq = ser::Impossible<String, Error>;
    type SerializeTuple = ser::Impossible<String, Error>;
    type SerializeTupleStruct = ser::Impossible<String, Error>;
    type SerializeTupleVariant = ser::Impossible<String, Error>;
    type SerializeMap = ser::Impossible<String, Error>;
    type SerializeStruct = ser::Impossible<String, Error>;
    type SerializeStructVariant = ser::Impossible<String, Error>;

    key_from_display!(serialize_bool, bool);
    key_from_display!(serialize_i8, i8);
    key_from_display!(serialize_i16, i16);
    key_from_display!(serialize_i32, i32);
    key_from_display!(serialize_i64, i64);
    key_from_display!(serialize_u8, u8);
    key_from_display!(serialize_u16, u16);
    key_from_display!(serialize_u32, u32);
    key_from_display!(serialize_u64, u64);
    key_from_display!(serialize_char, char);

    fn serialize_f32(self, _v: f32) -> Result<String, Error> {
        Err(invalid_key())
    }

    fn serialize_f64(self, _v: f64) -> Result<String, Error> {
        Err(invalid_key())
    }

    fn serialize_str(self, value: &str) -> Result<String, Error> {
        Ok(value.to_string())
    }

    fn serialize_bytes(self, _value: &[u8]) -> Result<String, Error> {
        Err(invalid_key())
    }

    fn serialize_none(self) -> Result<String, Error> {
        Err(invalid_key())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String, Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String, Error> {
        Err(invalid_key())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, Error> {
        Err(invalid_key())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String, Error> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, Error> {
        Err(invalid_key())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Err(invalid_key())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Error> {
        Err(invalid_key())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        Err(invalid_key())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Err(invalid_key())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Err(invalid_key())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Err(invalid_key())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Err(invalid_key())
    }
}

pub struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.elements.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::List(Arc::new(self.elements))))
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.elements.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::List(Arc::new(self.elements))))
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.elements.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::List(Arc::new(self.elements))))
    }
}

pub struct SerializeTupleVariant {
    name: &'static str,
    fields: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.fields.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut map = ValueMap::new();
        map.insert(self.name.to_string(), Value::from(self.fields));
        Ok(Value(ValueRepr::Map(Arc::new(map))))
    }
}

pub struct SerializeMap {
    entries: ValueMap,
    key: Option<String>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Error> {
        self.key = Some(ok!(key.serialize(KeySerializer)));
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let key = self
            .key
            .take()
            .expect("serialize_value called before serialize_key");
        self.entries.insert(key, ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Map(Arc::new(self.entries))))
    }
}

pub struct SerializeStruct {
    name: &'static str,
    fields: ValueMap,
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        self.fields
            .insert(key.to_string(), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        if self.name == VALUE_HANDLE_MARKER {
            let handle = self
                .fields
                .get("handle")
                .and_then(|x| x.as_i64())
                .unwrap_or(0) as usize;
            return take_value_handle(handle).ok_or_else(|| {
                Error::new(ErrorKind::BadSerialization, "value handle not in registry")
            });
        }
        Ok(Value(ValueRepr::Map(Arc::new(self.fields))))
    }
}

pub struct SerializeStructVariant {
    variant: &'static str,
    map: ValueMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Error> {
        self.map
            .insert(key.to_string(), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut rv = ValueMap::new();
        rv.insert(
            self.variant.to_string(),
            Value(ValueRepr::Map(Arc::new(self.map))),
        );
        Ok(Value(ValueRepr::Map(Arc::new(rv))))
    }
}
