//! Typed front end: Rust types that describe their own layout.

use std::{
    fmt,
    io::{Read, Write},
    marker::PhantomData,
    sync::Arc,
};

use crate::{
    cache::PlanCache,
    errors::{DataError, LayoutError, Result},
    layout::TypeLayout,
    schema::Schema,
    value::Value,
};

/// A Rust type with a binary layout.
///
/// The layout is compiled once per type and kept in [PlanCache::global].
/// `to_value` must produce a [Value::Struct] carrying every field the layout
/// declares; `from_value` receives the decoded struct.
pub trait BinaryLayout: Sized + 'static {
    fn layout() -> TypeLayout;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, DataError>;
}

/// Encoder bound to the compiled schema of `T`.
pub struct Serializer<T> {
    schema: Arc<Schema>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: BinaryLayout> Serializer<T> {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn serialize<W: Write>(&self, writer: &mut W, value: &T) -> Result<usize> {
        self.schema.serialize(writer, &value.to_value())
    }

    pub fn to_bytes(&self, value: &T) -> Result<Vec<u8>> {
        self.schema.to_bytes(&value.to_value())
    }
}

impl<T> Clone for Serializer<T> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Serializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer").field("schema", &self.schema.name()).finish()
    }
}

/// Decoder bound to the compiled schema of `T`.
pub struct Deserializer<T> {
    schema: Arc<Schema>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: BinaryLayout> Deserializer<T> {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn deserialize<R: Read>(&self, reader: &mut R) -> Result<T> {
        let value = self.schema.deserialize(reader)?;
        Ok(T::from_value(value)?)
    }

    pub fn from_bytes(&self, data: &[u8]) -> Result<T> {
        let value = self.schema.deserialize_slice(data)?;
        Ok(T::from_value(value)?)
    }
}

impl<T> Clone for Deserializer<T> {
    fn clone(&self) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Deserializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deserializer").field("schema", &self.schema.name()).finish()
    }
}

pub fn get_serializer<T: BinaryLayout>() -> Result<Serializer<T>, LayoutError> {
    Ok(Serializer {
        schema: PlanCache::global().get::<T>()?,
        _marker: PhantomData,
    })
}

pub fn get_deserializer<T: BinaryLayout>() -> Result<Deserializer<T>, LayoutError> {
    Ok(Deserializer {
        schema: PlanCache::global().get::<T>()?,
        _marker: PhantomData,
    })
}

pub fn to_bytes<T: BinaryLayout>(value: &T) -> Result<Vec<u8>> {
    get_serializer::<T>()?.to_bytes(value)
}

pub fn from_bytes<T: BinaryLayout>(data: &[u8]) -> Result<T> {
    get_deserializer::<T>()?.from_bytes(data)
}
