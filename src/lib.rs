//! # bitlayout
//!
//! Declarative binary layouts compiled once into reusable, bit-exact
//! serialize/deserialize plans.
//!
//! Describe a composite type with a [TypeLayout]: field order, bit widths,
//! byte order, string encodings, fixed or length-keyed collections and nested
//! composites. [Schema::compile] validates the layout and builds a plan which
//! translates [Value] trees to and from bytes. Rust types implementing
//! [BinaryLayout] get a cached plan through [to_bytes] and [from_bytes].
//!
//! ## Example
//!
//! ```
//! use bitlayout::{
//!     CollectionTag, ElementLayout, FieldLayout, PrimitiveKind, Schema, TypeLayout, Value, record,
//! };
//!
//! let layout = TypeLayout::new("Packet")
//!     .field(FieldLayout::primitive("version", 0, PrimitiveKind::U8).bits(2))
//!     .field(FieldLayout::boolean("urgent", 1).bits(1))
//!     .field(FieldLayout::primitive("count", 2, PrimitiveKind::U8).length_of("items"))
//!     .field(FieldLayout::list(
//!         "items",
//!         3,
//!         ElementLayout::scalar(PrimitiveKind::U8),
//!         CollectionTag::keyed("items"),
//!     ));
//!
//! let schema = Schema::compile(&layout).unwrap();
//! let packet = record([
//!     ("version", Value::U8(2)),
//!     ("urgent", Value::Bool(true)),
//!     ("count", Value::U8(0)),
//!     ("items", Value::List(vec![Value::U8(7), Value::U8(9)])),
//! ]);
//!
//! let bytes = schema.to_bytes(&packet).unwrap();
//! assert_eq!(bytes, [0x06, 2, 7, 9]);
//!
//! let decoded = schema.deserialize_slice(&bytes).unwrap();
//! assert_eq!(decoded.get_field("count"), Some(&Value::U8(2)));
//! ```

pub mod bits;
pub mod cache;
pub mod compiled;
pub mod context;
pub mod custom;
mod de;
pub mod descriptor;
pub mod errors;
pub mod layout;
pub mod length_key;
pub mod primitive;
pub mod schema;
mod ser;
#[cfg(feature = "serde")]
pub mod serde;
pub mod stream;
pub mod text;
pub mod typed;
pub mod value;

pub use crate::{
    cache::PlanCache,
    custom::{CustomCodec, SizeContract},
    errors::{DataError, Error, LayoutError, LayoutErrorKind, Result, TranslationError},
    layout::{
        CollectionTag, CustomTag, ElementLayout, EnumType, FieldLayout, Shape, StringTag, Tag,
        TypeLayout,
    },
    primitive::{Endianness, PrimitiveKind},
    schema::Schema,
    text::Encoding,
    typed::{BinaryLayout, Deserializer, Serializer, from_bytes, get_deserializer, get_serializer, to_bytes},
    value::{Decimal, Fields, FromValue, IntoValue, Value, record, take_field},
};
