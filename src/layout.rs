//! Declarative layout configuration.
//!
//! A [TypeLayout] is the plain data a concrete composite type supplies to
//! describe its wire format. Each [FieldLayout] states the field's declared
//! [Shape] (what the field holds) separately from its annotation [Tag] (how
//! the layout wants it encoded), so the descriptor model can reject
//! annotations attached to fields they cannot describe.
//!
//! ```
//! use std::sync::Arc;
//! use bitlayout::layout::{CollectionTag, ElementLayout, FieldLayout, TypeLayout};
//! use bitlayout::primitive::{Endianness, PrimitiveKind};
//!
//! let packet = TypeLayout::new("Packet")
//!     .endianness(Endianness::Big)
//!     .field(FieldLayout::primitive("count", 0, PrimitiveKind::U8).length_of("items"))
//!     .field(FieldLayout::list(
//!         "items",
//!         1,
//!         ElementLayout::scalar(PrimitiveKind::U16),
//!         CollectionTag::keyed("items"),
//!     ));
//! assert_eq!(packet.fields.len(), 2);
//! ```

use std::sync::Arc;

use crate::{custom::CustomCodec, primitive::Endianness, primitive::PrimitiveKind, text::Encoding};

/// Layout of one concrete composite type.
#[derive(Debug, Clone)]
pub struct TypeLayout {
    /// Type name. Identifies the type in diagnostics, in the plan cache and
    /// when a custom codec looks for its context object.
    pub name: String,
    /// Default byte order of the fields. Inherited from the enclosing field when unset.
    pub endianness: Option<Endianness>,
    pub fields: Vec<FieldLayout>,
}

impl TypeLayout {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endianness: None,
            fields: Vec::new(),
        }
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    pub fn field(mut self, field: FieldLayout) -> Self {
        self.fields.push(field);
        self
    }
}

/// Declared layout of one field.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub name: String,
    /// Serialization order. Fields without an order are not part of the layout.
    pub order: Option<u32>,
    pub shape: Shape,
    pub tag: Option<Tag>,
    /// Overrides the enclosing type's byte order.
    pub endianness: Option<Endianness>,
    /// Packs the field into a bit container. `Some(0)` flushes the container.
    pub bit_width: Option<u32>,
    /// Flushes the bit container right after this field.
    pub pad_after: bool,
    /// Marks the field as the length carrier for this length key.
    pub length_of: Option<String>,
    /// Fields with `serialize == false` are analyzed but never put on the wire.
    pub serialize: bool,
}

impl FieldLayout {
    pub fn new(name: impl Into<String>, order: u32, shape: Shape) -> Self {
        Self {
            name: name.into(),
            order: Some(order),
            shape,
            tag: None,
            endianness: None,
            bit_width: None,
            pad_after: false,
            length_of: None,
            serialize: true,
        }
    }

    /// A declared field that carries no layout annotations and is skipped.
    pub fn unordered(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            order: None,
            ..Self::new(name, 0, shape)
        }
    }

    pub fn primitive(name: impl Into<String>, order: u32, kind: PrimitiveKind) -> Self {
        Self::new(name, order, Shape::Scalar(kind))
    }

    pub fn boolean(name: impl Into<String>, order: u32) -> Self {
        Self::new(name, order, Shape::Scalar(PrimitiveKind::Bool))
    }

    pub fn enumeration(name: impl Into<String>, order: u32, ty: Arc<EnumType>) -> Self {
        Self::new(name, order, Shape::Enum(ty))
    }

    pub fn string(name: impl Into<String>, order: u32, tag: StringTag) -> Self {
        Self::new(name, order, Shape::String).tag(Tag::String(tag))
    }

    pub fn list(
        name: impl Into<String>,
        order: u32,
        element: ElementLayout,
        tag: CollectionTag,
    ) -> Self {
        Self::new(name, order, Shape::List(Box::new(element))).tag(Tag::Collection(tag))
    }

    pub fn composite(name: impl Into<String>, order: u32, ty: Arc<TypeLayout>) -> Self {
        Self::new(name, order, Shape::Struct(ty))
    }

    pub fn custom(name: impl Into<String>, order: u32, shape: Shape, tag: CustomTag) -> Self {
        Self::new(name, order, shape).tag(Tag::Custom(tag))
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    pub fn bits(mut self, width: u32) -> Self {
        self.bit_width = Some(width);
        self
    }

    pub fn pad_after(mut self) -> Self {
        self.pad_after = true;
        self
    }

    pub fn length_of(mut self, key: impl Into<String>) -> Self {
        self.length_of = Some(key.into());
        self
    }

    pub fn skip_serialize(mut self) -> Self {
        self.serialize = false;
        self
    }
}

/// Layout of a list element.
#[derive(Debug, Clone)]
pub struct ElementLayout {
    pub shape: Shape,
    pub tag: Option<Tag>,
}

impl ElementLayout {
    pub fn new(shape: Shape) -> Self {
        Self { shape, tag: None }
    }

    pub fn scalar(kind: PrimitiveKind) -> Self {
        Self::new(Shape::Scalar(kind))
    }

    pub fn string(tag: StringTag) -> Self {
        Self::new(Shape::String).tag(Tag::String(tag))
    }

    pub fn composite(ty: Arc<TypeLayout>) -> Self {
        Self::new(Shape::Struct(ty))
    }

    pub fn list(element: ElementLayout, tag: CollectionTag) -> Self {
        Self::new(Shape::List(Box::new(element))).tag(Tag::Collection(tag))
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }
}

/// What a field is declared to hold.
#[derive(Debug, Clone)]
pub enum Shape {
    /// A scalar. `PrimitiveKind::Bool` declares a boolean.
    Scalar(PrimitiveKind),
    Enum(Arc<EnumType>),
    String,
    List(Box<ElementLayout>),
    Struct(Arc<TypeLayout>),
}

impl Shape {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Shape::Scalar(PrimitiveKind::Bool) => "boolean",
            Shape::Scalar(PrimitiveKind::F32 | PrimitiveKind::F64) => "float",
            Shape::Scalar(PrimitiveKind::Decimal) => "decimal",
            Shape::Scalar(PrimitiveKind::Char) => "char",
            Shape::Scalar(_) => "integer",
            Shape::Enum(_) => "enum",
            Shape::String => "string",
            Shape::List(_) => "list",
            Shape::Struct(_) => "struct",
        }
    }
}

/// Layout annotation attached to a field.
#[derive(Debug, Clone)]
pub enum Tag {
    Primitive,
    /// Encode a boolean as an integer (default `I32`).
    Boolean { equivalent: Option<PrimitiveKind> },
    /// Encode an enum as an integer (default: the enum's underlying type).
    Enum { equivalent: Option<PrimitiveKind> },
    String(StringTag),
    Collection(CollectionTag),
    Composite,
    Custom(CustomTag),
}

impl Tag {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Tag::Primitive => "primitive",
            Tag::Boolean { .. } => "boolean",
            Tag::Enum { .. } => "enum",
            Tag::String(_) => "string",
            Tag::Collection(_) => "collection",
            Tag::Composite => "composite",
            Tag::Custom(_) => "custom codec",
        }
    }
}

/// String annotation: encoding plus size policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTag {
    pub encoding: Encoding,
    pub null_terminated: bool,
    /// Size of the slot in bytes.
    pub fixed_length: Option<usize>,
    pub length_key: Option<String>,
}

impl StringTag {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            null_terminated: false,
            fixed_length: None,
            length_key: None,
        }
    }

    pub fn null_terminated(encoding: Encoding) -> Self {
        Self {
            null_terminated: true,
            ..Self::new(encoding)
        }
    }

    pub fn fixed(encoding: Encoding, bytes: usize) -> Self {
        Self {
            fixed_length: Some(bytes),
            ..Self::new(encoding)
        }
    }

    pub fn keyed(encoding: Encoding, key: impl Into<String>) -> Self {
        Self {
            length_key: Some(key.into()),
            ..Self::new(encoding)
        }
    }

    /// Variable-length text inside a zero-padded slot of `bytes` bytes.
    pub fn padded(encoding: Encoding, key: impl Into<String>, bytes: usize) -> Self {
        Self {
            fixed_length: Some(bytes),
            ..Self::keyed(encoding, key)
        }
    }
}

/// Collection annotation: size policy in elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionTag {
    pub fixed_length: Option<usize>,
    pub length_key: Option<String>,
}

impl CollectionTag {
    pub fn fixed(count: usize) -> Self {
        Self {
            fixed_length: Some(count),
            length_key: None,
        }
    }

    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            fixed_length: None,
            length_key: Some(key.into()),
        }
    }

    /// Variable element count inside `count` slots padded with defaults.
    pub fn padded(key: impl Into<String>, count: usize) -> Self {
        Self {
            fixed_length: Some(count),
            length_key: Some(key.into()),
        }
    }
}

/// Custom codec annotation.
#[derive(Debug, Clone)]
pub struct CustomTag {
    pub codec: Arc<dyn CustomCodec>,
    /// Name of the enclosing composite type handed to the codec as context.
    pub context_type: Option<String>,
}

impl CustomTag {
    pub fn new(codec: Arc<dyn CustomCodec>) -> Self {
        Self {
            codec,
            context_type: None,
        }
    }

    pub fn with_context(mut self, type_name: impl Into<String>) -> Self {
        self.context_type = Some(type_name.into());
        self
    }
}

/// A declared enum: its natural underlying type and its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub underlying: PrimitiveKind,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i128,
}

impl EnumType {
    pub fn new(name: impl Into<String>, underlying: PrimitiveKind) -> Self {
        Self {
            name: name.into(),
            underlying,
            members: Vec::new(),
        }
    }

    pub fn member(mut self, name: impl Into<String>, value: i128) -> Self {
        self.members.push(EnumMember {
            name: name.into(),
            value,
        });
        self
    }

    pub fn value_of(&self, name: &str) -> Option<i128> {
        self.members.iter().find(|m| m.name == name).map(|m| m.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_builders() {
        let field = FieldLayout::primitive("flags", 3, PrimitiveKind::U8)
            .bits(3)
            .pad_after()
            .endianness(Endianness::Big);

        assert_eq!(field.order, Some(3));
        assert_eq!(field.bit_width, Some(3));
        assert!(field.pad_after);
        assert!(field.serialize);
        assert!(field.tag.is_none());

        let skipped = FieldLayout::unordered("cache", Shape::Scalar(PrimitiveKind::U32));
        assert_eq!(skipped.order, None);
    }

    #[test]
    fn test_string_tags() {
        let tag = StringTag::padded(Encoding::Utf16Le, "len", 10);
        assert_eq!(tag.fixed_length, Some(10));
        assert_eq!(tag.length_key.as_deref(), Some("len"));
        assert!(!tag.null_terminated);

        assert!(StringTag::null_terminated(Encoding::Utf8).null_terminated);
    }

    #[test]
    fn test_enum_type() {
        let color = EnumType::new("Color", PrimitiveKind::U8)
            .member("Red", 0)
            .member("Blue", 2);
        assert_eq!(color.value_of("Blue"), Some(2));
        assert_eq!(color.value_of("Green"), None);
    }
}
