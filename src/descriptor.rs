//! Static analysis of a [TypeLayout] into an immutable descriptor tree.
//!
//! [TypeDescriptor::analyze] resolves the kind of every field, validates
//! annotation combinations and computes the size facts of the type. Length
//! keys are checked for uniqueness here and bound to their consumers later,
//! when the descriptor tree is compiled.

use std::{collections::HashSet, sync::Arc};

use crate::{
    bits::RunTracker,
    errors::{LayoutError, LayoutErrorKind, LayoutFault},
    layout::{
        CollectionTag, CustomTag, ElementLayout, EnumType, FieldLayout, Shape, StringTag, Tag,
        TypeLayout,
    },
    primitive::{Endianness, PrimitiveKind},
    text::Encoding,
    value::{Fields, Value},
};

/// How one type or field context is encoded.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub kind: DescriptorKind,
    /// Effective byte order after inheritance.
    pub endianness: Endianness,
    /// True if the encoded size does not depend on the instance.
    pub has_fixed_size: bool,
    /// Statically known minimum number of bytes. Bitfields report 0 here;
    /// their containers are accounted by the enclosing composite.
    pub min_size: usize,
}

#[derive(Debug, Clone)]
pub enum DescriptorKind {
    Primitive(PrimitiveKind),
    /// A boolean encoded as the integer `repr`.
    Boolean {
        repr: PrimitiveKind,
    },
    /// An enum encoded as the integer `repr`.
    Enum {
        repr: PrimitiveKind,
        ty: Arc<EnumType>,
    },
    Bitfield(BitfieldDescriptor),
    String(StringDescriptor),
    Collection {
        element: Box<TypeDescriptor>,
        size: SizeSpec,
    },
    Composite(CompositeDescriptor),
    Custom(CustomTag),
}

/// Value a bitfield carries.
#[derive(Debug, Clone)]
pub enum BitValue {
    Integer,
    Boolean,
    Enum(Arc<EnumType>),
}

#[derive(Debug, Clone)]
pub struct BitfieldDescriptor {
    pub value: BitValue,
    /// Equivalent integer type.
    pub repr: PrimitiveKind,
    /// Bits contributed to the container. 0 flushes the container.
    pub width: u32,
    /// Byte width of the container shared by the field's run.
    pub container: usize,
}

#[derive(Debug, Clone)]
pub struct StringDescriptor {
    pub encoding: Encoding,
    pub size: StringSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringSize {
    NullTerminated,
    Sized(SizeSpec),
}

/// Size strategy of a collection (in elements) or string (in bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeSpec {
    Fixed(usize),
    Keyed(String),
    /// Logical length from a key inside a fixed slot.
    Padded { key: String, fixed: usize },
}

impl SizeSpec {
    fn new(fixed: Option<usize>, key: Option<&String>) -> Result<Self, LayoutErrorKind> {
        match (fixed, key) {
            (Some(0), _) => Err(LayoutErrorKind::ZeroFixedLength),
            (Some(fixed), Some(key)) => Ok(SizeSpec::Padded {
                key: key.clone(),
                fixed,
            }),
            (Some(fixed), None) => Ok(SizeSpec::Fixed(fixed)),
            (None, Some(key)) => Ok(SizeSpec::Keyed(key.clone())),
            (None, None) => Err(LayoutErrorKind::MissingSizePolicy),
        }
    }

    pub fn length_key(&self) -> Option<&str> {
        match self {
            SizeSpec::Keyed(key) | SizeSpec::Padded { key, .. } => Some(key),
            SizeSpec::Fixed(_) => None,
        }
    }

    pub fn fixed_length(&self) -> Option<usize> {
        match self {
            SizeSpec::Fixed(fixed) | SizeSpec::Padded { fixed, .. } => Some(*fixed),
            SizeSpec::Keyed(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompositeDescriptor {
    pub name: String,
    /// Ordered fields, sorted by `order`.
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub order: u32,
    pub descriptor: TypeDescriptor,
    pub serialize: bool,
    /// Length key this field carries.
    pub length_of: Option<String>,
    pub pad_after: bool,
}

impl TypeDescriptor {
    /// Analyzes a root composite type. The root byte order defaults to little endian.
    pub fn analyze(layout: &TypeLayout) -> Result<TypeDescriptor, LayoutError> {
        Analyzer::default().composite(layout, Endianness::default())
    }

    fn fixed(kind: DescriptorKind, endianness: Endianness, min_size: usize) -> Self {
        Self {
            kind,
            endianness,
            has_fixed_size: true,
            min_size,
        }
    }

    pub fn is_bitfield(&self) -> bool {
        matches!(self.kind, DescriptorKind::Bitfield(_))
    }

    pub fn length_key(&self) -> Option<&str> {
        match &self.kind {
            DescriptorKind::String(StringDescriptor {
                size: StringSize::Sized(size),
                ..
            })
            | DescriptorKind::Collection { size, .. } => size.length_key(),
            _ => None,
        }
    }

    pub fn fixed_length(&self) -> Option<usize> {
        match &self.kind {
            DescriptorKind::String(StringDescriptor {
                size: StringSize::Sized(size),
                ..
            })
            | DescriptorKind::Collection { size, .. } => size.fixed_length(),
            _ => None,
        }
    }

    pub fn bit_width(&self) -> Option<u32> {
        match &self.kind {
            DescriptorKind::Bitfield(bits) => Some(bits.width),
            _ => None,
        }
    }

    pub fn encoding(&self) -> Option<Encoding> {
        match &self.kind {
            DescriptorKind::String(string) => Some(string.encoding),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&TypeDescriptor> {
        match &self.kind {
            DescriptorKind::Collection { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        match &self.kind {
            DescriptorKind::Composite(composite) => &composite.fields,
            _ => &[],
        }
    }

    /// Default-constructed value, used for collection padding and for fields
    /// that are never put on the wire. `None` if the type has no default.
    pub fn default_value(&self) -> Option<Value> {
        let value = match &self.kind {
            DescriptorKind::Primitive(kind) => Value::zero(*kind),
            DescriptorKind::Boolean { .. } => Value::Bool(false),
            DescriptorKind::Enum { .. } => Value::Enum(0),
            DescriptorKind::Bitfield(bits) => match bits.value {
                BitValue::Integer => Value::zero(bits.repr),
                BitValue::Boolean => Value::Bool(false),
                BitValue::Enum(_) => Value::Enum(0),
            },
            DescriptorKind::String(_) => Value::Str(String::new()),
            DescriptorKind::Collection { .. } => Value::List(Vec::new()),
            DescriptorKind::Composite(composite) => {
                let mut fields = Fields::new();
                for field in &composite.fields {
                    fields.insert(field.name.clone(), field.descriptor.default_value()?);
                }
                Value::Struct(fields)
            }
            DescriptorKind::Custom(tag) => return tag.codec.default_value(),
        };

        Some(value)
    }
}

#[derive(Default)]
struct Analyzer {
    /// Composite types being analyzed, outermost first.
    stack: Vec<String>,
}

impl Analyzer {
    fn composite(
        &mut self,
        layout: &TypeLayout,
        inherited: Endianness,
    ) -> Result<TypeDescriptor, LayoutError> {
        let type_name = layout.name.as_str();
        if self.stack.iter().any(|name| name == type_name) {
            let outer = self.stack.first().map_or(type_name, String::as_str);
            return Err(LayoutError::new(
                outer,
                None,
                LayoutErrorKind::RecursiveType(type_name.to_string()),
            ));
        }

        let endianness = layout.endianness.unwrap_or(inherited);
        let error = |field: &FieldLayout, kind| LayoutError::new(type_name, Some(&field.name), kind);

        let mut names = HashSet::new();
        for field in &layout.fields {
            if !names.insert(field.name.as_str()) {
                return Err(error(field, LayoutErrorKind::DuplicateName));
            }
        }

        let mut ordered: Vec<(u32, &FieldLayout)> = layout
            .fields
            .iter()
            .filter_map(|field| field.order.map(|order| (order, field)))
            .collect();
        ordered.sort_by_key(|(order, _)| *order);

        for pair in ordered.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(error(pair[1].1, LayoutErrorKind::DuplicateOrder(pair[1].0)));
            }
        }

        let mut carried = HashSet::new();
        for &(_, field) in &ordered {
            if let Some(key) = &field.length_of {
                if !carried.insert(key.as_str()) {
                    return Err(error(field, LayoutErrorKind::DuplicateLengthField(key.clone())));
                }
            }
        }

        let mut consumed = HashSet::new();

        self.stack.push(type_name.to_string());

        let mut fields = Vec::with_capacity(ordered.len());
        let mut runs = RunTracker::default();
        let mut has_fixed_size = true;
        let mut min_size = 0;

        for (order, field) in ordered {
            let field_endianness = field.endianness.unwrap_or(endianness);
            let mut descriptor = self
                .field(field, field_endianness)
                .map_err(|fault| fault.locate(type_name, &field.name))?;

            if let Some(key) = descriptor.length_key() {
                if !consumed.insert(key.to_string()) {
                    return Err(error(field, LayoutErrorKind::DuplicateLengthConsumer(key.into())));
                }
            }

            if let Some(key) = &field.length_of {
                let integral = match &descriptor.kind {
                    DescriptorKind::Primitive(kind) => kind.is_integral(),
                    DescriptorKind::Bitfield(bits) => matches!(bits.value, BitValue::Integer),
                    _ => false,
                };
                if !integral {
                    return Err(error(field, LayoutErrorKind::NonIntegralLengthField(key.clone())));
                }
            }

            if field.serialize {
                match &mut descriptor.kind {
                    DescriptorKind::Bitfield(bits) if bits.width == 0 => runs.close(),
                    DescriptorKind::Bitfield(bits) => {
                        bits.container = runs
                            .add(bits.repr.width(), bits.width, field_endianness)
                            .map_err(|kind| error(field, kind))?;
                    }
                    _ => runs.close(),
                }

                if field.pad_after {
                    runs.close();
                }

                has_fixed_size &= descriptor.has_fixed_size;
                min_size += descriptor.min_size;
            }

            fields.push(FieldDescriptor {
                name: field.name.clone(),
                order,
                descriptor,
                serialize: field.serialize,
                length_of: field.length_of.clone(),
                pad_after: field.pad_after,
            });
        }

        self.stack.pop();

        Ok(TypeDescriptor {
            kind: DescriptorKind::Composite(CompositeDescriptor {
                name: type_name.to_string(),
                fields,
            }),
            endianness,
            has_fixed_size,
            min_size: min_size + runs.bytes(),
        })
    }

    fn field(
        &mut self,
        field: &FieldLayout,
        endianness: Endianness,
    ) -> Result<TypeDescriptor, LayoutFault> {
        let descriptor = self.resolve(&field.shape, field.tag.as_ref(), endianness)?;

        let Some(width) = field.bit_width else {
            return Ok(descriptor);
        };

        let (value, repr) = match descriptor.kind {
            DescriptorKind::Primitive(kind) if kind.is_integral() => (BitValue::Integer, kind),
            DescriptorKind::Boolean { repr } => (BitValue::Boolean, repr),
            DescriptorKind::Enum { repr, ty } => (BitValue::Enum(ty), repr),
            _ => {
                let shape = match &field.tag {
                    Some(tag @ Tag::Custom(_)) => tag.label(),
                    _ => field.shape.label(),
                };
                return Err(LayoutErrorKind::InvalidBitfield { shape }.into());
            }
        };

        if width > repr.bits() {
            return Err(LayoutErrorKind::BitWidthTooWide {
                width,
                repr,
                bits: repr.bits(),
            }
            .into());
        }

        Ok(TypeDescriptor::fixed(
            DescriptorKind::Bitfield(BitfieldDescriptor {
                value,
                repr,
                width,
                container: repr.width(),
            }),
            endianness,
            0,
        ))
    }

    /// Resolves the kind of a field or element. Precedence: custom codec,
    /// list/string, boolean, enum, composite, primitive.
    fn resolve(
        &mut self,
        shape: &Shape,
        tag: Option<&Tag>,
        endianness: Endianness,
    ) -> Result<TypeDescriptor, LayoutFault> {
        let mismatch = |tag: &Tag| {
            LayoutFault::Field(LayoutErrorKind::AnnotationMismatch {
                tag: tag.label(),
                shape: shape.label(),
            })
        };

        if let Some(Tag::Custom(custom)) = tag {
            let contract = custom.codec.size();
            return Ok(TypeDescriptor {
                kind: DescriptorKind::Custom(custom.clone()),
                endianness,
                has_fixed_size: contract.is_fixed(),
                min_size: contract.min_size(),
            });
        }

        match shape {
            Shape::List(element) => match tag {
                Some(Tag::Collection(collection)) => {
                    self.collection(element, collection, endianness)
                }
                Some(other) => Err(mismatch(other)),
                None => Err(LayoutErrorKind::MissingAnnotation {
                    shape: "list",
                    expected: "collection",
                }
                .into()),
            },
            Shape::String => match tag {
                Some(Tag::String(string)) => string_descriptor(string, endianness),
                Some(other) => Err(mismatch(other)),
                None => Err(LayoutErrorKind::MissingAnnotation {
                    shape: "string",
                    expected: "string",
                }
                .into()),
            },
            Shape::Scalar(PrimitiveKind::Bool) => {
                let equivalent = match tag {
                    None | Some(Tag::Primitive) => None,
                    Some(Tag::Boolean { equivalent }) => *equivalent,
                    Some(other) => return Err(mismatch(other)),
                };

                let repr = integral(equivalent.unwrap_or(PrimitiveKind::I32))?;
                Ok(TypeDescriptor::fixed(
                    DescriptorKind::Boolean { repr },
                    endianness,
                    repr.width(),
                ))
            }
            Shape::Enum(ty) => {
                let equivalent = match tag {
                    None | Some(Tag::Primitive) => None,
                    Some(Tag::Enum { equivalent }) => *equivalent,
                    Some(other) => return Err(mismatch(other)),
                };

                let repr = integral(equivalent.unwrap_or(ty.underlying))?;
                if let Some(member) = ty.members.iter().find(|m| !repr.fits(m.value)) {
                    return Err(LayoutErrorKind::EnumOutOfRange {
                        member: member.name.clone(),
                        value: member.value,
                        repr,
                    }
                    .into());
                }

                Ok(TypeDescriptor::fixed(
                    DescriptorKind::Enum {
                        repr,
                        ty: ty.clone(),
                    },
                    endianness,
                    repr.width(),
                ))
            }
            Shape::Struct(layout) => match tag {
                None | Some(Tag::Composite) => {
                    Ok(self.composite(layout, endianness)?)
                }
                Some(other) => Err(mismatch(other)),
            },
            Shape::Scalar(kind) => match tag {
                None | Some(Tag::Primitive) => Ok(TypeDescriptor::fixed(
                    DescriptorKind::Primitive(*kind),
                    endianness,
                    kind.width(),
                )),
                Some(other) => Err(mismatch(other)),
            },
        }
    }

    fn collection(
        &mut self,
        element: &ElementLayout,
        tag: &CollectionTag,
        endianness: Endianness,
    ) -> Result<TypeDescriptor, LayoutFault> {
        let size = SizeSpec::new(tag.fixed_length, tag.length_key.as_ref())?;
        let element = self.resolve(&element.shape, element.tag.as_ref(), endianness)?;

        if matches!(size, SizeSpec::Keyed(_)) && element.has_fixed_size && element.min_size == 0 {
            return Err(LayoutErrorKind::ZeroSizedElement.into());
        }

        let (has_fixed_size, min_size) = match size {
            SizeSpec::Fixed(count) => (element.has_fixed_size, count * element.min_size),
            SizeSpec::Keyed(_) | SizeSpec::Padded { .. } => (false, 0),
        };

        Ok(TypeDescriptor {
            kind: DescriptorKind::Collection {
                element: Box::new(element),
                size,
            },
            endianness,
            has_fixed_size,
            min_size,
        })
    }
}

fn string_descriptor(tag: &StringTag, endianness: Endianness) -> Result<TypeDescriptor, LayoutFault> {
    let size = if tag.null_terminated {
        if tag.fixed_length.is_some() || tag.length_key.is_some() {
            return Err(LayoutErrorKind::ConflictingSizePolicy.into());
        }
        if !tag.encoding.is_null_terminable() {
            return Err(LayoutErrorKind::NullTerminationUnsupported(tag.encoding).into());
        }
        StringSize::NullTerminated
    } else {
        StringSize::Sized(SizeSpec::new(tag.fixed_length, tag.length_key.as_ref())?)
    };

    let (has_fixed_size, min_size) = match &size {
        StringSize::Sized(SizeSpec::Fixed(bytes)) => (true, *bytes),
        _ => (false, 0),
    };

    Ok(TypeDescriptor {
        kind: DescriptorKind::String(StringDescriptor {
            encoding: tag.encoding,
            size,
        }),
        endianness,
        has_fixed_size,
        min_size,
    })
}

fn integral(kind: PrimitiveKind) -> Result<PrimitiveKind, LayoutFault> {
    if kind.is_integral() {
        Ok(kind)
    } else {
        Err(LayoutErrorKind::NonIntegralEquivalent(kind).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(layout: TypeLayout) -> Result<TypeDescriptor, LayoutError> {
        TypeDescriptor::analyze(&layout)
    }

    fn kind_of(err: LayoutError) -> LayoutErrorKind {
        err.kind
    }

    #[test]
    fn test_fixed_size_facts() {
        let desc = analyze(
            TypeLayout::new("Header")
                .field(FieldLayout::primitive("id", 0, PrimitiveKind::U16))
                .field(FieldLayout::boolean("active", 1))
                .field(FieldLayout::string("tag", 2, StringTag::fixed(Encoding::Ascii, 4)))
                .field(FieldLayout::list(
                    "samples",
                    3,
                    ElementLayout::scalar(PrimitiveKind::I32),
                    CollectionTag::fixed(5),
                )),
        )
        .unwrap();

        assert!(desc.has_fixed_size);
        assert_eq!(desc.min_size, 2 + 4 + 4 + 20);
        assert_eq!(desc.fields().len(), 4);
        assert_eq!(desc.fields()[3].descriptor.fixed_length(), Some(5));
        assert_eq!(desc.fields()[2].descriptor.encoding(), Some(Encoding::Ascii));
    }

    #[test]
    fn test_length_key_clears_fixed_size() {
        let inner = Arc::new(
            TypeLayout::new("Inner")
                .field(FieldLayout::primitive("len", 0, PrimitiveKind::U8).length_of("name"))
                .field(FieldLayout::string("name", 1, StringTag::keyed(Encoding::Utf8, "name"))),
        );
        let desc = analyze(
            TypeLayout::new("Outer")
                .field(FieldLayout::primitive("id", 0, PrimitiveKind::U32))
                .field(FieldLayout::composite("inner", 1, inner)),
        )
        .unwrap();

        assert!(!desc.has_fixed_size);
        assert_eq!(desc.min_size, 5);
        let inner = &desc.fields()[1].descriptor;
        assert_eq!(inner.fields()[1].descriptor.length_key(), Some("name"));
    }

    #[test]
    fn test_padded_policies_are_variable() {
        let desc = analyze(
            TypeLayout::new("Label")
                .field(FieldLayout::primitive("len", 0, PrimitiveKind::U8).length_of("text"))
                .field(FieldLayout::string(
                    "text",
                    1,
                    StringTag::padded(Encoding::Utf16Le, "text", 10),
                ))
                .field(FieldLayout::primitive("count", 2, PrimitiveKind::U8).length_of("slots"))
                .field(FieldLayout::list(
                    "slots",
                    3,
                    ElementLayout::scalar(PrimitiveKind::U32),
                    CollectionTag::padded("slots", 4),
                )),
        )
        .unwrap();

        assert!(!desc.has_fixed_size);
        assert_eq!(desc.min_size, 2);
        assert!(!desc.fields()[1].descriptor.has_fixed_size);
        assert_eq!(desc.fields()[1].descriptor.min_size, 0);
        assert!(!desc.fields()[3].descriptor.has_fixed_size);
        assert_eq!(desc.fields()[3].descriptor.min_size, 0);
    }

    #[test]
    fn test_keyed_collection_of_empty_elements() {
        let hollow = Arc::new(
            TypeLayout::new("Hollow").field(FieldLayout::primitive("note", 0, PrimitiveKind::U8).skip_serialize()),
        );
        let keyed = |element: ElementLayout, tag: CollectionTag| {
            analyze(
                TypeLayout::new("Bag")
                    .field(FieldLayout::primitive("count", 0, PrimitiveKind::U32).length_of("items"))
                    .field(FieldLayout::list("items", 1, element, tag)),
            )
        };

        let err = keyed(ElementLayout::composite(hollow.clone()), CollectionTag::keyed("items")).unwrap_err();
        assert_eq!(err.type_name, "Bag");
        assert_eq!(err.field.as_deref(), Some("items"));
        assert_eq!(err.kind, LayoutErrorKind::ZeroSizedElement);

        let err = keyed(
            ElementLayout::composite(Arc::new(TypeLayout::new("Empty"))),
            CollectionTag::keyed("items"),
        )
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::ZeroSizedElement);

        assert!(keyed(ElementLayout::composite(hollow), CollectionTag::padded("items", 3)).is_ok());
    }

    #[test]
    fn test_fields_sorted_and_unordered_skipped() {
        let desc = analyze(
            TypeLayout::new("Record")
                .field(FieldLayout::primitive("b", 7, PrimitiveKind::U8))
                .field(FieldLayout::unordered("cache", Shape::Scalar(PrimitiveKind::U64)))
                .field(FieldLayout::primitive("a", 2, PrimitiveKind::U8)),
        )
        .unwrap();

        let names: Vec<_> = desc.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_bitfield_runs_share_containers() {
        let desc = analyze(
            TypeLayout::new("Flags")
                .field(FieldLayout::primitive("mode", 0, PrimitiveKind::U8).bits(2))
                .field(
                    FieldLayout::boolean("on", 1)
                        .tag(Tag::Boolean {
                            equivalent: Some(PrimitiveKind::U8),
                        })
                        .bits(1),
                )
                .field(FieldLayout::primitive("rest", 2, PrimitiveKind::U8).bits(6))
                .field(FieldLayout::primitive("tail", 3, PrimitiveKind::U16)),
        )
        .unwrap();

        // 2 + 1 bits share a byte, the 6-bit field opens a second one.
        assert_eq!(desc.min_size, 1 + 1 + 2);
        assert_eq!(desc.fields()[0].descriptor.bit_width(), Some(2));
    }

    #[test]
    fn test_run_container_width_from_first_field() {
        let desc = analyze(
            TypeLayout::new("Mixed")
                .field(FieldLayout::primitive("a", 0, PrimitiveKind::U16).bits(4))
                .field(FieldLayout::primitive("b", 1, PrimitiveKind::U8).bits(4)),
        )
        .unwrap();

        assert_eq!(desc.min_size, 2);
        match &desc.fields()[1].descriptor.kind {
            DescriptorKind::Bitfield(bits) => assert_eq!(bits.container, 2),
            other => panic!("unexpected {other:?}"),
        }

        let err = analyze(
            TypeLayout::new("Mixed")
                .field(FieldLayout::primitive("a", 0, PrimitiveKind::U8).bits(4))
                .field(FieldLayout::primitive("b", 1, PrimitiveKind::U16).bits(12)),
        )
        .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("b"));
        assert_eq!(
            err.kind,
            LayoutErrorKind::BitfieldExceedsContainer {
                width: 12,
                container: 1
            }
        );
    }

    #[test]
    fn test_mixed_endianness_in_run() {
        let err = analyze(
            TypeLayout::new("Mixed")
                .field(FieldLayout::primitive("a", 0, PrimitiveKind::U16).bits(4))
                .field(
                    FieldLayout::primitive("b", 1, PrimitiveKind::U16)
                        .bits(4)
                        .endianness(Endianness::Big),
                ),
        )
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::MixedContainerEndianness);
    }

    #[test]
    fn test_pad_after_and_sentinel_close_runs() {
        let desc = analyze(
            TypeLayout::new("Padded")
                .field(FieldLayout::primitive("a", 0, PrimitiveKind::U8).bits(1).pad_after())
                .field(FieldLayout::primitive("b", 1, PrimitiveKind::U8).bits(1))
                .field(FieldLayout::primitive("gap", 2, PrimitiveKind::U8).bits(0))
                .field(FieldLayout::primitive("c", 3, PrimitiveKind::U8).bits(1)),
        )
        .unwrap();
        assert_eq!(desc.min_size, 3);
    }

    #[test]
    fn test_untagged_collection_names_field() {
        let err = analyze(TypeLayout::new("Packet").field(FieldLayout::new(
            "payload",
            0,
            Shape::List(Box::new(ElementLayout::scalar(PrimitiveKind::U8))),
        )))
        .unwrap_err();

        assert_eq!(err.type_name, "Packet");
        assert_eq!(err.field.as_deref(), Some("payload"));
        assert_eq!(
            err.kind,
            LayoutErrorKind::MissingAnnotation {
                shape: "list",
                expected: "collection"
            }
        );
    }

    #[test]
    fn test_annotation_mismatch() {
        let err = analyze(
            TypeLayout::new("Bad").field(
                FieldLayout::primitive("n", 0, PrimitiveKind::U32)
                    .tag(Tag::String(StringTag::fixed(Encoding::Utf8, 4))),
            ),
        )
        .unwrap_err();
        assert_eq!(
            kind_of(err),
            LayoutErrorKind::AnnotationMismatch {
                tag: "string",
                shape: "integer"
            }
        );

        let err = analyze(
            TypeLayout::new("Bad").field(
                FieldLayout::new("s", 0, Shape::String).tag(Tag::Collection(CollectionTag::fixed(2))),
            ),
        )
        .unwrap_err();
        assert!(matches!(err.kind, LayoutErrorKind::AnnotationMismatch { .. }));
    }

    #[test]
    fn test_size_policy_errors() {
        let err = analyze(TypeLayout::new("S").field(FieldLayout::string(
            "s",
            0,
            StringTag::new(Encoding::Utf8),
        )))
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::MissingSizePolicy);

        let mut tag = StringTag::null_terminated(Encoding::Utf8);
        tag.fixed_length = Some(4);
        let err = analyze(TypeLayout::new("S").field(FieldLayout::string("s", 0, tag))).unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::ConflictingSizePolicy);

        let err = analyze(TypeLayout::new("S").field(FieldLayout::string(
            "s",
            0,
            StringTag::null_terminated(Encoding::Utf16Le),
        )))
        .unwrap_err();
        assert_eq!(
            err.kind,
            LayoutErrorKind::NullTerminationUnsupported(Encoding::Utf16Le)
        );

        let err = analyze(TypeLayout::new("S").field(FieldLayout::list(
            "l",
            0,
            ElementLayout::scalar(PrimitiveKind::U8),
            CollectionTag::fixed(0),
        )))
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::ZeroFixedLength);
    }

    #[test]
    fn test_enum_members_checked_against_equivalent() {
        let ty = Arc::new(
            EnumType::new("Level", PrimitiveKind::I32)
                .member("Low", 0)
                .member("High", 300),
        );

        assert!(analyze(TypeLayout::new("E").field(FieldLayout::enumeration("level", 0, ty.clone()))).is_ok());

        let err = analyze(TypeLayout::new("E").field(
            FieldLayout::enumeration("level", 0, ty).tag(Tag::Enum {
                equivalent: Some(PrimitiveKind::U8),
            }),
        ))
        .unwrap_err();
        assert_eq!(
            err.kind,
            LayoutErrorKind::EnumOutOfRange {
                member: "High".into(),
                value: 300,
                repr: PrimitiveKind::U8
            }
        );
    }

    #[test]
    fn test_boolean_equivalent_must_be_integral() {
        let err = analyze(TypeLayout::new("B").field(FieldLayout::boolean("b", 0).tag(
            Tag::Boolean {
                equivalent: Some(PrimitiveKind::F32),
            },
        )))
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::NonIntegralEquivalent(PrimitiveKind::F32));
    }

    #[test]
    fn test_bitfield_restrictions() {
        let err = analyze(
            TypeLayout::new("B").field(FieldLayout::primitive("f", 0, PrimitiveKind::F32).bits(3)),
        )
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::InvalidBitfield { shape: "float" });

        let err = analyze(
            TypeLayout::new("B").field(FieldLayout::primitive("n", 0, PrimitiveKind::U8).bits(9)),
        )
        .unwrap_err();
        assert_eq!(
            err.kind,
            LayoutErrorKind::BitWidthTooWide {
                width: 9,
                repr: PrimitiveKind::U8,
                bits: 8
            }
        );
    }

    #[test]
    fn test_duplicates() {
        let err = analyze(
            TypeLayout::new("D")
                .field(FieldLayout::primitive("a", 0, PrimitiveKind::U8))
                .field(FieldLayout::primitive("a", 1, PrimitiveKind::U8)),
        )
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::DuplicateName);

        let err = analyze(
            TypeLayout::new("D")
                .field(FieldLayout::primitive("a", 1, PrimitiveKind::U8))
                .field(FieldLayout::primitive("b", 1, PrimitiveKind::U8)),
        )
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::DuplicateOrder(1));

        let err = analyze(
            TypeLayout::new("D")
                .field(FieldLayout::primitive("n", 0, PrimitiveKind::U8).length_of("k"))
                .field(FieldLayout::primitive("m", 1, PrimitiveKind::U8).length_of("k")),
        )
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::DuplicateLengthField("k".into()));

        let err = analyze(
            TypeLayout::new("D")
                .field(FieldLayout::primitive("n", 0, PrimitiveKind::U8).length_of("k"))
                .field(FieldLayout::string("s", 1, StringTag::keyed(Encoding::Utf8, "k")))
                .field(FieldLayout::string("t", 2, StringTag::keyed(Encoding::Utf8, "k"))),
        )
        .unwrap_err();
        assert_eq!(err.field.as_deref(), Some("t"));
        assert_eq!(err.kind, LayoutErrorKind::DuplicateLengthConsumer("k".into()));
    }

    #[test]
    fn test_length_field_must_be_integral() {
        let err = analyze(
            TypeLayout::new("L")
                .field(FieldLayout::boolean("n", 0).length_of("s"))
                .field(FieldLayout::string("s", 1, StringTag::keyed(Encoding::Utf8, "s"))),
        )
        .unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::NonIntegralLengthField("s".into()));
    }

    #[test]
    fn test_nested_error_keeps_inner_location() {
        let inner = Arc::new(TypeLayout::new("Inner").field(FieldLayout::new("text", 0, Shape::String)));
        let err = analyze(TypeLayout::new("Outer").field(FieldLayout::composite("inner", 0, inner)))
            .unwrap_err();

        assert_eq!(err.type_name, "Inner");
        assert_eq!(err.field.as_deref(), Some("text"));
    }

    #[test]
    fn test_recursive_type() {
        let leaf = Arc::new(TypeLayout::new("Node").field(FieldLayout::primitive("v", 0, PrimitiveKind::U8)));
        let node = TypeLayout::new("Node").field(FieldLayout::composite("next", 0, leaf));

        let err = analyze(node).unwrap_err();
        assert_eq!(err.kind, LayoutErrorKind::RecursiveType("Node".into()));
    }

    #[test]
    fn test_endianness_inheritance() {
        let inner = Arc::new(TypeLayout::new("Inner").field(FieldLayout::primitive("v", 0, PrimitiveKind::U32)));
        let desc = analyze(
            TypeLayout::new("Outer")
                .endianness(Endianness::Big)
                .field(FieldLayout::primitive("a", 0, PrimitiveKind::U32))
                .field(FieldLayout::primitive("b", 1, PrimitiveKind::U32).endianness(Endianness::Little))
                .field(FieldLayout::composite("inner", 2, inner)),
        )
        .unwrap();

        assert_eq!(desc.endianness, Endianness::Big);
        assert_eq!(desc.fields()[0].descriptor.endianness, Endianness::Big);
        assert_eq!(desc.fields()[1].descriptor.endianness, Endianness::Little);
        assert_eq!(desc.fields()[2].descriptor.fields()[0].descriptor.endianness, Endianness::Big);
    }

    #[test]
    fn test_default_values() {
        let desc = analyze(
            TypeLayout::new("D")
                .field(FieldLayout::primitive("n", 0, PrimitiveKind::I16))
                .field(FieldLayout::boolean("b", 1).skip_serialize())
                .field(FieldLayout::string("s", 2, StringTag::fixed(Encoding::Ascii, 2))),
        )
        .unwrap();

        // Non-serialized fields are analyzed but do not count towards the size.
        assert_eq!(desc.min_size, 4);
        assert_eq!(
            desc.default_value(),
            Some(crate::value::record([
                ("n", Value::I16(0)),
                ("b", Value::Bool(false)),
                ("s", Value::Str(String::new())),
            ]))
        );
    }
}
