//! Compiled operation tree.
//!
//! A [CompiledPlan] is built once from a [TypeDescriptor]: every field is
//! reduced to the operation the encoder and decoder run for it, byte swaps are
//! decided against the host and length keys are bound to their carriers.

use crate::{
    bits::{low_mask, sign_extend},
    descriptor::{
        BitValue, CompositeDescriptor, DescriptorKind, SizeSpec, StringSize, TypeDescriptor,
    },
    errors::{DataError, LayoutError, LayoutErrorKind, LayoutFault},
    layout::CustomTag,
    length_key::{LengthFeed, LengthKeyResolver, LengthSource, Measure},
    primitive::PrimitiveKind,
    text::Encoding,
    value::{Value, integer_from_raw, integer_to_raw, mismatch},
};

/// How a [Value] maps onto an integer representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// The value variant matches the representation.
    Native,
    /// `Value::Bool` as 1/0.
    Boolean,
    /// `Value::Enum` by its numeric value.
    Enum,
}

impl Flavor {
    /// Raw host-order bits of `value` in `repr`.
    pub fn encode(self, repr: PrimitiveKind, value: &Value) -> Result<u128, DataError> {
        match self {
            Flavor::Native => value.to_raw(repr),
            Flavor::Boolean => integer_to_raw(repr, bool_value(value)? as i128),
            Flavor::Enum => integer_to_raw(repr, enum_value(value)?),
        }
    }

    pub fn decode(self, repr: PrimitiveKind, raw: u128) -> Result<Value, DataError> {
        match self {
            Flavor::Native => Value::from_raw(repr, raw),
            Flavor::Boolean => Ok(Value::Bool(raw != 0)),
            Flavor::Enum => Ok(Value::Enum(integer_from_raw(repr, raw))),
        }
    }

    /// Low `width` bits of `value`. Signed representations take the two's
    /// complement and must fit the signed range of `width` bits.
    pub fn encode_bits(self, repr: PrimitiveKind, width: u32, value: &Value) -> Result<u64, DataError> {
        let number = match self {
            Flavor::Native => integer_from_raw(repr, value.to_raw(repr)?),
            Flavor::Boolean => bool_value(value)? as i128,
            Flavor::Enum => enum_value(value)?,
        };

        bits_of(number, self.signed(repr), width)
    }

    pub fn decode_bits(self, repr: PrimitiveKind, width: u32, bits: u64) -> Result<Value, DataError> {
        let number = if self.signed(repr) {
            sign_extend(bits, width) as i128
        } else {
            bits as i128
        };

        match self {
            Flavor::Native => Value::from_integer(repr, number)
                .ok_or(DataError::OutOfRange { value: number, repr }),
            Flavor::Boolean => Ok(Value::Bool(number != 0)),
            Flavor::Enum => Ok(Value::Enum(number)),
        }
    }

    /// Value decoded for a zero-width field.
    pub fn zero(self, repr: PrimitiveKind) -> Value {
        match self {
            Flavor::Native => Value::zero(repr),
            Flavor::Boolean => Value::Bool(false),
            Flavor::Enum => Value::Enum(0),
        }
    }

    fn signed(self, repr: PrimitiveKind) -> bool {
        self != Flavor::Boolean && repr.is_signed()
    }
}

impl From<&BitValue> for Flavor {
    fn from(value: &BitValue) -> Self {
        match value {
            BitValue::Integer => Flavor::Native,
            BitValue::Boolean => Flavor::Boolean,
            BitValue::Enum(_) => Flavor::Enum,
        }
    }
}

/// Range-checks `number` against `width` bits and returns its low bits.
pub(crate) fn bits_of(number: i128, signed: bool, width: u32) -> Result<u64, DataError> {
    let overflow = DataError::BitOverflow {
        value: number as u64,
        bits: width,
    };
    if width == 0 {
        return Err(overflow);
    }

    let (min, max) = if signed {
        (-(1i128 << (width - 1)), (1i128 << (width - 1)) - 1)
    } else {
        (0, (1i128 << width) - 1)
    };

    if number < min || number > max {
        return Err(overflow);
    }

    Ok(number as u64 & low_mask(width))
}

fn bool_value(value: &Value) -> Result<bool, DataError> {
    value.as_bool().ok_or_else(|| mismatch("bool", value))
}

fn enum_value(value: &Value) -> Result<i128, DataError> {
    match value {
        Value::Enum(number) => Ok(*number),
        other => Err(mismatch("enum", other)),
    }
}

/// Size strategy of a compiled collection (elements) or string (bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledSize {
    Fixed(usize),
    Keyed(LengthSource),
    Padded { source: LengthSource, fixed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledStringSize {
    NullTerminated,
    Sized(CompiledSize),
}

#[derive(Debug, Clone)]
pub enum CompiledKind {
    Scalar {
        repr: PrimitiveKind,
        swap: bool,
        flavor: Flavor,
    },
    Bits {
        repr: PrimitiveKind,
        /// 0 flushes the container.
        width: u32,
        container: usize,
        swap: bool,
        flavor: Flavor,
    },
    String {
        encoding: Encoding,
        size: CompiledStringSize,
    },
    Collection {
        element: Box<CompiledKind>,
        size: CompiledSize,
        /// Padding element, if the element type has a default.
        default: Option<Value>,
    },
    Composite(CompiledComposite),
    Custom(CustomTag),
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub kind: CompiledKind,
    /// Length key whose decoded value is recorded for consumers.
    pub length_of: Option<String>,
    /// Consumer measured to produce this field's value when encoding.
    pub length_feed: Option<LengthFeed>,
    pub pad_after: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledComposite {
    pub name: String,
    /// Serialized fields in order.
    pub fields: Vec<CompiledField>,
    /// Fields never put on the wire, with the default they decode to.
    pub skipped: Vec<(String, Value)>,
}

/// Reusable encode/decode program for one concrete type.
#[derive(Debug, Clone)]
pub struct CompiledPlan {
    pub root: CompiledComposite,
    pub has_fixed_size: bool,
    pub min_size: usize,
}

impl TryFrom<&TypeDescriptor> for CompiledPlan {
    type Error = LayoutError;

    fn try_from(descriptor: &TypeDescriptor) -> Result<Self, Self::Error> {
        let DescriptorKind::Composite(composite) = &descriptor.kind else {
            return Err(LayoutError::new(
                "",
                None,
                LayoutErrorKind::AnnotationMismatch {
                    tag: "composite",
                    shape: "non-composite",
                },
            ));
        };

        let root = Compiler::default().composite(composite)?;

        Ok(CompiledPlan {
            root,
            has_fixed_size: descriptor.has_fixed_size,
            min_size: descriptor.min_size,
        })
    }
}

#[derive(Default)]
struct Compiler<'d> {
    resolver: LengthKeyResolver<'d>,
}

impl<'d> Compiler<'d> {
    fn composite(&mut self, composite: &'d CompositeDescriptor) -> Result<CompiledComposite, LayoutError> {
        self.resolver.push_scope(composite);

        let mut fields = Vec::with_capacity(composite.fields.len());
        let mut skipped = Vec::new();

        for field in &composite.fields {
            if !field.serialize {
                if let Some(default) = field.descriptor.default_value() {
                    skipped.push((field.name.clone(), default));
                }
                continue;
            }

            self.resolver.enter_member(&field.name, field.order);
            let kind = self
                .kind(&field.descriptor)
                .map_err(|fault| fault.locate(&composite.name, &field.name))?;

            fields.push(CompiledField {
                name: field.name.clone(),
                kind,
                length_of: field.length_of.clone(),
                length_feed: None,
                pad_after: field.pad_after,
            });
        }

        for (name, feed) in self.resolver.pop_scope()? {
            if let Some(field) = fields.iter_mut().find(|field| field.name == name) {
                field.length_feed = Some(feed);
            }
        }

        Ok(CompiledComposite {
            name: composite.name.clone(),
            fields,
            skipped,
        })
    }

    fn kind(&mut self, descriptor: &'d TypeDescriptor) -> Result<CompiledKind, LayoutFault> {
        let endianness = descriptor.endianness;
        let scalar = |repr: PrimitiveKind, flavor| CompiledKind::Scalar {
            repr,
            swap: endianness.needs_swap(repr.width()),
            flavor,
        };

        let kind = match &descriptor.kind {
            DescriptorKind::Primitive(repr) => scalar(*repr, Flavor::Native),
            DescriptorKind::Boolean { repr } => scalar(*repr, Flavor::Boolean),
            DescriptorKind::Enum { repr, .. } => scalar(*repr, Flavor::Enum),
            DescriptorKind::Bitfield(bits) => CompiledKind::Bits {
                repr: bits.repr,
                width: bits.width,
                container: bits.container,
                swap: endianness.needs_swap(bits.container),
                flavor: Flavor::from(&bits.value),
            },
            DescriptorKind::String(string) => CompiledKind::String {
                encoding: string.encoding,
                size: match &string.size {
                    StringSize::NullTerminated => CompiledStringSize::NullTerminated,
                    StringSize::Sized(spec) => {
                        CompiledStringSize::Sized(self.size(spec, Measure::Bytes(string.encoding))?)
                    }
                },
            },
            DescriptorKind::Collection { element, size } => {
                let size = self.size(size, Measure::Elements)?;

                self.resolver.push_boundary();
                let compiled = self.kind(element);
                self.resolver.pop_boundary();

                CompiledKind::Collection {
                    element: Box::new(compiled?),
                    size,
                    default: element.default_value(),
                }
            }
            DescriptorKind::Composite(composite) => CompiledKind::Composite(self.composite(composite)?),
            DescriptorKind::Custom(tag) => CompiledKind::Custom(tag.clone()),
        };

        Ok(kind)
    }

    fn size(&mut self, spec: &SizeSpec, measure: Measure) -> Result<CompiledSize, LayoutErrorKind> {
        let size = match spec {
            SizeSpec::Fixed(fixed) => CompiledSize::Fixed(*fixed),
            SizeSpec::Keyed(key) => CompiledSize::Keyed(self.resolver.bind(key, measure)?),
            SizeSpec::Padded { key, fixed } => CompiledSize::Padded {
                source: self.resolver.bind(key, measure)?,
                fixed: *fixed,
            },
        };

        Ok(size)
    }
}
