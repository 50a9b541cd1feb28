//! Dynamic object graph read and produced by compiled plans.

use std::collections::BTreeMap;

use crate::{
    errors::DataError,
    primitive::{PrimitiveKind, width_mask},
};

/// Named members of a composite value.
pub type Fields = BTreeMap<String, Value>;

/// A live value of any layout kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    /// Enum value by its numeric representation. Need not be a declared member.
    Enum(i128),
    Str(String),
    List(Vec<Value>),
    Struct(Fields),
}

/// 128-bit decimal in its wire representation: a 96-bit mantissa in the low
/// three words, the scale in bits 112..120 and the sign in bit 127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal(u128);

impl Decimal {
    const MANTISSA_MASK: u128 = (1u128 << 96) - 1;

    /// Builds a decimal worth `mantissa * 10^-scale`. Returns `None` if the
    /// mantissa needs more than 96 bits or the scale exceeds 28.
    pub fn new(mantissa: i128, scale: u8) -> Option<Self> {
        let magnitude = mantissa.unsigned_abs();
        if magnitude > Self::MANTISSA_MASK || scale > 28 {
            return None;
        }

        let sign = if mantissa < 0 { 1u128 << 127 } else { 0 };
        Some(Decimal(magnitude | (scale as u128) << 112 | sign))
    }

    pub fn from_bits(bits: u128) -> Self {
        Decimal(bits)
    }

    pub fn to_bits(self) -> u128 {
        self.0
    }

    pub fn mantissa(self) -> i128 {
        let magnitude = (self.0 & Self::MANTISSA_MASK) as i128;
        if self.0 >> 127 == 1 { -magnitude } else { magnitude }
    }

    pub fn scale(self) -> u8 {
        (self.0 >> 112) as u8
    }
}

impl Value {
    /// Short name of the variant, used in mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::U8(_) => "u8",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Decimal(_) => "decimal",
            Value::Char(_) => "char",
            Value::Enum(_) => "enum",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
        }
    }

    /// The zero value of a primitive kind.
    pub fn zero(kind: PrimitiveKind) -> Value {
        match kind {
            PrimitiveKind::Bool => Value::Bool(false),
            PrimitiveKind::F32 => Value::F32(0.0),
            PrimitiveKind::F64 => Value::F64(0.0),
            PrimitiveKind::Decimal => Value::Decimal(Decimal::default()),
            PrimitiveKind::Char => Value::Char('\0'),
            integral => Value::from_integer(integral, 0).unwrap_or(Value::I32(0)),
        }
    }

    /// Builds the value variant of an integral kind. `None` if `value` does not
    /// fit or the kind is not integral.
    pub fn from_integer(kind: PrimitiveKind, value: i128) -> Option<Value> {
        if !kind.fits(value) {
            return None;
        }

        Some(match kind {
            PrimitiveKind::I8 => Value::I8(value as i8),
            PrimitiveKind::U8 => Value::U8(value as u8),
            PrimitiveKind::I16 => Value::I16(value as i16),
            PrimitiveKind::U16 => Value::U16(value as u16),
            PrimitiveKind::I32 => Value::I32(value as i32),
            PrimitiveKind::U32 => Value::U32(value as u32),
            PrimitiveKind::I64 => Value::I64(value as i64),
            PrimitiveKind::U64 => Value::U64(value as u64),
            _ => return None,
        })
    }

    /// Numeric value of any integer or enum variant.
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            Value::I8(v) => Some(v as i128),
            Value::U8(v) => Some(v as i128),
            Value::I16(v) => Some(v as i128),
            Value::U16(v) => Some(v as i128),
            Value::I32(v) => Some(v as i128),
            Value::U32(v) => Some(v as i128),
            Value::I64(v) => Some(v as i128),
            Value::U64(v) => Some(v as i128),
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&Fields> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Member of a struct value.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.as_fields()?.get(name)
    }

    pub fn into_fields(self) -> Result<Fields, DataError> {
        match self {
            Value::Struct(fields) => Ok(fields),
            other => Err(mismatch("struct", &other)),
        }
    }

    /// Raw bits of a scalar in host order, truncated to the kind's width.
    /// The variant must match `kind`.
    pub(crate) fn to_raw(&self, kind: PrimitiveKind) -> Result<u128, DataError> {
        let raw = match (kind, self) {
            (PrimitiveKind::Bool, Value::Bool(v)) => *v as u128,
            (PrimitiveKind::I8, Value::I8(v)) => *v as u8 as u128,
            (PrimitiveKind::U8, Value::U8(v)) => *v as u128,
            (PrimitiveKind::I16, Value::I16(v)) => *v as u16 as u128,
            (PrimitiveKind::U16, Value::U16(v)) => *v as u128,
            (PrimitiveKind::I32, Value::I32(v)) => *v as u32 as u128,
            (PrimitiveKind::U32, Value::U32(v)) => *v as u128,
            (PrimitiveKind::I64, Value::I64(v)) => *v as u64 as u128,
            (PrimitiveKind::U64, Value::U64(v)) => *v as u128,
            (PrimitiveKind::F32, Value::F32(v)) => v.to_bits() as u128,
            (PrimitiveKind::F64, Value::F64(v)) => v.to_bits() as u128,
            (PrimitiveKind::Decimal, Value::Decimal(v)) => v.to_bits(),
            (PrimitiveKind::Char, Value::Char(c)) => {
                let scalar = *c as u32;
                if scalar > u16::MAX as u32 {
                    return Err(DataError::UnrepresentableChar(*c));
                }
                scalar as u128
            }
            (kind, other) => return Err(mismatch(kind_label(kind), other)),
        };

        Ok(raw)
    }

    /// Inverse of [Value::to_raw].
    pub(crate) fn from_raw(kind: PrimitiveKind, raw: u128) -> Result<Value, DataError> {
        let value = match kind {
            PrimitiveKind::Bool => Value::Bool(raw != 0),
            PrimitiveKind::F32 => Value::F32(f32::from_bits(raw as u32)),
            PrimitiveKind::F64 => Value::F64(f64::from_bits(raw as u64)),
            PrimitiveKind::Decimal => Value::Decimal(Decimal::from_bits(raw)),
            PrimitiveKind::Char => {
                let unit = raw as u16;
                Value::Char(char::from_u32(unit as u32).ok_or(DataError::InvalidCodeUnit(unit))?)
            }
            integral => {
                let value = integer_from_raw(integral, raw);
                Value::from_integer(integral, value).ok_or(DataError::OutOfRange {
                    value,
                    repr: integral,
                })?
            }
        };

        Ok(value)
    }
}

/// Two's complement bits of `value` in `kind`'s width, after a range check.
pub(crate) fn integer_to_raw(kind: PrimitiveKind, value: i128) -> Result<u128, DataError> {
    if !kind.fits(value) {
        return Err(DataError::OutOfRange { value, repr: kind });
    }

    Ok(value as u128 & width_mask(kind.width()))
}

/// Reads `raw` as an integer of `kind`, sign-extending signed kinds.
pub(crate) fn integer_from_raw(kind: PrimitiveKind, raw: u128) -> i128 {
    let bits = kind.bits();
    let raw = raw & width_mask(kind.width());
    if kind.is_signed() && bits < 128 {
        let shift = 128 - bits;
        ((raw << shift) as i128) >> shift
    } else {
        raw as i128
    }
}

fn kind_label(kind: PrimitiveKind) -> &'static str {
    Value::zero(kind).kind_name()
}

pub(crate) fn mismatch(expected: &'static str, found: &Value) -> DataError {
    DataError::ValueMismatch {
        expected,
        found: found.kind_name(),
    }
}

/// Conversion of a Rust value into a [Value].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

/// Conversion of a [Value] back into a Rust value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, DataError>;
}

macro_rules! impl_scalar_value {
    ($($ty:ty => $variant:ident, $label:literal;)*) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, DataError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch($label, &other)),
                    }
                }
            }
        )*
    };
}

impl_scalar_value! {
    bool => Bool, "bool";
    i8 => I8, "i8";
    u8 => U8, "u8";
    i16 => I16, "i16";
    u16 => U16, "u16";
    i32 => I32, "i32";
    u32 => U32, "u32";
    i64 => I64, "i64";
    u64 => U64, "u64";
    f32 => F32, "f32";
    f64 => F64, "f64";
    Decimal => Decimal, "decimal";
    char => Char, "char";
    String => Str, "string";
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, DataError> {
        Ok(value)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, DataError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

/// Removes `name` from `fields` and converts it.
pub fn take_field<T: FromValue>(fields: &mut Fields, name: &str) -> Result<T, DataError> {
    let value = fields
        .remove(name)
        .ok_or_else(|| DataError::MissingField(name.to_string()))?;
    T::from_value(value)
}

/// Builds a struct value from `(name, value)` pairs.
pub fn record<I, K>(members: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    Value::Struct(
        members
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect(),
    )
}
