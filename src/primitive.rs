//! Registry of the scalar kinds a layout can put on the wire.
//!
//! Every kind has a fixed byte width. Integral kinds additionally carry their
//! signedness and value range, which the descriptor model uses to validate
//! enum members and boolean/enum equivalent types.

use std::ops::RangeInclusive;

/// A scalar kind supported by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimitiveKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// 128-bit decimal (96-bit mantissa, scale and sign in the top word).
    Decimal,
    /// A single UTF-16 code unit.
    Char,
}

/// Static facts about one [PrimitiveKind].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveInfo {
    pub kind: PrimitiveKind,
    /// Encoded size in bytes.
    pub width: usize,
    pub integral: bool,
    pub signed: bool,
}

const fn info(kind: PrimitiveKind, width: usize, integral: bool, signed: bool) -> PrimitiveInfo {
    PrimitiveInfo {
        kind,
        width,
        integral,
        signed,
    }
}

static REGISTRY: [PrimitiveInfo; 13] = [
    info(PrimitiveKind::Bool, 1, false, false),
    info(PrimitiveKind::I8, 1, true, true),
    info(PrimitiveKind::U8, 1, true, false),
    info(PrimitiveKind::I16, 2, true, true),
    info(PrimitiveKind::U16, 2, true, false),
    info(PrimitiveKind::I32, 4, true, true),
    info(PrimitiveKind::U32, 4, true, false),
    info(PrimitiveKind::I64, 8, true, true),
    info(PrimitiveKind::U64, 8, true, false),
    info(PrimitiveKind::F32, 4, false, true),
    info(PrimitiveKind::F64, 8, false, true),
    info(PrimitiveKind::Decimal, 16, false, true),
    info(PrimitiveKind::Char, 2, false, false),
];

impl PrimitiveKind {
    /// Looks up the registry entry for this kind.
    pub fn info(self) -> &'static PrimitiveInfo {
        let index = match self {
            PrimitiveKind::Bool => 0,
            PrimitiveKind::I8 => 1,
            PrimitiveKind::U8 => 2,
            PrimitiveKind::I16 => 3,
            PrimitiveKind::U16 => 4,
            PrimitiveKind::I32 => 5,
            PrimitiveKind::U32 => 6,
            PrimitiveKind::I64 => 7,
            PrimitiveKind::U64 => 8,
            PrimitiveKind::F32 => 9,
            PrimitiveKind::F64 => 10,
            PrimitiveKind::Decimal => 11,
            PrimitiveKind::Char => 12,
        };

        &REGISTRY[index]
    }

    pub fn width(self) -> usize {
        self.info().width
    }

    pub fn bits(self) -> u32 {
        (self.width() * 8) as u32
    }

    pub fn is_integral(self) -> bool {
        self.info().integral
    }

    pub fn is_signed(self) -> bool {
        self.info().signed
    }

    /// Value range of an integral kind, `None` for everything else.
    pub fn range(self) -> Option<RangeInclusive<i128>> {
        let info = self.info();
        if !info.integral {
            return None;
        }

        let bits = self.bits();
        if info.signed {
            Some(-(1i128 << (bits - 1))..=(1i128 << (bits - 1)) - 1)
        } else {
            Some(0..=(1i128 << bits) - 1)
        }
    }

    /// True if `value` is representable by this integral kind.
    pub fn fits(self, value: i128) -> bool {
        self.range().is_some_and(|range| range.contains(&value))
    }

    /// Reverses the byte order of a raw value of this kind's width.
    pub fn swap(self, raw: u128) -> u128 {
        swap_width(raw, self.width())
    }
}

/// Byte order of a field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the machine running the codec.
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Whether a value of `width` bytes must be swapped to reach this order from host order.
    pub fn needs_swap(self, width: usize) -> bool {
        width > 1 && self != Endianness::host()
    }
}

/// Reverses the low `width` bytes of `raw`. Bytes above `width` must be zero.
pub fn swap_width(raw: u128, width: usize) -> u128 {
    if width <= 1 {
        return raw;
    }

    raw.swap_bytes() >> (128 - width * 8)
}

/// Mask selecting the low `width` bytes.
pub(crate) fn width_mask(width: usize) -> u128 {
    if width >= 16 {
        u128::MAX
    } else {
        (1u128 << (width * 8)) - 1
    }
}
