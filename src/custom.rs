//! Escape hatch for fields whose wire format no annotation can express.

use std::{
    fmt,
    io::{Read, Write},
};

use crate::{
    errors::Result,
    value::{Fields, Value},
};

/// Byte count a [CustomCodec] promises to move per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeContract {
    /// Exactly this many bytes, every time.
    Exact(usize),
    /// At least this many bytes.
    AtLeast(usize),
}

impl SizeContract {
    pub fn admits(&self, actual: usize) -> bool {
        match *self {
            SizeContract::Exact(n) => actual == n,
            SizeContract::AtLeast(n) => actual >= n,
        }
    }

    pub fn min_size(&self) -> usize {
        match *self {
            SizeContract::Exact(n) | SizeContract::AtLeast(n) => n,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, SizeContract::Exact(_))
    }
}

impl fmt::Display for SizeContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeContract::Exact(n) => write!(f, "exactly {n} bytes"),
            SizeContract::AtLeast(n) => write!(f, "at least {n} bytes"),
        }
    }
}

/// A hand-written codec for one field.
///
/// The codec receives the raw stream. `context` is the field map of the
/// innermost enclosing composite whose type name matches the context type
/// declared next to the codec, if any. While deserializing, that map only
/// holds the fields decoded so far.
///
/// After each call the number of bytes moved is checked against [CustomCodec::size].
pub trait CustomCodec: fmt::Debug + Send + Sync {
    fn size(&self) -> SizeContract;

    fn serialize(&self, out: &mut dyn Write, value: &Value, context: Option<&Fields>)
    -> Result<()>;

    fn deserialize(&self, input: &mut dyn Read, context: Option<&Fields>) -> Result<Value>;

    /// Value used to pad fixed-length collections of this field. `None` means
    /// short collections cannot be padded.
    fn default_value(&self) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_contract() {
        assert!(SizeContract::Exact(4).admits(4));
        assert!(!SizeContract::Exact(4).admits(5));
        assert!(SizeContract::AtLeast(2).admits(9));
        assert!(!SizeContract::AtLeast(2).admits(1));
        assert_eq!(SizeContract::AtLeast(2).to_string(), "at least 2 bytes");
    }
}
