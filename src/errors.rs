//! Error types for layout analysis and plan execution.
//!
//! Three families exist: [LayoutError] is raised once per type while a plan is
//! built, [DataError] is a per-call fault before it is located, and
//! [TranslationError] is a per-call fault annotated with the dotted path of
//! the field that failed.

use std::io;

use crate::{custom::SizeContract, primitive::PrimitiveKind, text::Encoding};

/// Structural problem in a declared layout. Independent of any instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid layout at `{}`: {kind}", location(.type_name, .field))]
pub struct LayoutError {
    /// Composite type in which the problem was found.
    pub type_name: String,
    /// Offending field, if the problem is tied to one.
    pub field: Option<String>,
    pub kind: LayoutErrorKind,
}

fn location(type_name: &str, field: &Option<String>) -> String {
    match field {
        Some(field) => format!("{type_name}.{field}"),
        None => type_name.to_string(),
    }
}

impl LayoutError {
    pub fn new(type_name: impl Into<String>, field: Option<&str>, kind: LayoutErrorKind) -> Self {
        Self {
            type_name: type_name.into(),
            field: field.map(str::to_string),
            kind,
        }
    }
}

/// A layout problem found below a composite: either a fault of the field
/// being resolved, or an error already located in a nested composite.
#[derive(Debug)]
pub(crate) enum LayoutFault {
    Field(LayoutErrorKind),
    Located(LayoutError),
}

impl LayoutFault {
    /// Attaches the location of the field being resolved, unless already located.
    pub(crate) fn locate(self, type_name: &str, field: &str) -> LayoutError {
        match self {
            LayoutFault::Field(kind) => LayoutError::new(type_name, Some(field), kind),
            LayoutFault::Located(err) => err,
        }
    }
}

impl From<LayoutErrorKind> for LayoutFault {
    fn from(kind: LayoutErrorKind) -> Self {
        LayoutFault::Field(kind)
    }
}

impl From<LayoutError> for LayoutFault {
    fn from(err: LayoutError) -> Self {
        LayoutFault::Located(err)
    }
}

/// What is wrong with a layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutErrorKind {
    /// A list or string field has no collection/string annotation.
    #[error("{shape} field carries no {expected} annotation")]
    MissingAnnotation {
        shape: &'static str,
        expected: &'static str,
    },
    /// An annotation is attached to a field it cannot describe.
    #[error("{tag} annotation cannot describe a {shape} field")]
    AnnotationMismatch {
        tag: &'static str,
        shape: &'static str,
    },
    #[error("equivalent type {0:?} is not integral")]
    NonIntegralEquivalent(PrimitiveKind),
    #[error("enum member `{member}` = {value} does not fit {repr:?}")]
    EnumOutOfRange {
        member: String,
        value: i128,
        repr: PrimitiveKind,
    },
    #[error("no size policy: set a fixed length, a length key or null termination")]
    MissingSizePolicy,
    #[error("null termination cannot be combined with a fixed length or a length key")]
    ConflictingSizePolicy,
    #[error("{0:?} strings cannot be null terminated")]
    NullTerminationUnsupported(Encoding),
    #[error("fixed length must be greater than zero")]
    ZeroFixedLength,
    #[error("a {shape} field cannot be a bitfield")]
    InvalidBitfield { shape: &'static str },
    #[error("bit width {width} exceeds the {bits} bits of {repr:?}")]
    BitWidthTooWide {
        width: u32,
        repr: PrimitiveKind,
        bits: u32,
    },
    #[error("{width}-bit field does not fit the run's {container}-byte container")]
    BitfieldExceedsContainer { width: u32, container: usize },
    #[error("bitfields sharing a container disagree on byte order")]
    MixedContainerEndianness,
    #[error("field name is used more than once")]
    DuplicateName,
    #[error("order {0} is used by more than one field")]
    DuplicateOrder(u32),
    #[error("length key `{0}` is carried by more than one field")]
    DuplicateLengthField(String),
    #[error("length key `{0}` is referenced by more than one collection")]
    DuplicateLengthConsumer(String),
    #[error("length key `{0}` does not match any length field")]
    UnresolvedLengthKey(String),
    #[error("length key `{0}` matches more than one length field")]
    AmbiguousLengthKey(String),
    #[error("length field for `{0}` feeds no collection or string")]
    UnusedLengthField(String),
    #[error("length key `{0}` reaches outside a repeated element")]
    LengthKeyInRepeatedElement(String),
    #[error(
        "length field for `{key}` (order {length_order}) must precede its consumer (order {consumer_order})"
    )]
    LengthOrder {
        key: String,
        length_order: u32,
        consumer_order: u32,
    },
    #[error("elements of a length-keyed collection take no bytes on the wire")]
    ZeroSizedElement,
    #[error("length key `{0}` must be carried by an integral field")]
    NonIntegralLengthField(String),
    #[error("type `{0}` contains itself")]
    RecursiveType(String),
    #[error("unknown type `{0}`")]
    UnknownType(String),
}

/// A per-call fault that has not been located yet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("expected {expected} value, found {found}")]
    ValueMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("{len} elements exceed the fixed length of {max}")]
    TooManyElements { len: usize, max: usize },
    #[error("{len} encoded bytes exceed the fixed length of {max}")]
    TooManyBytes { len: usize, max: usize },
    #[error("{len} encoded bytes cannot be padded to {fixed} in {encoding:?}")]
    UnpaddableString {
        len: usize,
        fixed: usize,
        encoding: Encoding,
    },
    #[error("element type has no default to fill {missing} padding slots")]
    NoDefault { missing: usize },
    #[error("null-terminated string contains a NUL character")]
    InteriorNul,
    #[error("text cannot be encoded as {0:?}")]
    Unencodable(Encoding),
    #[error("bytes are not valid {0:?}")]
    InvalidText(Encoding),
    #[error("value {value} does not fit {repr:?}")]
    OutOfRange { value: i128, repr: PrimitiveKind },
    #[error("value {value:#x} does not fit in {bits} bits")]
    BitOverflow { value: u64, bits: u32 },
    #[error("bit container width must be 1 to 8 bytes, got {0}")]
    InvalidContainerWidth(usize),
    #[error("{bits} bits do not fit a {width}-byte container")]
    ContainerOverflow { bits: u32, width: usize },
    #[error("bitfield byte order differs from the active container")]
    ContainerSwapMismatch,
    #[error("char {0:?} is not a single UTF-16 code unit")]
    UnrepresentableChar(char),
    #[error("code unit {0:#06x} is not a valid char")]
    InvalidCodeUnit(u16),
    #[error("no decoded length for key `{0}`")]
    MissingLength(String),
    #[error("invalid length value {0}")]
    InvalidLength(i128),
    #[error("decoded length {len} exceeds the fixed length of {max}")]
    LengthExceedsFixed { len: usize, max: usize },
    #[error("custom codec moved {actual} bytes, contract requires {contract}")]
    SizeContract {
        actual: usize,
        contract: SizeContract,
    },
    #[error("buffer of {have} bytes is shorter than the minimum size of {need}")]
    BufferTooShort { need: usize, have: usize },
    #[error("{0}")]
    Custom(String),
}

/// A failure while translating one field, with the path from the root type.
#[derive(Debug, thiserror::Error)]
#[error("failed to translate `{path}`: {source}")]
pub struct TranslationError {
    path: String,
    source: Box<Error>,
}

impl TranslationError {
    pub fn new(path: impl Into<String>, cause: Error) -> Self {
        Self {
            path: path.into(),
            source: Box::new(cause),
        }
    }

    /// Dotted path of the failing field, e.g. `header.items[2].name`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The error that caused the translation to fail.
    pub fn cause(&self) -> &Error {
        &self.source
    }
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Annotates the error with a field path. Translation errors pass through
    /// unchanged so the innermost path wins.
    pub(crate) fn at(self, path: impl FnOnce() -> String) -> Error {
        match self {
            Error::Translation(_) => self,
            other => Error::Translation(TranslationError::new(path(), other)),
        }
    }

    /// Path of the failing field, if the error was located.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Translation(e) => Some(e.path()),
            _ => None,
        }
    }

    /// Innermost error, skipping translation wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Translation(e) => e.cause().root_cause(),
            other => other,
        }
    }

    /// True if the stream ended before the layout was satisfied.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.root_cause(), Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }

    pub fn as_data(&self) -> Option<&DataError> {
        match self.root_cause() {
            Error::Data(e) => Some(e),
            _ => None,
        }
    }
}
