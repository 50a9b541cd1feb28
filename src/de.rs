//! Decode pass over a compiled plan.

use std::io::Read;

use crate::{
    compiled::{CompiledComposite, CompiledField, CompiledKind, CompiledSize, CompiledStringSize},
    context::TraversalContext,
    errors::{DataError, Result},
    layout::CustomTag,
    length_key::LengthSource,
    stream::LayoutReader,
    text::Encoding,
    value::{Fields, Value},
};

/// Walks a plan while building the decoded value. Each frame's subject is the
/// field map of the composite under construction.
pub(crate) struct Decoder<'a, 'p, R> {
    input: &'a mut LayoutReader<R>,
    ctx: TraversalContext<'p, Fields>,
}

impl<'a, 'p, R: Read> Decoder<'a, 'p, R> {
    pub(crate) fn new(input: &'a mut LayoutReader<R>) -> Self {
        Self {
            input,
            ctx: TraversalContext::new(),
        }
    }

    pub(crate) fn composite(&mut self, plan: &'p CompiledComposite) -> Result<Fields> {
        self.input.reset_bits();
        self.ctx.push_frame(&plan.name, Fields::new());

        for field in &plan.fields {
            self.ctx.enter(&field.name);
            let result = self.field(field);
            let result = result.map_err(|err| err.at(|| self.ctx.path()));
            self.ctx.leave();
            result?;
        }

        let mut fields = self.ctx.pop_frame().unwrap_or_default();
        for (name, default) in &plan.skipped {
            fields.insert(name.clone(), default.clone());
        }

        self.input.reset_bits();
        Ok(fields)
    }

    fn field(&mut self, field: &'p CompiledField) -> Result<()> {
        let value = self.kind(&field.kind)?;

        if let Some(key) = &field.length_of {
            let length = value
                .as_integer()
                .ok_or(DataError::ValueMismatch {
                    expected: "integer",
                    found: value.kind_name(),
                })?;
            self.ctx.record_length(key, length);
        }

        if let Some(fields) = self.ctx.subject_mut() {
            fields.insert(field.name.clone(), value);
        }

        if field.pad_after {
            self.input.reset_bits();
        }

        Ok(())
    }

    fn kind(&mut self, kind: &'p CompiledKind) -> Result<Value> {
        let value = match kind {
            CompiledKind::Scalar { repr, swap, flavor } => {
                let raw = self.input.read_raw(repr.width(), *swap)?;
                flavor.decode(*repr, raw)?
            }
            CompiledKind::Bits { repr, width: 0, flavor, .. } => {
                self.input.reset_bits();
                flavor.zero(*repr)
            }
            CompiledKind::Bits {
                repr,
                width,
                container,
                swap,
                flavor,
            } => {
                let bits = self.input.unpack(*container, *width, *swap)?;
                flavor.decode_bits(*repr, *width, bits)?
            }
            CompiledKind::String { encoding, size } => self.string(*encoding, size)?,
            CompiledKind::Collection { element, size, .. } => self.collection(element, size)?,
            CompiledKind::Composite(composite) => Value::Struct(self.composite(composite)?),
            CompiledKind::Custom(tag) => self.custom(tag)?,
        };

        Ok(value)
    }

    /// Number of units to keep and number of slots on the wire.
    fn size(&self, size: &CompiledSize) -> Result<(usize, usize), DataError> {
        match size {
            CompiledSize::Fixed(fixed) => Ok((*fixed, *fixed)),
            CompiledSize::Keyed(source) => {
                let len = self.length(source)?;
                Ok((len, len))
            }
            CompiledSize::Padded { source, fixed } => {
                let len = self.length(source)?;
                if len > *fixed {
                    return Err(DataError::LengthExceedsFixed { len, max: *fixed });
                }
                Ok((len, *fixed))
            }
        }
    }

    fn length(&self, source: &LengthSource) -> Result<usize, DataError> {
        let value = self
            .ctx
            .length(source.up, &source.key)
            .ok_or_else(|| DataError::MissingLength(source.key.clone()))?;

        usize::try_from(value).map_err(|_| DataError::InvalidLength(value))
    }

    fn string(&mut self, encoding: Encoding, size: &CompiledStringSize) -> Result<Value> {
        let bytes = match size {
            CompiledStringSize::NullTerminated => self.input.read_until_nul()?,
            CompiledStringSize::Sized(CompiledSize::Fixed(fixed)) => {
                let mut bytes = self.input.read_bytes(*fixed)?;
                if encoding.is_null_terminable() {
                    if let Some(end) = bytes.iter().position(|&byte| byte == 0) {
                        bytes.truncate(end);
                    }
                }
                bytes
            }
            CompiledStringSize::Sized(size) => {
                let (len, slots) = self.size(size)?;
                let bytes = self.input.read_bytes(len)?;
                self.input.skip(slots - len)?;
                bytes
            }
        };

        Ok(Value::Str(encoding.decode(&bytes)?))
    }

    /// Padding slots are decoded like any element and dropped.
    fn collection(&mut self, element: &'p CompiledKind, size: &CompiledSize) -> Result<Value> {
        let (len, slots) = self.size(size)?;
        let mut items = Vec::new();

        for index in 0..slots {
            self.ctx.enter_index(index);
            let result = self.kind(element);
            let result = result.map_err(|err| err.at(|| self.ctx.path()));
            self.ctx.leave();

            let item = result?;
            if index < len {
                items.push(item);
            }
        }

        Ok(Value::List(items))
    }

    fn custom(&mut self, tag: &CustomTag) -> Result<Value> {
        let Self { input, ctx } = self;
        let context = tag
            .context_type
            .as_deref()
            .and_then(|type_name| ctx.find_subject(type_name));

        let start = input.position();
        let value = tag.codec.deserialize(&mut **input, context)?;
        input.reset_bits();

        let actual = input.position() - start;
        let contract = tag.codec.size();
        if !contract.admits(actual) {
            return Err(DataError::SizeContract { actual, contract }.into());
        }

        Ok(value)
    }
}
