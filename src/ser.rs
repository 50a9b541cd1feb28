//! Encode pass over a compiled plan.

use std::io::Write;

use crate::{
    compiled::{CompiledComposite, CompiledField, CompiledKind, CompiledSize, CompiledStringSize, bits_of},
    context::TraversalContext,
    errors::{DataError, Error, Result},
    layout::CustomTag,
    length_key::{LengthFeed, Measure},
    stream::LayoutWriter,
    text::Encoding,
    value::{Fields, Value, integer_to_raw, mismatch},
};

/// Walks a plan together with the value being encoded. `'p` covers both the
/// plan and the value: padding elements are borrowed from the plan.
pub(crate) struct Encoder<'a, 'p, W> {
    out: &'a mut LayoutWriter<W>,
    ctx: TraversalContext<'p, &'p Fields>,
}

impl<'a, 'p, W: Write> Encoder<'a, 'p, W> {
    pub(crate) fn new(out: &'a mut LayoutWriter<W>) -> Self {
        Self {
            out,
            ctx: TraversalContext::new(),
        }
    }

    /// Encodes `fields` as an instance of `plan`. Composites are byte aligned:
    /// the bit container is flushed on entry and on exit.
    pub(crate) fn composite(&mut self, plan: &'p CompiledComposite, fields: &'p Fields) -> Result<()> {
        self.out.flush_bits()?;
        self.ctx.push_frame(&plan.name, fields);

        for field in &plan.fields {
            self.ctx.enter(&field.name);
            let result = self.field(field, fields);
            let result = result.map_err(|err| err.at(|| self.ctx.path()));
            self.ctx.leave();
            result?;
        }

        self.ctx.pop_frame();
        self.out.flush_bits()?;
        Ok(())
    }

    fn field(&mut self, field: &'p CompiledField, fields: &'p Fields) -> Result<()> {
        if let Some(feed) = &field.length_feed {
            let length = measure(feed, fields).map_err(|(reached, err)| {
                Error::from(err).at(|| self.ctx.sibling_path(&feed.path[..reached]))
            })?;
            self.integer(&field.kind, length as i128)?;
        } else {
            let value = fields
                .get(&field.name)
                .ok_or_else(|| DataError::MissingField(field.name.clone()))?;
            self.kind(&field.kind, value)?;
        }

        if field.pad_after {
            self.out.flush_bits()?;
        }

        Ok(())
    }

    /// Writes a computed length into an integral scalar or bitfield. Any
    /// value the caller put in the field is ignored.
    fn integer(&mut self, kind: &CompiledKind, number: i128) -> Result<()> {
        match *kind {
            CompiledKind::Scalar { repr, swap, .. } => {
                let raw = integer_to_raw(repr, number)?;
                self.out.write_raw(repr.width(), raw, swap)?;
            }
            CompiledKind::Bits {
                repr,
                width,
                container,
                swap,
                ..
            } => {
                let bits = bits_of(number, repr.is_signed(), width)?;
                self.out.pack(bits, container, width, swap)?;
            }
            _ => return Err(DataError::InvalidLength(number).into()),
        }

        Ok(())
    }

    fn kind(&mut self, kind: &'p CompiledKind, value: &'p Value) -> Result<()> {
        match kind {
            CompiledKind::Scalar { repr, swap, flavor } => {
                let raw = flavor.encode(*repr, value)?;
                self.out.write_raw(repr.width(), raw, *swap)?;
            }
            CompiledKind::Bits { width: 0, .. } => self.out.flush_bits()?,
            CompiledKind::Bits {
                repr,
                width,
                container,
                swap,
                flavor,
            } => {
                let bits = flavor.encode_bits(*repr, *width, value)?;
                self.out.pack(bits, *container, *width, *swap)?;
            }
            CompiledKind::String { encoding, size } => self.string(*encoding, size, value)?,
            CompiledKind::Collection {
                element,
                size,
                default,
            } => self.collection(element, size, default.as_ref(), value)?,
            CompiledKind::Composite(composite) => {
                let fields = value.as_fields().ok_or_else(|| mismatch("struct", value))?;
                self.composite(composite, fields)?;
            }
            CompiledKind::Custom(tag) => self.custom(tag, value)?,
        }

        Ok(())
    }

    fn string(&mut self, encoding: Encoding, size: &CompiledStringSize, value: &Value) -> Result<()> {
        let text = value.as_str().ok_or_else(|| mismatch("string", value))?;
        let bytes = encoding.encode(text)?;

        let slot = match size {
            CompiledStringSize::NullTerminated => {
                if bytes.contains(&0) {
                    return Err(DataError::InteriorNul.into());
                }
                self.out.write_bytes(&bytes)?;
                self.out.write_zeros(1)?;
                return Ok(());
            }
            CompiledStringSize::Sized(CompiledSize::Keyed(_)) => bytes.len(),
            CompiledStringSize::Sized(CompiledSize::Fixed(fixed)) => {
                if bytes.len() < *fixed && !encoding.is_null_terminable() {
                    return Err(DataError::UnpaddableString {
                        len: bytes.len(),
                        fixed: *fixed,
                        encoding,
                    }
                    .into());
                }
                *fixed
            }
            CompiledStringSize::Sized(CompiledSize::Padded { fixed, .. }) => *fixed,
        };

        if bytes.len() > slot {
            return Err(DataError::TooManyBytes {
                len: bytes.len(),
                max: slot,
            }
            .into());
        }

        self.out.write_bytes(&bytes)?;
        self.out.write_zeros(slot - bytes.len())?;
        Ok(())
    }

    fn collection(
        &mut self,
        element: &'p CompiledKind,
        size: &CompiledSize,
        default: Option<&'p Value>,
        value: &'p Value,
    ) -> Result<()> {
        let items = value.as_list().ok_or_else(|| mismatch("list", value))?;

        let slots = match size {
            CompiledSize::Keyed(_) => items.len(),
            CompiledSize::Fixed(fixed) | CompiledSize::Padded { fixed, .. } => *fixed,
        };

        if items.len() > slots {
            return Err(DataError::TooManyElements {
                len: items.len(),
                max: slots,
            }
            .into());
        }

        let padding = match default {
            _ if items.len() == slots => None,
            Some(default) => Some(default),
            None => {
                return Err(DataError::NoDefault {
                    missing: slots - items.len(),
                }
                .into());
            }
        };

        let elements = items
            .iter()
            .chain(padding.into_iter().flat_map(|pad| std::iter::repeat_n(pad, slots - items.len())));

        for (index, item) in elements.enumerate() {
            self.ctx.enter_index(index);
            let result = self.kind(element, item);
            let result = result.map_err(|err| err.at(|| self.ctx.path()));
            self.ctx.leave();
            result?;
        }

        Ok(())
    }

    fn custom(&mut self, tag: &CustomTag, value: &Value) -> Result<()> {
        let context = tag
            .context_type
            .as_deref()
            .and_then(|type_name| self.ctx.find_subject(type_name))
            .copied();

        let start = self.out.position();
        tag.codec.serialize(&mut *self.out, value, context)?;
        self.out.flush_bits()?;

        let actual = self.out.position() - start;
        let contract = tag.codec.size();
        if !contract.admits(actual) {
            return Err(DataError::SizeContract { actual, contract }.into());
        }

        Ok(())
    }
}

/// True length of the consumer a carrier feeds. A failure carries the number
/// of feed path members reached, so it can be reported at that member.
fn measure(feed: &LengthFeed, fields: &Fields) -> Result<usize, (usize, DataError)> {
    let Some((target, parents)) = feed.path.split_last() else {
        return Ok(0);
    };

    let mut current = fields;
    for (depth, name) in parents.iter().enumerate() {
        let fail = |err| (depth + 1, err);
        let value = current
            .get(name)
            .ok_or_else(|| fail(DataError::MissingField(name.clone())))?;
        current = value
            .as_fields()
            .ok_or_else(|| fail(mismatch("struct", value)))?;
    }

    let fail = |err| (feed.path.len(), err);
    let value = current
        .get(target)
        .ok_or_else(|| fail(DataError::MissingField(target.clone())))?;

    match feed.measure {
        Measure::Elements => value
            .as_list()
            .map(<[Value]>::len)
            .ok_or_else(|| fail(mismatch("list", value))),
        Measure::Bytes(encoding) => {
            let text = value
                .as_str()
                .ok_or_else(|| fail(mismatch("string", value)))?;
            encoding.encoded_len(text).map_err(fail)
        }
    }
}
