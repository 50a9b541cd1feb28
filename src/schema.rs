//! Schema: a validated layout compiled into a reusable plan.

use std::io::{Read, Write};

use log::{debug, trace};

use crate::{
    compiled::CompiledPlan,
    de::Decoder,
    descriptor::TypeDescriptor,
    errors::{DataError, LayoutError, Result},
    layout::TypeLayout,
    ser::Encoder,
    stream::{LayoutReader, LayoutWriter},
    value::Value,
};

/// A compiled layout. Use [Schema::compile] to build one from a [TypeLayout],
/// then [Schema::serialize] and [Schema::deserialize] to translate values.
///
/// A schema is immutable and may be shared between threads; every call owns
/// its own traversal state.
#[derive(Debug)]
pub struct Schema {
    name: String,
    descriptor: TypeDescriptor,
    plan: CompiledPlan,
}

impl Schema {
    /// Analyzes and compiles `layout`. Every structural problem is reported
    /// here, before any instance is processed.
    pub fn compile(layout: &TypeLayout) -> Result<Self, LayoutError> {
        let built = TypeDescriptor::analyze(layout)
            .and_then(|descriptor| Ok((CompiledPlan::try_from(&descriptor)?, descriptor)));

        let (plan, descriptor) = match built {
            Ok(built) => built,
            Err(err) => {
                debug!("rejected layout `{}`: {err}", layout.name);
                return Err(err);
            }
        };

        debug!(
            "compiled layout `{}` (fixed size: {}, min size: {})",
            layout.name, plan.has_fixed_size, plan.min_size
        );

        Ok(Self {
            name: layout.name.clone(),
            descriptor,
            plan,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    /// True if every instance encodes to exactly [Schema::min_size] bytes.
    pub fn has_fixed_size(&self) -> bool {
        self.plan.has_fixed_size
    }

    /// Lower bound on the encoded size of any instance.
    pub fn min_size(&self) -> usize {
        self.plan.min_size
    }

    /// Encodes `value`, which must be a [Value::Struct], and returns the
    /// number of bytes written.
    pub fn serialize<W: Write>(&self, writer: &mut W, value: &Value) -> Result<usize> {
        let Value::Struct(fields) = value else {
            return Err(DataError::ValueMismatch {
                expected: "struct",
                found: value.kind_name(),
            }
            .into());
        };

        let mut out = LayoutWriter::new(writer);
        Encoder::new(&mut out).composite(&self.plan.root, fields)?;
        let written = out.finish()?;

        trace!("serialized `{}`: {written} bytes", self.name);
        Ok(written)
    }

    /// Decodes one instance. Bytes past the instance are left in the reader.
    pub fn deserialize<R: Read>(&self, reader: &mut R) -> Result<Value> {
        let mut input = LayoutReader::new(reader);
        let fields = Decoder::new(&mut input).composite(&self.plan.root)?;

        trace!("deserialized `{}`: {} bytes", self.name, input.position());
        Ok(Value::Struct(fields))
    }

    /// Decodes one instance from the front of `data`, failing fast when the
    /// slice cannot hold the minimum size.
    pub fn deserialize_slice(&self, data: &[u8]) -> Result<Value> {
        if data.len() < self.plan.min_size {
            return Err(DataError::BufferTooShort {
                need: self.plan.min_size,
                have: data.len(),
            }
            .into());
        }

        let mut data = data;
        self.deserialize(&mut data)
    }

    pub fn to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.plan.min_size);
        self.serialize(&mut bytes, value)?;
        Ok(bytes)
    }
}
