//! Counting stream wrappers that own the bit container.
//!
//! Every plain read or write first flushes (writer) or discards (reader) the
//! active bit container, so leftover bits never bleed into byte-aligned data.

use std::io::{self, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    bits::{BitPacker, BitUnpacker},
    errors::Result,
    primitive::swap_width,
};

/// Byte-counting adapter around a reader or writer.
#[derive(Debug)]
struct Counted<T> {
    inner: T,
    count: usize,
}

impl<W: Write> Write for Counted<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<R: Read> Read for Counted<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        Ok(n)
    }
}

/// Write side of a plan execution.
#[derive(Debug)]
pub struct LayoutWriter<W> {
    out: Counted<W>,
    packer: BitPacker,
}

impl<W: Write> LayoutWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            out: Counted { inner, count: 0 },
            packer: BitPacker::default(),
        }
    }

    /// Bytes written so far, including flushed containers.
    pub fn position(&self) -> usize {
        self.out.count
    }

    /// Writes the low `width` bytes of a host-order raw value, swapped first if requested.
    pub fn write_raw(&mut self, width: usize, raw: u128, swap: bool) -> io::Result<()> {
        self.flush_bits()?;
        let raw = if swap { swap_width(raw, width) } else { raw };
        self.out.write_uint128::<NativeEndian>(raw, width)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.flush_bits()?;
        self.out.write_all(bytes)
    }

    pub fn write_zeros(&mut self, count: usize) -> io::Result<()> {
        self.flush_bits()?;
        io::copy(&mut io::repeat(0).take(count as u64), &mut self.out)?;
        Ok(())
    }

    /// Packs a bitfield into the active container.
    pub fn pack(&mut self, value: u64, width: usize, bits: u32, swap: bool) -> Result<()> {
        self.packer.pack(&mut self.out, value, width, bits, swap)
    }

    pub fn flush_bits(&mut self) -> io::Result<()> {
        self.packer.flush(&mut self.out)
    }

    /// Flushes pending bits and returns the total byte count.
    pub fn finish(mut self) -> io::Result<usize> {
        self.flush_bits()?;
        self.out.flush()?;
        Ok(self.out.count)
    }
}

impl<W: Write> Write for LayoutWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.flush_bits()?;
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_bits()?;
        self.out.flush()
    }
}

/// Read side of a plan execution.
#[derive(Debug)]
pub struct LayoutReader<R> {
    input: Counted<R>,
    unpacker: BitUnpacker,
}

impl<R: Read> LayoutReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            input: Counted { inner, count: 0 },
            unpacker: BitUnpacker::default(),
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.input.count
    }

    /// Reads `width` bytes as a host-order raw value, swapped if requested.
    pub fn read_raw(&mut self, width: usize, swap: bool) -> io::Result<u128> {
        self.reset_bits();
        let raw = self.input.read_uint128::<NativeEndian>(width)?;
        Ok(if swap { swap_width(raw, width) } else { raw })
    }

    /// Reads exactly `count` bytes. The buffer grows with the data actually
    /// received, so a corrupt length cannot trigger a huge allocation.
    pub fn read_bytes(&mut self, count: usize) -> io::Result<Vec<u8>> {
        self.reset_bits();
        let mut bytes = Vec::new();
        (&mut self.input).take(count as u64).read_to_end(&mut bytes)?;
        if bytes.len() < count {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        Ok(bytes)
    }

    /// Consumes and discards exactly `count` bytes.
    pub fn skip(&mut self, count: usize) -> io::Result<()> {
        self.reset_bits();
        let skipped = io::copy(&mut (&mut self.input).take(count as u64), &mut io::sink())?;
        if skipped < count as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        Ok(())
    }

    /// Reads up to and including a zero byte. The terminator is not returned.
    pub fn read_until_nul(&mut self) -> io::Result<Vec<u8>> {
        self.reset_bits();
        let mut bytes = Vec::new();
        loop {
            match self.input.read_u8()? {
                0 => return Ok(bytes),
                byte => bytes.push(byte),
            }
        }
    }

    /// Unpacks a bitfield from the active container.
    pub fn unpack(&mut self, width: usize, bits: u32, swap: bool) -> Result<u64> {
        self.unpacker.unpack(&mut self.input, width, bits, swap)
    }

    pub fn reset_bits(&mut self) {
        self.unpacker.reset();
    }
}

impl<R: Read> Read for LayoutReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reset_bits();
        self.input.read(buf)
    }
}
