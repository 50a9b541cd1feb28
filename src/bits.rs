//! Bit container codec.
//!
//! Sub-byte fields are packed LSB-first into byte-aligned containers of 1 to
//! 8 bytes: the first field of a container occupies its lowest bits. A full
//! or flushed container is written as one integer of the container width,
//! byte-swapped when the run's byte order differs from the host.

use std::io::{self, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    errors::{DataError, LayoutErrorKind, Result},
    primitive::{Endianness, swap_width},
};

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }

    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Mask selecting the low `bits` bits.
pub fn low_mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

#[derive(Debug, Clone, Copy)]
struct Container {
    acc: u64,
    width: usize,
    /// Bits filled (packing) or still unread (unpacking).
    bits: u32,
    swap: bool,
}

impl Container {
    fn capacity(&self) -> u32 {
        (self.width * 8) as u32
    }
}

fn check_fits(width: usize, bits: u32) -> Result<(), DataError> {
    if !(1..=8).contains(&width) {
        return Err(DataError::InvalidContainerWidth(width));
    }
    if bits as usize > width * 8 {
        return Err(DataError::ContainerOverflow { bits, width });
    }

    Ok(())
}

/// Accumulates bitfields on the write side.
#[derive(Debug, Default)]
pub struct BitPacker {
    active: Option<Container>,
}

impl BitPacker {
    /// Contributes the low `bits` of `value` to a container of `width` bytes.
    /// `bits == 0` flushes the active container.
    pub fn pack<W: Write>(
        &mut self,
        out: &mut W,
        value: u64,
        width: usize,
        bits: u32,
        swap: bool,
    ) -> Result<()> {
        check_fits(width, bits)?;
        if value & !low_mask(bits) != 0 {
            return Err(DataError::BitOverflow { value, bits }.into());
        }

        if bits == 0 {
            return Ok(self.flush(out)?);
        }

        if let Some(active) = &self.active {
            if active.width != width || active.bits + bits > active.capacity() {
                self.flush(out)?;
            }
        }

        let container = self.active.get_or_insert(Container {
            acc: 0,
            width,
            bits: 0,
            swap,
        });

        if container.swap != swap {
            return Err(DataError::ContainerSwapMismatch.into());
        }

        container.acc |= value << container.bits;
        container.bits += bits;

        Ok(())
    }

    /// Writes the active container, if any, and clears it.
    pub fn flush<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let Some(container) = self.active.take() else {
            return Ok(());
        };

        let mut raw = container.acc as u128;
        if container.swap {
            raw = swap_width(raw, container.width);
        }

        out.write_uint128::<NativeEndian>(raw, container.width)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }
}

/// Peels bitfields off containers on the read side.
#[derive(Debug, Default)]
pub struct BitUnpacker {
    active: Option<Container>,
}

impl BitUnpacker {
    /// Reads the next `bits` bits from a container of `width` bytes, refilling
    /// the container from `input` when the width changes or too few bits remain.
    /// `bits == 0` discards the active container.
    pub fn unpack<R: Read>(
        &mut self,
        input: &mut R,
        width: usize,
        bits: u32,
        swap: bool,
    ) -> Result<u64> {
        check_fits(width, bits)?;

        if bits == 0 {
            self.reset();
            return Ok(0);
        }

        let refill = match &self.active {
            Some(active) => active.width != width || active.bits < bits,
            None => true,
        };

        if refill {
            let mut raw = input.read_uint128::<NativeEndian>(width)?;
            if swap {
                raw = swap_width(raw, width);
            }

            self.active = Some(Container {
                acc: raw as u64,
                width,
                bits: (width * 8) as u32,
                swap,
            });
        }

        let Some(container) = self.active.as_mut() else {
            return Ok(0);
        };

        if container.swap != swap {
            return Err(DataError::ContainerSwapMismatch.into());
        }

        let value = container.acc & low_mask(bits);
        container.acc = container.acc.checked_shr(bits).unwrap_or(0);
        container.bits -= bits;

        Ok(value)
    }

    /// Drops the remaining bits of the active container.
    pub fn reset(&mut self) {
        self.active = None;
    }
}

/// Static mirror of [BitPacker] used to validate runs and count their bytes.
#[derive(Debug, Default)]
pub(crate) struct RunTracker {
    run: Option<Container>,
    bytes: usize,
}

impl RunTracker {
    /// Adds a bitfield of `bits` bits whose equivalent type is `width` bytes
    /// wide. Returns the byte width of the run's container.
    pub(crate) fn add(
        &mut self,
        width: usize,
        bits: u32,
        endianness: Endianness,
    ) -> Result<usize, LayoutErrorKind> {
        let run = self.run.get_or_insert_with(|| {
            self.bytes += width;
            Container {
                acc: 0,
                width,
                bits: 0,
                swap: endianness.needs_swap(width),
            }
        });

        if bits > run.capacity() {
            return Err(LayoutErrorKind::BitfieldExceedsContainer {
                width: bits,
                container: run.width,
            });
        }

        if endianness.needs_swap(run.width) != run.swap {
            return Err(LayoutErrorKind::MixedContainerEndianness);
        }

        if run.bits + bits > run.capacity() {
            self.bytes += run.width;
            run.bits = 0;
        }
        run.bits += bits;

        Ok(run.width)
    }

    /// Ends the current run.
    pub(crate) fn close(&mut self) {
        self.run = None;
    }

    /// Bytes taken by all containers seen so far.
    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::errors::Error;

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111111, 8), -1);
        assert_eq!(sign_extend(0b0111, 4), 7);
        assert_eq!(sign_extend(0b1000, 4), -8);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_pack_lsb_first() {
        let mut out = Vec::new();
        let mut packer = BitPacker::default();

        packer.pack(&mut out, 2, 1, 2, false).unwrap();
        packer.pack(&mut out, 1, 1, 1, false).unwrap();
        packer.flush(&mut out).unwrap();

        assert_eq!(out, vec![0x06]);
    }

    #[test]
    fn test_pack_flushes_when_full() {
        let mut out = Vec::new();
        let mut packer = BitPacker::default();

        packer.pack(&mut out, 0x1F, 1, 5, false).unwrap();
        packer.pack(&mut out, 0x1F, 1, 5, false).unwrap();
        assert_eq!(out, vec![0x1F]);

        packer.flush(&mut out).unwrap();
        assert_eq!(out, vec![0x1F, 0x1F]);
        assert!(packer.is_empty());
    }

    #[test]
    fn test_pack_flushes_on_width_change() {
        let mut out = Vec::new();
        let mut packer = BitPacker::default();

        packer.pack(&mut out, 1, 1, 1, false).unwrap();
        packer.pack(&mut out, 0x3FF, 2, 10, false).unwrap();
        packer.flush(&mut out).unwrap();

        let expected = [&[0x01][..], &0x03FFu16.to_ne_bytes()[..]].concat();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_pack_swapped_container() {
        let mut out = Vec::new();
        let mut packer = BitPacker::default();

        packer.pack(&mut out, 0x234, 2, 12, true).unwrap();
        packer.flush(&mut out).unwrap();

        let mut expected = 0x0234u16.to_ne_bytes();
        expected.reverse();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_pack_rejects_bad_input() {
        let mut out = Vec::new();
        let mut packer = BitPacker::default();

        let err = packer.pack(&mut out, 4, 1, 2, false).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::BitOverflow { value: 4, bits: 2 })));

        let err = packer.pack(&mut out, 0, 1, 9, false).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::ContainerOverflow { bits: 9, width: 1 })));

        packer.pack(&mut out, 1, 2, 1, false).unwrap();
        let err = packer.pack(&mut out, 1, 2, 1, true).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::ContainerSwapMismatch)));
    }

    #[test]
    fn test_container_width_limits() {
        let mut out = Vec::new();
        let mut packer = BitPacker::default();

        for width in [0, 9, 16] {
            let err = packer.pack(&mut out, 1, width, 1, false).unwrap_err();
            assert!(matches!(err, Error::Data(DataError::InvalidContainerWidth(w)) if w == width));
        }

        let err = packer.pack(&mut out, 1, 16, 64, false).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::InvalidContainerWidth(16))));
        assert!(packer.is_empty());
        assert!(out.is_empty());

        packer.pack(&mut out, 1, 8, 64, false).unwrap();
        packer.pack(&mut out, 1, 8, 64, false).unwrap();
        packer.flush(&mut out).unwrap();
        assert_eq!(out.len(), 16);

        let mut input = Cursor::new(vec![0xFF; 16]);
        let err = BitUnpacker::default()
            .unpack(&mut input, 16, 1, false)
            .unwrap_err();
        assert!(matches!(err, Error::Data(DataError::InvalidContainerWidth(16))));
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_zero_bits_is_flush() {
        let mut out = Vec::new();
        let mut packer = BitPacker::default();

        packer.pack(&mut out, 1, 1, 1, false).unwrap();
        packer.pack(&mut out, 0, 1, 0, false).unwrap();
        packer.pack(&mut out, 1, 1, 1, false).unwrap();
        packer.flush(&mut out).unwrap();

        assert_eq!(out, vec![0x01, 0x01]);
    }

    #[test]
    fn test_unpack_mirrors_pack() {
        let mut input = Cursor::new(vec![0x06, 0xAB]);
        let mut unpacker = BitUnpacker::default();

        assert_eq!(unpacker.unpack(&mut input, 1, 2, false).unwrap(), 2);
        assert_eq!(unpacker.unpack(&mut input, 1, 1, false).unwrap(), 1);
        assert_eq!(unpacker.unpack(&mut input, 1, 6, false).unwrap(), 0x2B);
        assert_eq!(input.position(), 2);
    }

    #[test]
    fn test_unpack_reset_realigns() {
        let mut input = Cursor::new(vec![0xFF, 0x01]);
        let mut unpacker = BitUnpacker::default();

        assert_eq!(unpacker.unpack(&mut input, 1, 1, false).unwrap(), 1);
        unpacker.reset();
        assert_eq!(unpacker.unpack(&mut input, 1, 1, false).unwrap(), 1);
        assert_eq!(input.position(), 2);
    }

    #[test]
    fn test_unpack_end_of_stream() {
        let mut input = Cursor::new(Vec::<u8>::new());
        let err = BitUnpacker::default()
            .unpack(&mut input, 1, 3, false)
            .unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn test_run_tracker() {
        let mut runs = RunTracker::default();

        assert_eq!(runs.add(1, 2, Endianness::Little).unwrap(), 1);
        assert_eq!(runs.add(4, 1, Endianness::Little).unwrap(), 1);
        assert_eq!(runs.bytes(), 1);

        assert_eq!(runs.add(1, 6, Endianness::Little).unwrap(), 1);
        assert_eq!(runs.bytes(), 2);

        runs.close();
        assert_eq!(runs.add(2, 3, Endianness::Big).unwrap(), 2);
        assert_eq!(runs.bytes(), 4);
    }
}
