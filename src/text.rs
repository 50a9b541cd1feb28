//! Text encodings for string fields.

use crate::errors::DataError;

/// Character encoding used to turn a string field into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// 7-bit ASCII, one byte per character.
    Ascii,
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl Encoding {
    /// True if a single zero byte unambiguously ends a string in this encoding.
    ///
    /// Only these encodings may be null terminated or zero-padded inside a
    /// fixed-size slot without a length key.
    pub fn is_null_terminable(self) -> bool {
        matches!(self, Encoding::Ascii | Encoding::Utf8)
    }

    /// Encodes `text` into bytes.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, DataError> {
        match self {
            Encoding::Ascii => {
                if !text.is_ascii() {
                    return Err(DataError::Unencodable(self));
                }

                Ok(text.as_bytes().to_vec())
            }
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Encoding::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Encoding::Utf32Le => Ok(text.chars().flat_map(|c| (c as u32).to_le_bytes()).collect()),
            Encoding::Utf32Be => Ok(text.chars().flat_map(|c| (c as u32).to_be_bytes()).collect()),
        }
    }

    /// Number of bytes `text` occupies once encoded.
    pub fn encoded_len(self, text: &str) -> Result<usize, DataError> {
        match self {
            Encoding::Ascii if !text.is_ascii() => Err(DataError::Unencodable(self)),
            Encoding::Ascii | Encoding::Utf8 => Ok(text.len()),
            Encoding::Utf16Le | Encoding::Utf16Be => Ok(text.encode_utf16().count() * 2),
            Encoding::Utf32Le | Encoding::Utf32Be => Ok(text.chars().count() * 4),
        }
    }

    /// Decodes `bytes` into a string. The whole slice is decoded.
    pub fn decode(self, bytes: &[u8]) -> Result<String, DataError> {
        match self {
            Encoding::Ascii => {
                if !bytes.is_ascii() {
                    return Err(DataError::InvalidText(self));
                }

                String::from_utf8(bytes.to_vec()).map_err(|_| DataError::InvalidText(self))
            }
            Encoding::Utf8 => {
                String::from_utf8(bytes.to_vec()).map_err(|_| DataError::InvalidText(self))
            }
            Encoding::Utf16Le | Encoding::Utf16Be => {
                if bytes.len() % 2 != 0 {
                    return Err(DataError::InvalidText(self));
                }

                let units = bytes.chunks_exact(2).map(|pair| {
                    let pair = [pair[0], pair[1]];
                    if self == Encoding::Utf16Le {
                        u16::from_le_bytes(pair)
                    } else {
                        u16::from_be_bytes(pair)
                    }
                });

                char::decode_utf16(units)
                    .collect::<Result<String, _>>()
                    .map_err(|_| DataError::InvalidText(self))
            }
            Encoding::Utf32Le | Encoding::Utf32Be => {
                if bytes.len() % 4 != 0 {
                    return Err(DataError::InvalidText(self));
                }

                bytes
                    .chunks_exact(4)
                    .map(|quad| {
                        let quad = [quad[0], quad[1], quad[2], quad[3]];
                        let scalar = if self == Encoding::Utf32Le {
                            u32::from_le_bytes(quad)
                        } else {
                            u32::from_be_bytes(quad)
                        };
                        char::from_u32(scalar).ok_or(DataError::InvalidText(self))
                    })
                    .collect()
            }
        }
    }
}
