//! # Sampled Value Tag Codec
//!
//! Tag/length/value primitives used by the session header and ASDU payloads.
//!
//! Lengths up to 127 are a single byte. Longer lengths set the high bit and use the low
//! seven bits to select a form: `0x81` is followed by one length byte, `0x82` by two
//! big-endian bytes. Any other form decodes as a zero length and consumes only the form
//! byte.
//!
//! Every parse function takes the buffer and a cursor, and advances the cursor past what
//! it consumed.

use super::common::{ParseError, SampledValueTag};

/// Decodes a tag length at `index`, advancing past the length header.
pub fn parse_tag_length(buffer: &[u8], index: &mut usize) -> Result<usize, ParseError> {
    let first = *buffer
        .get(*index)
        .ok_or_else(|| ParseError::short_buffer("Tag length", *index + 1, buffer.len()))?;

    if first & 0x80 == 0 {
        *index += 1;
        return Ok(first as usize);
    }

    match first & 0x7F {
        1 => {
            let length = *buffer.get(*index + 1).ok_or_else(|| {
                ParseError::short_buffer("8-bit tag length", *index + 2, buffer.len())
            })?;
            *index += 2;
            Ok(length as usize)
        }
        2 => {
            if *index + 3 > buffer.len() {
                return Err(ParseError::short_buffer(
                    "16-bit tag length",
                    *index + 3,
                    buffer.len(),
                ));
            }
            let length = u16::from_be_bytes([buffer[*index + 1], buffer[*index + 2]]);
            *index += 3;
            Ok(length as usize)
        }
        // Unknown long forms are treated as empty, only the form byte is consumed
        _ => {
            *index += 1;
            Ok(0)
        }
    }
}

/// Appends the minimal length header for `length`.
pub fn encode_tag_length(length: usize, buffer: &mut Vec<u8>) -> Result<(), ParseError> {
    if length <= 0x7F {
        buffer.push(length as u8);
    } else if length <= 0xFF {
        buffer.push(0x81);
        buffer.push(length as u8);
    } else if length <= 0xFFFF {
        buffer.push(0x82);
        buffer.extend_from_slice(&(length as u16).to_be_bytes());
    } else {
        return Err(ParseError::ValueTooLarge { length });
    }
    Ok(())
}

/// Appends a tag with a length header for `length`, without the value.
pub fn encode_tag_header(
    tag: SampledValueTag,
    length: usize,
    buffer: &mut Vec<u8>,
) -> Result<(), ParseError> {
    buffer.push(tag.0);
    encode_tag_length(length, buffer)
}

/// Writes `tag` followed by the fixed `0x82` two-byte length form at `at`.
///
/// Constructed tags whose length is only known after their contents are written
/// (`AsduSequence`, `SvPdu`, `SequenceOfAsdu`) always use this form so they can be
/// back-patched in place. Returns the number of bytes written (always 4).
pub fn write_fixed_tag_length(
    tag: SampledValueTag,
    length: u16,
    buffer: &mut [u8],
    at: usize,
) -> Result<usize, ParseError> {
    if at + 4 > buffer.len() {
        return Err(ParseError::short_buffer(
            "Fixed tag header",
            at + 4,
            buffer.len(),
        ));
    }
    buffer[at] = tag.0;
    buffer[at + 1] = 0x82;
    buffer[at + 2..at + 4].copy_from_slice(&length.to_be_bytes());
    Ok(4)
}

/// Appends `tag` with the fixed `0x82` two-byte length form.
pub fn encode_fixed_tag_header(tag: SampledValueTag, length: u16, buffer: &mut Vec<u8>) {
    buffer.push(tag.0);
    buffer.push(0x82);
    buffer.extend_from_slice(&length.to_be_bytes());
}

/// Checks that the byte at `index` is `expected` and returns the declared length.
///
/// The cursor is left on the first value byte, the value itself is not consumed.
pub fn validate_tag(
    buffer: &[u8],
    expected: SampledValueTag,
    index: &mut usize,
) -> Result<usize, ParseError> {
    let found = *buffer
        .get(*index)
        .ok_or_else(|| ParseError::short_buffer("Tag", *index + 1, buffer.len()))?;

    if found != expected.0 {
        return Err(ParseError::UnexpectedTag {
            expected,
            found,
            offset: *index,
        });
    }

    *index += 1;
    parse_tag_length(buffer, index)
}

// Shared by the fixed width parsers: validate tag, check declared length against the
// natural width and the buffer, hand back the value slice and skip the declared length.
fn take_value<'a>(
    buffer: &'a [u8],
    tag: SampledValueTag,
    minimum: usize,
    index: &mut usize,
) -> Result<&'a [u8], ParseError> {
    let length = validate_tag(buffer, tag, index)?;

    if length < minimum {
        return Err(ParseError::TagTooShort {
            tag,
            length,
            minimum,
        });
    }

    if *index + length > buffer.len() {
        return Err(ParseError::short_buffer(
            "Tag value",
            *index + length,
            buffer.len(),
        ));
    }

    let value = &buffer[*index..*index + length];
    *index += length;
    Ok(value)
}

pub fn parse_byte_tag(
    buffer: &[u8],
    tag: SampledValueTag,
    index: &mut usize,
) -> Result<u8, ParseError> {
    let value = take_value(buffer, tag, 1, index)?;
    Ok(value[0])
}

pub fn parse_u16_tag(
    buffer: &[u8],
    tag: SampledValueTag,
    index: &mut usize,
) -> Result<u16, ParseError> {
    let value = take_value(buffer, tag, 2, index)?;
    Ok(u16::from_be_bytes([value[0], value[1]]))
}

/// 24-bit big-endian value, widened to `u32`.
pub fn parse_u24_tag(
    buffer: &[u8],
    tag: SampledValueTag,
    index: &mut usize,
) -> Result<u32, ParseError> {
    let value = take_value(buffer, tag, 3, index)?;
    Ok(u32::from_be_bytes([0, value[0], value[1], value[2]]))
}

pub fn parse_u32_tag(
    buffer: &[u8],
    tag: SampledValueTag,
    index: &mut usize,
) -> Result<u32, ParseError> {
    let value = take_value(buffer, tag, 4, index)?;
    Ok(u32::from_be_bytes([value[0], value[1], value[2], value[3]]))
}

pub fn parse_u64_tag(
    buffer: &[u8],
    tag: SampledValueTag,
    index: &mut usize,
) -> Result<u64, ParseError> {
    let value = take_value(buffer, tag, 8, index)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&value[..8]);
    Ok(u64::from_be_bytes(bytes))
}

/// ASCII string value. Non-ASCII bytes are replaced rather than rejected.
pub fn parse_string_tag(
    buffer: &[u8],
    tag: SampledValueTag,
    index: &mut usize,
) -> Result<String, ParseError> {
    let value = take_value(buffer, tag, 0, index)?;
    Ok(String::from_utf8_lossy(value).into_owned())
}

/// A scalar that can be written as a sampled value tag.
///
/// Width is the primitive's natural size. `bool` is deliberately implemented as a
/// failure: there is no agreed single-byte encoding for it.
pub trait TagValue {
    fn tag_bytes(&self) -> Result<Vec<u8>, ParseError>;
}

macro_rules! impl_tag_value {
    ($($t:ty),*) => {
        $(
            impl TagValue for $t {
                fn tag_bytes(&self) -> Result<Vec<u8>, ParseError> {
                    Ok(self.to_be_bytes().to_vec())
                }
            }
        )*
    };
}

impl_tag_value!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl TagValue for bool {
    fn tag_bytes(&self) -> Result<Vec<u8>, ParseError> {
        Err(ParseError::UnsupportedType { type_name: "bool" })
    }
}

impl TagValue for str {
    fn tag_bytes(&self) -> Result<Vec<u8>, ParseError> {
        if self.len() > u16::MAX as usize {
            return Err(ParseError::ValueTooLarge { length: self.len() });
        }
        Ok(self.as_bytes().to_vec())
    }
}

impl TagValue for String {
    fn tag_bytes(&self) -> Result<Vec<u8>, ParseError> {
        self.as_str().tag_bytes()
    }
}

impl<T: TagValue + ?Sized> TagValue for Option<&T> {
    fn tag_bytes(&self) -> Result<Vec<u8>, ParseError> {
        match self {
            Some(value) => value.tag_bytes(),
            None => Ok(Vec::new()),
        }
    }
}

/// Appends `tag`, its length header and the big-endian (or ASCII) value bytes.
pub fn encode_tag_value<T: TagValue + ?Sized>(
    tag: SampledValueTag,
    value: &T,
    buffer: &mut Vec<u8>,
) -> Result<(), ParseError> {
    let bytes = value.tag_bytes()?;
    encode_tag_header(tag, bytes.len(), buffer)?;
    buffer.extend_from_slice(&bytes);
    Ok(())
}
