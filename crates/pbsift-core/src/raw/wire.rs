//! Low-level protobuf wire format parsing.
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 3/4: SGROUP/EGROUP (deprecated groups)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_VALID_NUMBER: u32 = 536_870_911;

/// Groups nested deeper than this are rejected
pub const MAX_GROUP_DEPTH: usize = 64;

/// A field value as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// Wire type 0
    Varint(u64),
    /// Wire type 1
    Fixed64(u64),
    /// Wire type 2, the payload bytes without the length prefix
    Len(Vec<u8>),
    /// Wire types 3..4, the fields between the group markers
    Group(Vec<RawField>),
    /// Wire type 5
    Fixed32(u32),
}

/// One field of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    /// Field number
    pub number: u32,
    /// Decoded value
    pub value: RawValue,
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// Decode a field tag into its number and wire type
fn decode_tag(data: &[u8], offset: usize) -> Result<(u32, WireType, usize)> {
    let (tag, tag_len) = decode_varint(data)
        .map_err(|_| Error::invalid_wire_format(offset, "failed to decode field tag"))?;

    let wire_type = WireType::try_from((tag & 0x07) as u8)
        .map_err(|_| Error::invalid_wire_format(offset, format!("unknown wire type in tag {}", tag)))?;
    let field_number = tag >> 3;

    if field_number == 0 || field_number > MAX_VALID_NUMBER as u64 {
        return Err(Error::invalid_wire_format(
            offset,
            format!("invalid field number {}", field_number),
        ));
    }

    Ok((field_number as u32, wire_type, tag_len))
}

fn take(data: &[u8], at: usize, len: usize, offset: usize, what: &str) -> Result<Vec<u8>> {
    at.checked_add(len)
        .and_then(|end| data.get(at..end))
        .map(<[u8]>::to_vec)
        .ok_or_else(|| {
            Error::invalid_wire_format(
                offset,
                format!(
                    "not enough bytes for {} (need {}, have {})",
                    what,
                    len,
                    data.len().saturating_sub(at)
                ),
            )
        })
}

/// Parse fields from `data` until it is exhausted, or until the end-group
/// marker for `group` is reached. Returns the fields and bytes consumed.
fn parse_until(
    data: &[u8],
    base: usize,
    group: Option<u32>,
    depth: usize,
) -> Result<(Vec<RawField>, usize)> {
    if depth > MAX_GROUP_DEPTH {
        return Err(Error::invalid_wire_format(base, "groups nested too deeply"));
    }

    let mut fields = Vec::new();
    let mut position = 0;

    while position < data.len() {
        let offset = base + position;
        let (number, wire_type, tag_len) = decode_tag(&data[position..], offset)?;
        let start = position + tag_len;

        let (value, consumed) = match wire_type {
            WireType::Varint => {
                let (value, len) = decode_varint(&data[start..])
                    .map_err(|_| Error::invalid_wire_format(offset, "failed to decode varint value"))?;
                (RawValue::Varint(value), len)
            }
            WireType::I64 => {
                let bytes = take(data, start, 8, offset, "I64")?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                (RawValue::Fixed64(u64::from_le_bytes(buf)), 8)
            }
            WireType::I32 => {
                let bytes = take(data, start, 4, offset, "I32")?;
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                (RawValue::Fixed32(u32::from_le_bytes(buf)), 4)
            }
            WireType::Len => {
                let (length, prefix_len) = decode_varint(&data[start..])
                    .map_err(|_| Error::invalid_wire_format(offset, "failed to decode length prefix"))?;
                let length = usize::try_from(length)
                    .map_err(|_| Error::invalid_wire_format(offset, "length prefix overflows"))?;
                let payload = take(data, start + prefix_len, length, offset, "LEN field")?;
                (RawValue::Len(payload), prefix_len + length)
            }
            WireType::StartGroup => {
                let (inner, len) =
                    parse_until(&data[start..], base + start, Some(number), depth + 1)?;
                (RawValue::Group(inner), len)
            }
            WireType::EndGroup => {
                if group == Some(number) {
                    return Ok((fields, start));
                }
                return Err(Error::invalid_wire_format(
                    offset,
                    format!("unexpected end of group {}", number),
                ));
            }
        };

        fields.push(RawField { number, value });
        position = start + consumed;
    }

    if let Some(number) = group {
        return Err(Error::invalid_wire_format(
            base + position,
            format!("group {} is never closed", number),
        ));
    }

    Ok((fields, position))
}

/// Parse a complete message into its raw fields.
///
/// Fails unless every byte of `data` belongs to a well-formed field.
pub fn parse_fields(data: &[u8]) -> Result<Vec<RawField>> {
    parse_until(data, 0, None, 0).map(|(fields, _)| fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_varint_single_byte() {
        let data = [0x08]; // Value 8
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 8);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xAC, 0x02]; // Value 300
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_decode_varint_max() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(len, 10);
    }

    #[test]
    fn test_decode_varint_truncated() {
        assert!(decode_varint(&[0x80, 0x80]).is_err());
        assert!(decode_varint(&[]).is_err());
    }

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::I32);
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_parse_mixed_fields() {
        // 1: 150, 2: "hi", 3: fixed32 1, 4: fixed64 2
        let data = [
            0x08, 0x96, 0x01, //
            0x12, 0x02, b'h', b'i', //
            0x1D, 0x01, 0x00, 0x00, 0x00, //
            0x21, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let fields = parse_fields(&data).unwrap();
        assert_eq!(
            fields,
            vec![
                RawField { number: 1, value: RawValue::Varint(150) },
                RawField { number: 2, value: RawValue::Len(b"hi".to_vec()) },
                RawField { number: 3, value: RawValue::Fixed32(1) },
                RawField { number: 4, value: RawValue::Fixed64(2) },
            ]
        );
    }

    #[test]
    fn test_parse_group() {
        // 1: group { 2: 1 }
        let data = [0x0B, 0x10, 0x01, 0x0C];
        let fields = parse_fields(&data).unwrap();
        assert_eq!(
            fields,
            vec![RawField {
                number: 1,
                value: RawValue::Group(vec![RawField { number: 2, value: RawValue::Varint(1) }]),
            }]
        );

        assert!(parse_fields(&[0x0B, 0x10, 0x01]).is_err());
        assert!(parse_fields(&[0x0C]).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        // Field 0 is invalid
        assert!(parse_fields(&[0x00, 0x01]).is_err());
        // LEN longer than the buffer
        assert!(parse_fields(&[0x0A, 0x05, b'h']).is_err());
        // wire type 7
        assert!(parse_fields(&[0x0F]).is_err());
        assert_eq!(parse_fields(&[]).unwrap(), vec![]);
    }
}
