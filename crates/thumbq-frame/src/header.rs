//! Length-prefixed control header codec.
//!
//! A control header is a 4-byte little-endian length followed by that many
//! bytes of serialized control record:
//!
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Len (4B LE)│ Record (Len bytes, JSON) │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The same prefix lets a header and a payload share one buffer: the older
//! single-message form concatenates the payload right after the record.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::control::RequestHeader;
use crate::error::HeaderError;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Header lengths at or above this value are rejected outright.
pub const MAX_HEADER_LEN: u32 = 0x00FF_FFFF;

/// Decode a control header from the start of `bytes`.
///
/// Returns the record and the number of bytes consumed (prefix included).
/// The length field is validated against the ceiling and the buffer before
/// the record is touched, so a hostile length never drives an allocation.
pub fn decode_header<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, usize), HeaderError> {
    let region = header_region(bytes)?;
    let record = serde_json::from_slice(region).map_err(HeaderError::Malformed)?;
    Ok((record, LENGTH_PREFIX_SIZE + region.len()))
}

/// Encode a control header: length prefix followed by the record.
pub fn encode_header<T: Serialize>(record: &T) -> Result<Bytes, HeaderError> {
    let body = serde_json::to_vec(record).map_err(HeaderError::Encode)?;
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len != 0 && *len < MAX_HEADER_LEN)
        .ok_or(HeaderError::InvalidLength(body.len().min(u32::MAX as usize) as u32))?;

    let mut out = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    out.put_u32_le(len);
    out.put_slice(&body);
    Ok(out.freeze())
}

/// Check that the attached payload is exactly as long as the header says.
pub fn check_payload_length(header: &RequestHeader, actual: usize) -> Result<(), HeaderError> {
    if header.length != actual as u64 {
        return Err(HeaderError::LengthMismatch {
            declared: header.length,
            actual,
        });
    }
    Ok(())
}

/// Split a single-message buffer into its control record and the payload
/// that follows the header.
pub fn split_single<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, &[u8]), HeaderError> {
    let (record, consumed) = decode_header(bytes)?;
    Ok((record, &bytes[consumed..]))
}

/// Join a control header and a payload into one single-message buffer.
pub fn join_single(header: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header.len() + payload.len());
    out.extend_from_slice(header);
    out.extend_from_slice(payload);
    out
}

fn header_region(bytes: &[u8]) -> Result<&[u8], HeaderError> {
    if bytes.len() < LENGTH_PREFIX_SIZE {
        return Err(HeaderError::TooShort { len: bytes.len() });
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if declared == 0 || declared >= MAX_HEADER_LEN {
        return Err(HeaderError::InvalidLength(declared));
    }
    let available = bytes.len() - LENGTH_PREFIX_SIZE;
    let declared = declared as usize;
    if declared > available {
        return Err(HeaderError::Overrun {
            declared,
            available,
        });
    }
    Ok(&bytes[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + declared])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{Crop, ResponseHeader};

    #[test]
    fn decode_reports_consumed_length() {
        let header = RequestHeader::new(100).with_scale(64);
        let encoded = encode_header(&header).unwrap();

        let (decoded, consumed): (RequestHeader, usize) = decode_header(&encoded).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn too_short() {
        let err = decode_header::<RequestHeader>(&[1, 0, 0]).unwrap_err();
        assert!(matches!(err, HeaderError::TooShort { len: 3 }));
    }

    #[test]
    fn zero_length_rejected() {
        let err = decode_header::<RequestHeader>(&[0, 0, 0, 0, b'{', b'}']).unwrap_err();
        assert!(matches!(err, HeaderError::InvalidLength(0)));
    }

    #[test]
    fn ceiling_rejected_before_checking_the_buffer() {
        // Only the prefix is present: rejection must come from the ceiling,
        // not from an attempt to read 16 MiB of record.
        let err = decode_header::<RequestHeader>(&MAX_HEADER_LEN.to_le_bytes()).unwrap_err();
        assert!(matches!(err, HeaderError::InvalidLength(MAX_HEADER_LEN)));

        let err = decode_header::<RequestHeader>(&u32::MAX.to_le_bytes()).unwrap_err();
        assert!(matches!(err, HeaderError::InvalidLength(u32::MAX)));
    }

    #[test]
    fn overrun_rejected() {
        let mut bytes = 40u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{\"length\":1}");
        let err = decode_header::<RequestHeader>(&bytes).unwrap_err();
        assert!(matches!(
            err,
            HeaderError::Overrun {
                declared: 40,
                available: 12
            }
        ));
    }

    #[test]
    fn garbage_record_rejected() {
        let mut bytes = 4u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"\xff\xfe{]");
        let err = decode_header::<RequestHeader>(&bytes).unwrap_err();
        assert!(matches!(err, HeaderError::Malformed(_)));
    }

    #[test]
    fn payload_length_must_match() {
        let header = RequestHeader::new(100);
        assert!(check_payload_length(&header, 100).is_ok());
        let err = check_payload_length(&header, 50).unwrap_err();
        assert!(matches!(
            err,
            HeaderError::LengthMismatch {
                declared: 100,
                actual: 50
            }
        ));
    }

    #[test]
    fn single_message_split() {
        let header = encode_header(&RequestHeader::new(5).with_crop(Crop::TopSquare)).unwrap();
        let joined = join_single(&header, b"bytes");

        let (decoded, payload): (RequestHeader, &[u8]) = split_single(&joined).unwrap();
        assert_eq!(decoded.crop, Crop::TopSquare);
        assert_eq!(payload, b"bytes");
    }

    #[test]
    fn response_header_with_trailing_result() {
        let header = ResponseHeader {
            original_format: Some("PNG".to_string()),
            width: 16,
            height: 8,
            length: 3,
        };
        let joined = join_single(&encode_header(&header).unwrap(), b"abc");

        let (decoded, rest): (ResponseHeader, &[u8]) = split_single(&joined).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(rest, b"abc");
    }
}
