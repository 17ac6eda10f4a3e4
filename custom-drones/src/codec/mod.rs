// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Data buffer codec
//!
//! Every custom drone persists into one fixed-capacity buffer. The first
//! [`HEADER_SIZE`] bytes hold fields every drone shares; the rest belongs to
//! the concrete behavior and is written through a hook that receives a cursor
//! positioned exactly at [`HEADER_SIZE`].
//!
//! # Layout
//!
//! ```text
//! offset  size  field
//!      0     4  type tag (u32)
//!      4     8  owner (u64)
//!     12     4  health fraction (f32)
//!     16    12  position x, y, z (f32 x3)
//!     28    12  rotation x, y, z in degrees (f32 x3)
//!     40    40  identifier, ASCII, at most 32 bytes, NUL padded
//!     80   176  behavior payload
//! ```
//!
//! All numbers are little-endian.
//!
//! # Example
//!
//! ```
//! use custom_drones::codec::{self, Header, HEADER_SIZE};
//!
//! let mut header = Header::new(0xDEAD_BEEF);
//! header.identifier = "scout".to_string();
//!
//! let bytes = codec::encode(&header, |payload| payload.write_u32(7)).unwrap();
//! let (decoded, mut payload) = codec::decode(&bytes).unwrap();
//! assert_eq!(decoded, header);
//! assert_eq!(payload.position(), HEADER_SIZE);
//! assert_eq!(payload.read_u32().unwrap(), 7);
//! ```

mod cursor;
mod header;

pub use cursor::{PayloadReader, PayloadWriter};
pub use header::{sanitize_identifier, Header, Vec3};

use crate::error::CodecError;

/// Total capacity of one data buffer
pub const BUFFER_CAPACITY: usize = 256;

/// Size of the shared header; payload hooks start here
pub const HEADER_SIZE: usize = 80;

/// Bytes available to a behavior payload
pub const PAYLOAD_CAPACITY: usize = BUFFER_CAPACITY - HEADER_SIZE;

/// Longest identifier the header can hold
pub const IDENTIFIER_MAX: usize = 32;

const IDENTIFIER_OFFSET: usize = 40;

/// Encode a header and a behavior payload into a fresh buffer
///
/// The identifier is passed through [`sanitize_identifier`], so overlong or
/// non-ASCII identifiers are silently shortened rather than rejected.
pub fn encode<F>(header: &Header, extra_writer: F) -> Result<[u8; BUFFER_CAPACITY], CodecError>
where
    F: FnOnce(&mut PayloadWriter<'_>) -> Result<(), CodecError>,
{
    let mut buf = [0u8; BUFFER_CAPACITY];
    {
        let mut writer = PayloadWriter::at(&mut buf, 0);
        writer.write_u32(header.type_tag)?;
        writer.write_u64(header.owner)?;
        writer.write_f32(header.health)?;
        writer.write_vec3(header.position)?;
        writer.write_vec3(header.rotation)?;
        debug_assert_eq!(writer.position(), IDENTIFIER_OFFSET);
        writer.write_bytes(sanitize_identifier(&header.identifier).as_bytes())?;
    }

    let mut payload = PayloadWriter::at(&mut buf, HEADER_SIZE);
    extra_writer(&mut payload)?;
    Ok(buf)
}

/// Decode the header of `bytes` and return a reader positioned at the payload
///
/// Fails without producing a partial header when the buffer is shorter than
/// [`HEADER_SIZE`].
pub fn decode(bytes: &[u8]) -> Result<(Header, PayloadReader<'_>), CodecError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::BufferTooShort {
            len: bytes.len(),
            required: HEADER_SIZE,
        });
    }

    let mut reader = PayloadReader::at(bytes, 0);
    let type_tag = reader.read_u32()?;
    let owner = reader.read_u64()?;
    let health = reader.read_f32()?;
    let position = reader.read_vec3()?;
    let rotation = reader.read_vec3()?;

    let region = reader.read_bytes(HEADER_SIZE - IDENTIFIER_OFFSET)?;
    let end = region.iter().position(|b| *b == 0).unwrap_or(region.len());
    let raw_identifier = &region[..end.min(IDENTIFIER_MAX)];
    if !raw_identifier.is_ascii() {
        return Err(CodecError::InvalidIdentifier);
    }
    let identifier = String::from_utf8_lossy(raw_identifier).into_owned();

    let header = Header {
        type_tag,
        owner,
        health,
        position,
        rotation,
        identifier,
    };
    Ok((header, PayloadReader::at(bytes, HEADER_SIZE)))
}

/// Decode only the type tag, for scans that never need the rest
pub fn peek_type_tag(bytes: &[u8]) -> Result<u32, CodecError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::BufferTooShort {
            len: bytes.len(),
            required: HEADER_SIZE,
        });
    }
    PayloadReader::at(bytes, 0).read_u32()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            type_tag: 0x1234_5678,
            owner: 76561198000000000,
            health: 0.75,
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::new(0.0, 90.0, 180.0),
            identifier: "DRONE-7".to_string(),
        }
    }

    #[test]
    fn test_header_offsets() {
        let bytes = encode(&sample_header(), |_| Ok(())).unwrap();
        assert_eq!(&bytes[0..4], &0x1234_5678u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &76561198000000000u64.to_le_bytes());
        assert_eq!(&bytes[12..16], &0.75f32.to_le_bytes());
        assert_eq!(&bytes[16..20], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[28..32], &0.0f32.to_le_bytes());
        assert_eq!(&bytes[32..36], &90.0f32.to_le_bytes());
        assert_eq!(&bytes[40..47], b"DRONE-7");
        assert!(bytes[47..80].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_roundtrip_with_payload() {
        let header = sample_header();
        let bytes = encode(&header, |w| {
            assert_eq!(w.position(), HEADER_SIZE);
            w.write_bool(true)?;
            w.write_f32(12.5)
        })
        .unwrap();

        let (decoded, mut reader) = decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(reader.position(), HEADER_SIZE);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_f32().unwrap(), 12.5);
    }

    #[test]
    fn test_decode_short_buffer_fails() {
        let err = decode(&[0u8; 79]).unwrap_err();
        assert_eq!(err, CodecError::BufferTooShort { len: 79, required: 80 });
    }

    #[test]
    fn test_decode_header_only_buffer() {
        let bytes = encode(&sample_header(), |_| Ok(())).unwrap();
        let (decoded, reader) = decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(decoded.identifier, "DRONE-7");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_long_identifier_truncated() {
        let mut header = sample_header();
        header.identifier = "A".repeat(50);
        let bytes = encode(&header, |_| Ok(())).unwrap();
        let (decoded, _) = decode(&bytes).unwrap();
        assert_eq!(decoded.identifier, "A".repeat(IDENTIFIER_MAX));
    }

    #[test]
    fn test_payload_cannot_exceed_capacity() {
        let result = encode(&sample_header(), |w| w.write_bytes(&[1u8; PAYLOAD_CAPACITY + 1]));
        assert!(matches!(result, Err(CodecError::PayloadOverflow { offset: 80, .. })));

        let full = encode(&sample_header(), |w| w.write_bytes(&[1u8; PAYLOAD_CAPACITY]));
        assert!(full.is_ok());
    }

    #[test]
    fn test_non_ascii_identifier_rejected_on_decode() {
        let mut bytes = encode(&sample_header(), |_| Ok(())).unwrap();
        bytes[40] = 0xC3;
        assert_eq!(decode(&bytes).unwrap_err(), CodecError::InvalidIdentifier);
    }

    #[test]
    fn test_peek_type_tag() {
        let bytes = encode(&sample_header(), |_| Ok(())).unwrap();
        assert_eq!(peek_type_tag(&bytes).unwrap(), 0x1234_5678);
        assert!(peek_type_tag(&bytes[..10]).is_err());
    }
}
