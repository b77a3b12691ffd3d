#![forbid(unsafe_code)]

use thiserror::Error;
use uuid::Uuid;

pub mod messages;

/// Largest accepted request frame, excluding the 4-byte length prefix.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Fixed-width prefix of request header v2: api_key, api_version, correlation_id.
pub const REQUEST_HEADER_MIN_BYTES: usize = 8;

pub const RESPONSE_HEADER_V0: i16 = 0;
pub const RESPONSE_HEADER_V1: i16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("request header needs at least {REQUEST_HEADER_MIN_BYTES} bytes, got {0}")]
    HeaderTooShort(usize),
    #[error("uuid must be 32 hex digits with optional dashes, got {0:?}")]
    InvalidUuid(String),
}

/// Cursor over an immutable byte slice.
///
/// Every read is total: a read that would cross the end of the slice yields
/// the type's zero value and leaves the cursor where it is, so parsers built
/// on top never panic and can keep consuming fields defensively. The cursor
/// never exceeds the slice length.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, cursor: 0 }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn can_read(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// Advance by up to `n` bytes, clamping at the end of the slice.
    pub fn skip(&mut self, n: usize) {
        self.cursor = self.cursor.saturating_add(n).min(self.buf.len());
    }

    /// Move the cursor to an absolute position, clamping at the end.
    pub fn seek(&mut self, position: usize) {
        self.cursor = position.min(self.buf.len());
    }

    pub fn read_i8(&mut self) -> i8 {
        if !self.can_read(1) {
            return 0;
        }
        let value = self.buf[self.cursor] as i8;
        self.cursor += 1;
        value
    }

    pub fn read_i16(&mut self) -> i16 {
        let Some(bytes) = self.take::<2>() else {
            return 0;
        };
        i16::from_be_bytes(bytes)
    }

    pub fn read_i32(&mut self) -> i32 {
        let Some(bytes) = self.take::<4>() else {
            return 0;
        };
        i32::from_be_bytes(bytes)
    }

    pub fn read_i64(&mut self) -> i64 {
        let Some(bytes) = self.take::<8>() else {
            return 0;
        };
        i64::from_be_bytes(bytes)
    }

    /// Kafka unsigned varint: 7 payload bits per byte LSB-first, high bit is
    /// the continuation flag, at most 5 bytes for a 32-bit value. A fifth
    /// byte whose payload exceeds 1 would overflow, so the read stops with
    /// the value accumulated so far.
    pub fn read_unsigned_varint(&mut self) -> u32 {
        let mut value = 0_u32;
        let mut shift = 0;
        for i in 0..5 {
            let Some(&byte) = self.buf.get(self.cursor) else {
                return value;
            };
            self.cursor += 1;
            if byte < 0x80 {
                if i == 4 && byte > 1 {
                    return value;
                }
                return value | (u32::from(byte) << shift);
            }
            value |= u32::from(byte & 0x7f) << shift;
            shift += 7;
        }
        value
    }

    /// Zig-zag varint, at most 10 bytes for a 64-bit value. Ten continuation
    /// bytes yield 0.
    pub fn read_signed_varint(&mut self) -> i64 {
        let mut value = 0_u64;
        let mut shift = 0;
        for _ in 0..10 {
            let Some(&byte) = self.buf.get(self.cursor) else {
                return zigzag_decode(value);
            };
            self.cursor += 1;
            if byte < 0x80 {
                return zigzag_decode(value | (u64::from(byte) << shift));
            }
            value |= u64::from(byte & 0x7f) << shift;
            shift += 7;
        }
        0
    }

    /// 16 raw bytes; `Uuid::nil()` on underflow.
    pub fn read_uuid(&mut self) -> Uuid {
        let Some(bytes) = self.take::<16>() else {
            return Uuid::nil();
        };
        Uuid::from_bytes(bytes)
    }

    /// Borrow the next `n` bytes without advancing; empty on underflow.
    pub fn peek_bytes(&self, n: usize) -> &'a [u8] {
        if !self.can_read(n) {
            return &[];
        }
        &self.buf[self.cursor..self.cursor + n]
    }

    /// Compact string: unsigned varint `L`, then `L - 1` bytes of UTF-8.
    /// Null (`L = 0`), empty, and truncated payloads all read as `""`.
    pub fn read_compact_string(&mut self) -> String {
        let length = i64::from(self.read_unsigned_varint()) - 1;
        if length <= 0 {
            return String::new();
        }
        let length = length as usize;
        if !self.can_read(length) {
            return String::new();
        }
        let raw = &self.buf[self.cursor..self.cursor + length];
        self.cursor += length;
        String::from_utf8_lossy(raw).into_owned()
    }

    /// Same encoding as `read_compact_string`, but null (`L = 0`) is
    /// reported separately from empty.
    pub fn read_compact_nullable_string(&mut self) -> Option<String> {
        let length = self.read_unsigned_varint();
        if length == 0 {
            return None;
        }
        let length = (length - 1) as usize;
        if !self.can_read(length) {
            return Some(String::new());
        }
        let raw = &self.buf[self.cursor..self.cursor + length];
        self.cursor += length;
        Some(String::from_utf8_lossy(raw).into_owned())
    }

    /// Compact bytes: unsigned varint `L`, then `L - 1` opaque bytes.
    pub fn read_compact_bytes(&mut self) -> Vec<u8> {
        let length = i64::from(self.read_unsigned_varint()) - 1;
        if length <= 0 {
            return Vec::new();
        }
        let length = length as usize;
        if !self.can_read(length) {
            return Vec::new();
        }
        let raw = self.buf[self.cursor..self.cursor + length].to_vec();
        self.cursor += length;
        raw
    }

    /// Skip a tagged-field buffer: tag count, then per tag a tag id, a
    /// declared length, and that many bytes. The declared lengths are always
    /// honored, never assumed zero.
    pub fn skip_tagged_fields(&mut self) {
        let count = self.read_unsigned_varint();
        for _ in 0..count {
            if self.remaining() == 0 {
                return;
            }
            let _tag = self.read_unsigned_varint();
            let size = self.read_unsigned_varint();
            self.skip(size as usize);
        }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        if !self.can_read(N) {
            return None;
        }
        let mut bytes = [0_u8; N];
        bytes.copy_from_slice(&self.buf[self.cursor..self.cursor + N]);
        self.cursor += N;
        Some(bytes)
    }
}

fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ (-((value & 1) as i64))
}

fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn write_i8(out: &mut Vec<u8>, value: i8) {
    out.push(value as u8);
}

pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn write_unsigned_varint(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push(((value & 0x7f) as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn write_signed_varint(out: &mut Vec<u8>, value: i64) {
    let mut raw = zigzag_encode(value);
    while raw >= 0x80 {
        out.push(((raw & 0x7f) as u8) | 0x80);
        raw >>= 7;
    }
    out.push(raw as u8);
}

pub fn write_uuid(out: &mut Vec<u8>, value: &Uuid) {
    out.extend_from_slice(value.as_bytes());
}

pub fn write_compact_string(out: &mut Vec<u8>, value: &str) {
    write_unsigned_varint(out, value.len() as u32 + 1);
    out.extend_from_slice(value.as_bytes());
}

pub fn write_compact_nullable_string(out: &mut Vec<u8>, value: Option<&str>) {
    match value {
        None => write_unsigned_varint(out, 0),
        Some(value) => write_compact_string(out, value),
    }
}

pub fn write_compact_bytes(out: &mut Vec<u8>, value: &[u8]) {
    write_unsigned_varint(out, value.len() as u32 + 1);
    out.extend_from_slice(value);
}

pub fn write_compact_i32_array(out: &mut Vec<u8>, values: &[i32]) {
    write_unsigned_varint(out, values.len() as u32 + 1);
    for value in values {
        write_i32(out, *value);
    }
}

/// Responses always emit an empty tagged-field buffer.
pub fn write_empty_tagged_fields(out: &mut Vec<u8>) {
    write_unsigned_varint(out, 0);
}

/// Parse a topic UUID from text: dashes may appear anywhere and are
/// stripped; exactly 32 hex digits must remain.
pub fn parse_uuid(input: &str) -> Result<Uuid, ProtocolError> {
    let compact: String = input.trim().chars().filter(|c| *c != '-').collect();
    if compact.len() != 32 {
        return Err(ProtocolError::InvalidUuid(input.trim().to_string()));
    }
    Uuid::try_parse(&compact).map_err(|_| ProtocolError::InvalidUuid(input.trim().to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
}

/// Decode request header v2 (flexible) from a frame payload.
///
/// Returns the fixed header fields and the offset where the request body
/// begins, after the client_id compact nullable string and the header
/// tagged-field buffer. Payloads under 8 bytes are a framing error.
pub fn parse_request_header(payload: &[u8]) -> Result<(RequestHeader, usize), ProtocolError> {
    if payload.len() < REQUEST_HEADER_MIN_BYTES {
        return Err(ProtocolError::HeaderTooShort(payload.len()));
    }
    let mut reader = Reader::new(payload);
    let api_key = reader.read_i16();
    let api_version = reader.read_i16();
    let correlation_id = reader.read_i32();
    let _client_id = reader.read_compact_nullable_string();
    reader.skip_tagged_fields();
    Ok((
        RequestHeader {
            api_key,
            api_version,
            correlation_id,
        },
        reader.position(),
    ))
}

/// Frame a response: 4-byte big-endian length covering header and body but
/// not itself, the correlation id, an empty tagged-field buffer when the
/// response header is v1, then the body.
pub fn encode_response_frame(correlation_id: i32, header_version: i16, body: &[u8]) -> Vec<u8> {
    let mut header = Vec::with_capacity(5);
    write_i32(&mut header, correlation_id);
    if header_version >= RESPONSE_HEADER_V1 {
        write_empty_tagged_fields(&mut header);
    }
    let total = header.len() + body.len();
    let mut out = Vec::with_capacity(4 + total);
    write_i32(&mut out, total as i32);
    out.extend_from_slice(&header);
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_varint_roundtrip() {
        let values = [0_u32, 1, 127, 128, 300, 16_383, 16_384, u32::MAX];
        for value in values {
            let mut encoded = Vec::new();
            write_unsigned_varint(&mut encoded, value);
            let mut reader = Reader::new(&encoded);
            assert_eq!(reader.read_unsigned_varint(), value);
            assert_eq!(reader.position(), encoded.len());
        }
    }

    #[test]
    fn unsigned_varint_known_vectors() {
        let vectors: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (300, &[0xac, 0x02]),
            (u32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        ];
        for (value, expected) in vectors {
            let mut encoded = Vec::new();
            write_unsigned_varint(&mut encoded, *value);
            assert_eq!(&encoded, expected);
        }
    }

    #[test]
    fn unsigned_varint_overflow_guard_stops_at_fifth_byte() {
        let bytes = [0xff_u8, 0xff, 0xff, 0xff, 0x7f];
        let mut reader = Reader::new(&bytes);
        // The fifth byte's payload exceeds 1, so its contribution is dropped.
        assert_eq!(reader.read_unsigned_varint(), 0x0fff_ffff);
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn unsigned_varint_truncated_returns_partial_value() {
        let bytes = [0x80_u8, 0x80];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_unsigned_varint(), 0);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn signed_varint_roundtrip() {
        let values = [0_i64, 1, -1, 63, -64, 8_192, -8_192, i64::MIN, i64::MAX];
        for value in values {
            let mut encoded = Vec::new();
            write_signed_varint(&mut encoded, value);
            let mut reader = Reader::new(&encoded);
            assert_eq!(reader.read_signed_varint(), value);
            assert_eq!(reader.position(), encoded.len());
        }
    }

    #[test]
    fn signed_varint_known_vectors_from_kafka() {
        let vectors: &[(i64, &[u8])] = &[
            (0, &[0x00]),
            (-1, &[0x01]),
            (1, &[0x02]),
            (63, &[0x7e]),
            (-64, &[0x7f]),
            (64, &[0x80, 0x01]),
            (-65, &[0x81, 0x01]),
        ];
        for (value, expected) in vectors {
            let mut encoded = Vec::new();
            write_signed_varint(&mut encoded, *value);
            assert_eq!(&encoded, expected);
        }
    }

    #[test]
    fn fixed_int_reads_are_zero_on_underflow() {
        let bytes = [0x01_u8, 0x02];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_i32(), 0);
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_i16(), 0x0102);
        assert_eq!(reader.read_i64(), 0);
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn compact_string_null_empty_and_value() {
        let mut encoded = Vec::new();
        write_unsigned_varint(&mut encoded, 0); // null
        write_compact_string(&mut encoded, ""); // empty
        write_compact_string(&mut encoded, "alpha");

        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.read_compact_nullable_string(), None);
        assert_eq!(reader.read_compact_nullable_string(), Some(String::new()));
        assert_eq!(
            reader.read_compact_nullable_string().as_deref(),
            Some("alpha")
        );
        assert_eq!(reader.position(), encoded.len());
    }

    #[test]
    fn compact_string_large_payload_roundtrip() {
        let value = "k".repeat(1 << 20);
        let mut encoded = Vec::new();
        write_compact_string(&mut encoded, &value);
        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.read_compact_string(), value);
    }

    #[test]
    fn compact_string_truncated_payload_reads_empty() {
        let mut encoded = Vec::new();
        write_unsigned_varint(&mut encoded, 11); // declares 10 payload bytes
        encoded.extend_from_slice(b"abc");
        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.read_compact_string(), "");
        // Cursor stays just past the length prefix.
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn compact_bytes_roundtrip() {
        let mut encoded = Vec::new();
        write_compact_bytes(&mut encoded, b"\x00\x01\x02");
        write_compact_bytes(&mut encoded, b"");
        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.read_compact_bytes(), vec![0, 1, 2]);
        assert_eq!(reader.read_compact_bytes(), Vec::<u8>::new());
    }

    #[test]
    fn tagged_fields_with_payloads_are_skipped() {
        let mut encoded = Vec::new();
        write_unsigned_varint(&mut encoded, 2); // two tags
        write_unsigned_varint(&mut encoded, 0); // tag id
        write_unsigned_varint(&mut encoded, 3); // declared length
        encoded.extend_from_slice(&[0xaa, 0xbb, 0xcc]);
        write_unsigned_varint(&mut encoded, 7);
        write_unsigned_varint(&mut encoded, 1);
        encoded.push(0xdd);
        write_i16(&mut encoded, 0x1234);

        let mut reader = Reader::new(&encoded);
        reader.skip_tagged_fields();
        assert_eq!(reader.read_i16(), 0x1234);
    }

    #[test]
    fn tagged_fields_truncated_buffer_stays_in_bounds() {
        // Claims 200 tags but holds almost nothing.
        let bytes = [0xc8_u8, 0x01, 0x00];
        let mut reader = Reader::new(&bytes);
        reader.skip_tagged_fields();
        assert!(reader.position() <= bytes.len());
    }

    #[test]
    fn uuid_read_and_parse() {
        let id = parse_uuid("11111111-2222-3333-4444-555555555555").expect("parse uuid");
        let mut encoded = Vec::new();
        write_uuid(&mut encoded, &id);
        assert_eq!(encoded.len(), 16);
        let mut reader = Reader::new(&encoded);
        assert_eq!(reader.read_uuid(), id);

        let undashed = parse_uuid("11111111222233334444555555555555").expect("parse undashed");
        assert_eq!(undashed, id);
        let odd_dashes = parse_uuid("1111-11112222-33334444555555555555").expect("odd dashes");
        assert_eq!(odd_dashes, id);

        assert!(parse_uuid("not-a-uuid").is_err());
        assert!(parse_uuid("11111111222233334444").is_err());
        assert!(parse_uuid("g1111111222233334444555555555555").is_err());
    }

    #[test]
    fn uuid_read_underflow_is_nil() {
        let bytes = [0_u8; 5];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_uuid(), Uuid::nil());
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn request_header_parse() {
        // api_key=18, api_version=4, correlation_id=7, null client_id, no tags.
        let payload = [0x00, 0x12, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07, 0x00, 0x00];
        let (header, body_offset) = parse_request_header(&payload).expect("parse header");
        assert_eq!(
            header,
            RequestHeader {
                api_key: 18,
                api_version: 4,
                correlation_id: 7,
            }
        );
        assert_eq!(body_offset, payload.len());
    }

    #[test]
    fn request_header_with_client_id_and_tags() {
        let mut payload = Vec::new();
        write_i16(&mut payload, 75);
        write_i16(&mut payload, 0);
        write_i32(&mut payload, -1);
        write_compact_nullable_string(&mut payload, Some("kfk-cli"));
        write_unsigned_varint(&mut payload, 1); // one tagged field
        write_unsigned_varint(&mut payload, 0); // tag id
        write_unsigned_varint(&mut payload, 4); // declared length
        payload.extend_from_slice(&[1, 2, 3, 4]);
        payload.push(0x42); // first body byte

        let (header, body_offset) = parse_request_header(&payload).expect("parse header");
        assert_eq!(header.api_key, 75);
        assert_eq!(header.correlation_id, -1);
        assert_eq!(payload[body_offset], 0x42);
    }

    #[test]
    fn request_header_too_short() {
        let err = parse_request_header(&[0x00, 0x12, 0x00]).expect_err("short header");
        assert_eq!(err, ProtocolError::HeaderTooShort(3));
    }

    #[test]
    fn response_frame_length_covers_header_and_body() {
        let body = [0xde_u8, 0xad, 0xbe, 0xef];
        let v0 = encode_response_frame(7, RESPONSE_HEADER_V0, &body);
        assert_eq!(v0.len(), 4 + 4 + body.len());
        assert_eq!(&v0[..4], &(8_i32).to_be_bytes());
        assert_eq!(&v0[4..8], &(7_i32).to_be_bytes());

        let v1 = encode_response_frame(7, RESPONSE_HEADER_V1, &body);
        assert_eq!(v1.len(), 4 + 5 + body.len());
        assert_eq!(&v1[..4], &(9_i32).to_be_bytes());
        assert_eq!(v1[8], 0x00); // empty header tag buffer
    }

    #[test]
    fn reads_on_arbitrary_slices_never_escape_bounds() {
        let samples: &[&[u8]] = &[
            &[],
            &[0x00],
            &[0xff],
            &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
            &[0x80, 0x80, 0x80],
            &[0x05, 0x61, 0x62],
        ];
        for sample in samples {
            let mut reader = Reader::new(sample);
            let _ = reader.read_i8();
            let _ = reader.read_i16();
            let _ = reader.read_i32();
            let _ = reader.read_i64();
            let _ = reader.read_unsigned_varint();
            let _ = reader.read_signed_varint();
            let _ = reader.read_compact_string();
            let _ = reader.read_compact_nullable_string();
            let _ = reader.read_compact_bytes();
            let _ = reader.read_uuid();
            reader.skip_tagged_fields();
            assert!(reader.position() <= sample.len());
        }
    }
}
