//! HTTP/2 frame encoding and decoding
//!
//! The codec maps between typed [`Frame`] values and their wire form.
//! Every decoder is bounded by the `length` field of the header: it
//! consumes exactly that many payload bytes or fails with a
//! `FrameSize` error.

use super::error::{Error, ErrorCode, Result};
use super::frames::*;
use super::settings::Settings;
use crate::http::transport::read_full;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{Read, Write};

pub use super::frames::FRAME_HEADER_SIZE;

/// Maximum frame payload size (16MB - 1)
pub const MAX_FRAME_SIZE: u32 = MAX_FRAME_LENGTH;

/// Payload limit until SETTINGS_MAX_FRAME_SIZE raises it
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// Frame codec for encoding/decoding HTTP/2 frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Largest payload accepted by the decoder
    max_frame_size: u32,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        FrameCodec {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a codec accepting payloads up to `max_frame_size`
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        FrameCodec {
            max_frame_size: max_frame_size.min(MAX_FRAME_SIZE),
        }
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size.min(MAX_FRAME_SIZE);
    }

    /// Encode a frame header
    pub fn encode_header(header: &FrameHeader) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        let length = header.length & MAX_FRAME_LENGTH;
        bytes[0] = ((length >> 16) & 0xFF) as u8;
        bytes[1] = ((length >> 8) & 0xFF) as u8;
        bytes[2] = (length & 0xFF) as u8;

        bytes[3] = header.raw_type;
        bytes[4] = header.flags.as_u8();

        // Stream ID (31 bits, reserved bit is 0)
        bytes[5..9].copy_from_slice(&(header.stream_id & STREAM_ID_MASK).to_be_bytes());

        bytes
    }

    /// Decode a frame header
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
        let length = ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32);

        // Stream ID (31 bits, ignore reserved bit)
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & STREAM_ID_MASK;

        FrameHeader {
            length,
            raw_type: bytes[3],
            flags: FrameFlags::from_u8(bytes[4]),
            stream_id,
        }
    }

    /// Append the wire form of `frame` to `dst`
    ///
    /// The length field is recomputed from the payload.
    pub fn encode(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
        let kind = frame.kind();
        let length = kind.payload_len();
        if length > MAX_FRAME_LENGTH as usize {
            return Err(Error::FrameSize(format!(
                "{} payload of {} bytes exceeds 24-bit length",
                kind.frame_type().name(),
                length
            )));
        }

        let header = FrameHeader::new(
            length as u32,
            kind.frame_type(),
            frame.flags(),
            frame.stream_id(),
        );
        dst.reserve(FRAME_HEADER_SIZE + length);
        dst.put_slice(&Self::encode_header(&header));

        match kind {
            FrameKind::Data(f) => {
                put_pad_length(dst, f.pad_length);
                dst.put_slice(&f.data);
                put_padding(dst, f.pad_length);
            }
            FrameKind::Headers(f) => {
                put_pad_length(dst, f.pad_length);
                if let Some(priority) = &f.priority {
                    put_priority(dst, priority);
                }
                dst.put_slice(&f.header_block);
                put_padding(dst, f.pad_length);
            }
            FrameKind::Priority(f) => put_priority(dst, &f.priority),
            FrameKind::RstStream(f) => dst.put_u32(f.error_code.as_u32()),
            FrameKind::Settings(f) => f.settings.encode_payload(dst),
            FrameKind::PushPromise(f) => {
                put_pad_length(dst, f.pad_length);
                dst.put_u32(f.promised_stream_id & STREAM_ID_MASK);
                dst.put_slice(&f.header_block);
                put_padding(dst, f.pad_length);
            }
            FrameKind::Ping(f) => dst.put_slice(&f.data),
            FrameKind::Goaway(f) => {
                dst.put_u32(f.last_stream_id & STREAM_ID_MASK);
                dst.put_u32(f.error_code.as_u32());
                dst.put_slice(&f.debug_data);
            }
            FrameKind::WindowUpdate(f) => dst.put_u32(f.increment & STREAM_ID_MASK),
            FrameKind::Continuation(f) => dst.put_slice(&f.header_block),
        }

        Ok(())
    }

    /// Encode a single frame into a fresh buffer
    pub fn encode_to_bytes(frame: &Frame) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.kind().payload_len());
        Self::encode(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode the payload belonging to `header`
    ///
    /// `payload` must hold exactly `header.length` bytes.
    pub fn decode(header: FrameHeader, payload: Bytes) -> Result<Frame> {
        if payload.len() != header.length as usize {
            return Err(Error::FrameSize(format!(
                "declared length {} but {} payload bytes",
                header.length,
                payload.len()
            )));
        }

        let frame_type = header
            .frame_type()
            .ok_or(Error::InvalidFrameType(header.raw_type))?;
        let flags = header.flags;
        let mut p = payload;

        let kind = match frame_type {
            FrameType::Data => {
                let pad_length = strip_padding(flags, &mut p, 0)?;
                FrameKind::Data(DataFrame { data: p, pad_length })
            }
            FrameType::Headers => {
                let fixed = if flags.is_priority() { PRIORITY_BLOCK_SIZE } else { 0 };
                let pad_length = strip_padding(flags, &mut p, fixed)?;
                let priority = if flags.is_priority() {
                    if p.len() < PRIORITY_BLOCK_SIZE {
                        return Err(Error::FrameSize(format!(
                            "HEADERS with PRIORITY has only {} bytes",
                            p.len()
                        )));
                    }
                    Some(get_priority(&mut p))
                } else {
                    None
                };
                FrameKind::Headers(HeadersFrame {
                    header_block: p,
                    priority,
                    pad_length,
                })
            }
            FrameType::Priority => {
                expect_len(frame_type, &p, PRIORITY_BLOCK_SIZE)?;
                FrameKind::Priority(PriorityFrame {
                    priority: get_priority(&mut p),
                })
            }
            FrameType::RstStream => {
                expect_len(frame_type, &p, 4)?;
                FrameKind::RstStream(RstStreamFrame {
                    error_code: ErrorCode::from_wire(p.get_u32()),
                })
            }
            FrameType::Settings => {
                if flags.is_ack() && !p.is_empty() {
                    return Err(Error::FrameSize(format!(
                        "SETTINGS ACK with {} payload bytes",
                        p.len()
                    )));
                }
                FrameKind::Settings(SettingsFrame {
                    settings: Settings::decode_payload(&p)?,
                })
            }
            FrameType::PushPromise => {
                let pad_length = strip_padding(flags, &mut p, 4)?;
                if p.len() < 4 {
                    return Err(Error::FrameSize(format!(
                        "PUSH_PROMISE has only {} bytes",
                        p.len()
                    )));
                }
                let promised_stream_id = p.get_u32() & STREAM_ID_MASK;
                FrameKind::PushPromise(PushPromiseFrame {
                    promised_stream_id,
                    header_block: p,
                    pad_length,
                })
            }
            FrameType::Ping => {
                expect_len(frame_type, &p, 8)?;
                let mut data = [0u8; 8];
                p.copy_to_slice(&mut data);
                FrameKind::Ping(PingFrame { data })
            }
            FrameType::Goaway => {
                if p.len() < 8 {
                    return Err(Error::FrameSize(format!("GOAWAY has only {} bytes", p.len())));
                }
                let last_stream_id = p.get_u32() & STREAM_ID_MASK;
                let error_code = ErrorCode::from_wire(p.get_u32());
                FrameKind::Goaway(GoawayFrame {
                    last_stream_id,
                    error_code,
                    debug_data: p,
                })
            }
            FrameType::WindowUpdate => {
                expect_len(frame_type, &p, 4)?;
                FrameKind::WindowUpdate(WindowUpdateFrame {
                    increment: p.get_u32() & STREAM_ID_MASK,
                })
            }
            FrameType::Continuation => FrameKind::Continuation(ContinuationFrame { header_block: p }),
        };

        Ok(Frame::from_parts(header, kind))
    }

    /// Pull one complete frame off the front of `src`
    ///
    /// Returns `Ok(None)` until a whole frame is buffered. Frames of
    /// unknown type are consumed and skipped.
    pub fn parse(&self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            if src.len() < FRAME_HEADER_SIZE {
                return Ok(None);
            }

            let mut raw = [0u8; FRAME_HEADER_SIZE];
            raw.copy_from_slice(&src[..FRAME_HEADER_SIZE]);
            let header = Self::decode_header(&raw);
            self.check_length(&header)?;

            let total = FRAME_HEADER_SIZE + header.length as usize;
            if src.len() < total {
                return Ok(None);
            }

            src.advance(FRAME_HEADER_SIZE);
            let payload = src.split_to(header.length as usize).freeze();
            if header.frame_type().is_none() {
                continue;
            }
            return Self::decode(header, payload).map(Some);
        }
    }

    /// Read one frame from a blocking byte source
    ///
    /// Frames of unknown type are read and discarded. An over-long
    /// frame is rejected from its header, before the payload is read.
    pub fn read_frame<R: Read>(&self, reader: &mut R) -> Result<Frame> {
        loop {
            let mut raw = [0u8; FRAME_HEADER_SIZE];
            read_full(reader, &mut raw)?;
            let header = Self::decode_header(&raw);
            self.check_length(&header)?;

            let mut payload = vec![0u8; header.length as usize];
            if !payload.is_empty() {
                read_full(reader, &mut payload)?;
            }

            if header.frame_type().is_none() {
                continue;
            }
            return Self::decode(header, Bytes::from(payload));
        }
    }

    /// Write a frame to a writer (generic over any Write)
    pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
        let bytes = Self::encode_to_bytes(frame)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Write several frames with a single flush
    pub fn write_frames<W: Write>(writer: &mut W, frames: &[Frame]) -> Result<()> {
        let mut buf = BytesMut::new();
        for frame in frames {
            Self::encode(frame, &mut buf)?;
        }
        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(())
    }

    fn check_length(&self, header: &FrameHeader) -> Result<()> {
        if header.length > self.max_frame_size {
            return Err(Error::FrameSize(format!(
                "Frame payload too large: {} > {}",
                header.length, self.max_frame_size
            )));
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn put_pad_length(dst: &mut BytesMut, pad_length: Option<u8>) {
    if let Some(pad) = pad_length {
        dst.put_u8(pad);
    }
}

fn put_padding(dst: &mut BytesMut, pad_length: Option<u8>) {
    if let Some(pad) = pad_length {
        dst.put_bytes(0, pad as usize);
    }
}

fn put_priority(dst: &mut BytesMut, priority: &PrioritySpec) {
    dst.put_u32(priority.dependency_word());
    dst.put_u8(priority.wire_weight());
}

fn get_priority(p: &mut Bytes) -> PrioritySpec {
    let dependency = p.get_u32();
    let weight = p.get_u8();
    PrioritySpec::from_wire(dependency, weight)
}

fn expect_len(frame_type: FrameType, p: &Bytes, expected: usize) -> Result<()> {
    if p.len() != expected {
        return Err(Error::FrameSize(format!(
            "{} payload must be {} bytes, got {}",
            frame_type.name(),
            expected,
            p.len()
        )));
    }
    Ok(())
}

/// Remove the pad-length byte and trailing padding
///
/// `fixed` is the size of the fields that sit between the pad-length byte
/// and the variable data; padding may not eat into them.
fn strip_padding(flags: FrameFlags, p: &mut Bytes, fixed: usize) -> Result<Option<u8>> {
    if !flags.is_padded() {
        return Ok(None);
    }
    if p.is_empty() {
        return Err(Error::FrameSize("PADDED frame without pad length".to_string()));
    }

    let pad = p.get_u8();
    let available = p.len().checked_sub(fixed).ok_or_else(|| {
        Error::FrameSize(format!("padded payload of {} bytes too short", p.len() + 1))
    })?;
    if pad as usize > available {
        return Err(Error::FrameSize(format!(
            "pad length {} exceeds remaining {} bytes",
            pad, available
        )));
    }

    p.truncate(p.len() - pad as usize);
    Ok(Some(pad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::settings::SettingsBuilder;
    use std::io::Cursor;

    fn decode_bytes(bytes: &[u8]) -> Result<Frame> {
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        raw.copy_from_slice(&bytes[..FRAME_HEADER_SIZE]);
        let header = FrameCodec::decode_header(&raw);
        FrameCodec::decode(header, Bytes::copy_from_slice(&bytes[FRAME_HEADER_SIZE..]))
    }

    #[test]
    fn test_encode_decode_header() {
        let header = FrameHeader {
            length: 1234,
            raw_type: FrameType::Headers.as_u8(),
            flags: FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS),
            stream_id: 42,
        };

        let bytes = FrameCodec::encode_header(&header);
        assert_eq!(FrameCodec::decode_header(&bytes), header);
    }

    #[test]
    fn test_decode_header_masks_reserved_bit() {
        let bytes = [0, 0, 0, 0x0, 0, 0x80, 0, 0, 0x05];
        assert_eq!(FrameCodec::decode_header(&bytes).stream_id, 5);
    }

    #[test]
    fn test_encode_data_frame() {
        let frame = Frame::data(1, Bytes::from("Hello"), true);
        let encoded = FrameCodec::encode_to_bytes(&frame).unwrap();

        assert_eq!(encoded[0..3], [0, 0, 5]); // Length = 5
        assert_eq!(encoded[3], FrameType::Data.as_u8());
        assert_eq!(encoded[4], FrameFlags::END_STREAM);
        assert_eq!(&encoded[5..9], &[0, 0, 0, 1]); // Stream ID = 1
        assert_eq!(&encoded[9..], b"Hello");
    }

    #[test]
    fn test_encode_data_frame_with_padding() {
        let frame = Frame::data(1, Bytes::from("Hi"), false).with_padding(10);
        let encoded = FrameCodec::encode_to_bytes(&frame).unwrap();

        // 1 (pad length) + 2 (data) + 10 (padding) = 13
        assert_eq!(encoded[0..3], [0, 0, 13]);
        assert_eq!(encoded[4] & FrameFlags::PADDED, FrameFlags::PADDED);
        assert_eq!(encoded[9], 10);
        assert_eq!(&encoded[10..12], b"Hi");
        assert_eq!(&encoded[12..22], &[0u8; 10]);

        let decoded = decode_bytes(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_zero_padding_is_valid() {
        // length 1: only the pad-length byte, pad_length 0
        let bytes = [0, 0, 1, 0x0, FrameFlags::PADDED, 0, 0, 0, 1, 0];
        let frame = decode_bytes(&bytes).unwrap();
        match frame.kind() {
            FrameKind::Data(f) => {
                assert!(f.data.is_empty());
                assert_eq!(f.pad_length, Some(0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_padding_longer_than_payload() {
        // pad_length 3 with length 3
        let bytes = [0, 0, 3, 0x0, FrameFlags::PADDED, 0, 0, 0, 1, 3, 0, 0];
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameSize(_))));

        // PADDED with no payload at all
        let bytes = [0, 0, 0, 0x0, FrameFlags::PADDED, 0, 0, 0, 1];
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameSize(_))));
    }

    #[test]
    fn test_headers_priority_too_short() {
        let bytes = [0, 0, 4, 0x1, FrameFlags::PRIORITY, 0, 0, 0, 1, 0, 0, 0, 0];
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameSize(_))));
    }

    #[test]
    fn test_fixed_size_frames() {
        // PING with 7 bytes
        let bytes = [0, 0, 7, 0x6, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7];
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameSize(_))));

        // RST_STREAM with 3 bytes
        let bytes = [0, 0, 3, 0x3, 0, 0, 0, 0, 1, 0, 0, 1];
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameSize(_))));

        // SETTINGS ACK with payload
        let bytes = [0, 0, 6, 0x4, FrameFlags::ACK, 0, 0, 0, 0, 0, 1, 0, 0, 0x10, 0];
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameSize(_))));

        // GOAWAY shorter than 8
        let bytes = [0, 0, 4, 0x7, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        assert!(matches!(decode_bytes(&bytes), Err(Error::FrameSize(_))));
    }

    #[test]
    fn test_encode_settings_frame() {
        let settings = SettingsBuilder::new()
            .header_table_size(8192)
            .enable_push(false)
            .initial_window_size(65535)
            .build()
            .unwrap();

        let encoded = FrameCodec::encode_to_bytes(&Frame::settings(settings)).unwrap();

        assert_eq!(encoded[3], FrameType::Settings.as_u8());
        assert_eq!(&encoded[5..9], &[0, 0, 0, 0]); // Stream ID must be 0
        assert_eq!(encoded[0..3], [0, 0, 18]); // 3 settings * 6 bytes
    }

    #[test]
    fn test_encode_settings_ack() {
        let encoded = FrameCodec::encode_to_bytes(&Frame::settings_ack()).unwrap();
        assert_eq!(encoded[0..3], [0, 0, 0]);
        assert_eq!(encoded[4], FrameFlags::ACK);
    }

    #[test]
    fn test_encode_window_update() {
        let encoded = FrameCodec::encode_to_bytes(&Frame::window_update(42, 1000)).unwrap();

        assert_eq!(encoded[0..3], [0, 0, 4]);
        assert_eq!(encoded[3], FrameType::WindowUpdate.as_u8());
        assert_eq!(&encoded[5..9], &[0, 0, 0, 42]);

        let increment = u32::from_be_bytes([encoded[9], encoded[10], encoded[11], encoded[12]]);
        assert_eq!(increment, 1000);
    }

    #[test]
    fn test_window_update_reserved_bit_masked() {
        let bytes = [0, 0, 4, 0x8, 0, 0, 0, 0, 0, 0x80, 0, 0x01, 0];
        match decode_bytes(&bytes).unwrap().kind() {
            FrameKind::WindowUpdate(f) => assert_eq!(f.increment, 256),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_error_code_decodes_as_internal() {
        let bytes = [0, 0, 4, 0x3, 0, 0, 0, 0, 1, 0, 0, 0, 0x42];
        match decode_bytes(&bytes).unwrap().kind() {
            FrameKind::RstStream(f) => assert_eq!(f.error_code, ErrorCode::InternalError),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_frame_skips_unknown_type() {
        let mut wire = vec![0, 0, 2, 0xfa, 0, 0, 0, 0, 1, 0xaa, 0xbb];
        wire.extend_from_slice(&FrameCodec::encode_to_bytes(&Frame::ping([7; 8])).unwrap());

        let codec = FrameCodec::new();
        let frame = codec.read_frame(&mut Cursor::new(wire)).unwrap();
        assert_eq!(frame, Frame::ping([7; 8]));
    }

    #[test]
    fn test_read_frame_enforces_max_size() {
        let codec = FrameCodec::new();
        // 16385-byte DATA header, no payload behind it
        let wire = vec![0x00, 0x40, 0x01, 0x0, 0, 0, 0, 0, 1];
        let err = codec.read_frame(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, Error::FrameSize(_)));
    }

    #[test]
    fn test_read_frame_eof_is_io() {
        let codec = FrameCodec::new();
        let err = codec.read_frame(&mut Cursor::new(vec![0, 0, 5])).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_parse_waits_for_complete_frame() {
        let codec = FrameCodec::new();
        let encoded = FrameCodec::encode_to_bytes(&Frame::data(3, Bytes::from("abc"), false)).unwrap();

        let mut buf = BytesMut::from(&encoded[..10]);
        assert!(codec.parse(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&encoded[10..]);
        let frame = codec.parse(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::data(3, Bytes::from("abc"), false));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_write_frames_batches() {
        let frames = vec![
            Frame::headers(1, Bytes::from_static(b"ab"), false, false),
            Frame::continuation(1, Bytes::from_static(b"cd"), true),
        ];
        let mut out = Vec::new();
        FrameCodec::write_frames(&mut out, &frames).unwrap();

        let codec = FrameCodec::new();
        let mut cursor = Cursor::new(out);
        assert_eq!(codec.read_frame(&mut cursor).unwrap(), frames[0]);
        assert_eq!(codec.read_frame(&mut cursor).unwrap(), frames[1]);
    }
}
