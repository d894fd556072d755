//! HTTP/2 frame types and utilities
//!
//! A [`Frame`] is the shared 9-octet [`FrameHeader`] plus a [`FrameKind`]
//! carrying the fields of one of the ten frame variants. Constructors
//! derive the header (`length`, `type`, PADDED / PRIORITY bits) from the
//! payload so the two can never disagree.

use super::error::ErrorCode;
use super::settings::Settings;
use super::stream::StreamId;
use bytes::Bytes;
use std::fmt;

/// Size of the frame header on the wire
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest payload length expressible in the 24-bit length field
pub const MAX_FRAME_LENGTH: u32 = 0x00FF_FFFF;

/// Mask clearing the reserved top bit of 31-bit identifiers
pub const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// Size of the priority block (exclusive + dependency + weight)
pub const PRIORITY_BLOCK_SIZE: usize = 5;

/// HTTP/2 frame types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// DATA frame (0x0) - Conveys arbitrary, variable-length sequences of octets
    Data = 0x0,
    /// HEADERS frame (0x1) - Opens a stream and carries header block fragment
    Headers = 0x1,
    /// PRIORITY frame (0x2) - Specifies sender-advised priority of a stream
    Priority = 0x2,
    /// RST_STREAM frame (0x3) - Allows immediate termination of a stream
    RstStream = 0x3,
    /// SETTINGS frame (0x4) - Conveys configuration parameters
    Settings = 0x4,
    /// PUSH_PROMISE frame (0x5) - Used to notify peer of intent to initiate stream
    PushPromise = 0x5,
    /// PING frame (0x6) - Mechanism for measuring round-trip time
    Ping = 0x6,
    /// GOAWAY frame (0x7) - Initiates shutdown of connection
    Goaway = 0x7,
    /// WINDOW_UPDATE frame (0x8) - Implements flow control
    WindowUpdate = 0x8,
    /// CONTINUATION frame (0x9) - Continues sequence of header block fragments
    Continuation = 0x9,
}

impl FrameType {
    /// Convert frame type to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create frame type from u8
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    /// Get frame type name
    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }

    /// Frames that address the connection rather than a stream
    pub fn is_connection_scoped(&self) -> bool {
        matches!(self, FrameType::Settings | FrameType::Ping | FrameType::Goaway)
    }

    /// Frames on which END_STREAM is meaningful
    pub fn carries_end_stream(&self) -> bool {
        matches!(self, FrameType::Data | FrameType::Headers)
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Create empty flags
    pub fn empty() -> Self {
        FrameFlags(0)
    }

    /// Create from u8
    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    /// Get raw u8 value
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Clear a flag
    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    /// Copy with a flag set or cleared
    pub fn with(mut self, flag: u8, on: bool) -> Self {
        if on {
            self.set(flag);
        } else {
            self.clear(flag);
        }
        self
    }

    /// Check if a flag is set
    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    // Common flags

    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    /// Check if END_STREAM is set
    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    /// Check if ACK is set
    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    /// Check if END_HEADERS is set
    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    /// Check if PADDED is set
    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    /// Check if PRIORITY is set
    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

/// The 9-octet prefix of every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length (24 bits)
    pub length: u32,
    /// Raw type byte; unknown types are kept so the payload can be skipped
    pub raw_type: u8,
    /// Frame flags
    pub flags: FrameFlags,
    /// Stream ID (31 bits, reserved bit cleared)
    pub stream_id: StreamId,
}

impl FrameHeader {
    /// Create a header for a known frame type
    pub fn new(length: u32, frame_type: FrameType, flags: FrameFlags, stream_id: StreamId) -> Self {
        FrameHeader {
            length,
            raw_type: frame_type.as_u8(),
            flags,
            stream_id: stream_id & STREAM_ID_MASK,
        }
    }

    /// Decoded frame type, `None` for extension types
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.raw_type)
    }
}

/// Default stream weight
pub const DEFAULT_WEIGHT: u16 = 16;

/// Priority specification
///
/// `weight` is the logical weight in `1..=256`; the wire byte holds
/// `weight - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpec {
    /// Stream dependency
    pub stream_dependency: StreamId,
    /// Exclusive flag
    pub exclusive: bool,
    /// Logical weight (1-256)
    pub weight: u16,
}

impl PrioritySpec {
    /// Create a new priority specification
    pub fn new(stream_dependency: StreamId, exclusive: bool, weight: u16) -> Self {
        PrioritySpec {
            stream_dependency: stream_dependency & STREAM_ID_MASK,
            exclusive,
            weight: weight.clamp(1, 256),
        }
    }

    /// Build from the 32-bit dependency word and the wire weight byte
    pub fn from_wire(dependency: u32, wire_weight: u8) -> Self {
        PrioritySpec {
            stream_dependency: dependency & STREAM_ID_MASK,
            exclusive: dependency & !STREAM_ID_MASK != 0,
            weight: wire_weight as u16 + 1,
        }
    }

    /// 32-bit dependency word with the exclusive bit folded in
    pub fn dependency_word(&self) -> u32 {
        let dep = self.stream_dependency & STREAM_ID_MASK;
        if self.exclusive {
            dep | !STREAM_ID_MASK
        } else {
            dep
        }
    }

    /// Weight byte as sent on the wire
    pub fn wire_weight(&self) -> u8 {
        (self.weight.clamp(1, 256) - 1) as u8
    }
}

impl Default for PrioritySpec {
    fn default() -> Self {
        PrioritySpec::new(0, false, DEFAULT_WEIGHT)
    }
}

/// DATA payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Data payload
    pub data: Bytes,
    /// Padding length (if PADDED flag is set)
    pub pad_length: Option<u8>,
}

/// HEADERS payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    /// Header block fragment
    pub header_block: Bytes,
    /// Priority information (if PRIORITY flag is set)
    pub priority: Option<PrioritySpec>,
    /// Padding length (if PADDED flag is set)
    pub pad_length: Option<u8>,
}

/// PRIORITY payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFrame {
    pub priority: PrioritySpec,
}

/// RST_STREAM payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub error_code: ErrorCode,
}

/// SETTINGS payload (empty for an ACK)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub settings: Settings,
}

/// PUSH_PROMISE payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromiseFrame {
    /// Promised stream ID
    pub promised_stream_id: StreamId,
    /// Header block fragment
    pub header_block: Bytes,
    /// Padding length (if PADDED flag is set)
    pub pad_length: Option<u8>,
}

/// PING payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    /// Opaque data (8 bytes)
    pub data: [u8; 8],
}

/// GOAWAY payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoawayFrame {
    /// Last stream ID
    pub last_stream_id: StreamId,
    /// Error code
    pub error_code: ErrorCode,
    /// Debug data
    pub debug_data: Bytes,
}

/// WINDOW_UPDATE payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    /// Window size increment (31 bits)
    pub increment: u32,
}

/// CONTINUATION payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationFrame {
    /// Header block fragment
    pub header_block: Bytes,
}

/// Per-type frame fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Data(DataFrame),
    Headers(HeadersFrame),
    Priority(PriorityFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    PushPromise(PushPromiseFrame),
    Ping(PingFrame),
    Goaway(GoawayFrame),
    WindowUpdate(WindowUpdateFrame),
    Continuation(ContinuationFrame),
}

fn padding_len(pad_length: Option<u8>) -> usize {
    pad_length.map(|p| 1 + p as usize).unwrap_or(0)
}

impl FrameKind {
    /// Type tag of this variant
    pub fn frame_type(&self) -> FrameType {
        match self {
            FrameKind::Data(_) => FrameType::Data,
            FrameKind::Headers(_) => FrameType::Headers,
            FrameKind::Priority(_) => FrameType::Priority,
            FrameKind::RstStream(_) => FrameType::RstStream,
            FrameKind::Settings(_) => FrameType::Settings,
            FrameKind::PushPromise(_) => FrameType::PushPromise,
            FrameKind::Ping(_) => FrameType::Ping,
            FrameKind::Goaway(_) => FrameType::Goaway,
            FrameKind::WindowUpdate(_) => FrameType::WindowUpdate,
            FrameKind::Continuation(_) => FrameType::Continuation,
        }
    }

    /// Number of payload bytes this variant occupies on the wire
    pub fn payload_len(&self) -> usize {
        match self {
            FrameKind::Data(f) => f.data.len() + padding_len(f.pad_length),
            FrameKind::Headers(f) => {
                let priority = if f.priority.is_some() { PRIORITY_BLOCK_SIZE } else { 0 };
                f.header_block.len() + priority + padding_len(f.pad_length)
            }
            FrameKind::Priority(_) => PRIORITY_BLOCK_SIZE,
            FrameKind::RstStream(_) => 4,
            FrameKind::Settings(f) => f.settings.encoded_len(),
            FrameKind::PushPromise(f) => 4 + f.header_block.len() + padding_len(f.pad_length),
            FrameKind::Ping(_) => 8,
            FrameKind::Goaway(f) => 8 + f.debug_data.len(),
            FrameKind::WindowUpdate(_) => 4,
            FrameKind::Continuation(f) => f.header_block.len(),
        }
    }

    /// Bring the payload-describing flag bits in line with the fields
    fn derive_flags(&self, flags: FrameFlags) -> FrameFlags {
        match self {
            FrameKind::Data(f) => flags.with(FrameFlags::PADDED, f.pad_length.is_some()),
            FrameKind::Headers(f) => flags
                .with(FrameFlags::PADDED, f.pad_length.is_some())
                .with(FrameFlags::PRIORITY, f.priority.is_some()),
            FrameKind::PushPromise(f) => flags.with(FrameFlags::PADDED, f.pad_length.is_some()),
            _ => flags,
        }
    }
}

/// A complete HTTP/2 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    kind: FrameKind,
}

impl Frame {
    /// Build a frame, recomputing the header from the payload
    ///
    /// A payload longer than [`MAX_FRAME_LENGTH`] cannot be described by
    /// the 24-bit length field: the header length saturates at
    /// `MAX_FRAME_LENGTH` and [`Frame::is_oversized`] reports it. Such a
    /// frame is rejected with FRAME_SIZE_ERROR when encoded.
    pub fn new(stream_id: StreamId, flags: FrameFlags, kind: FrameKind) -> Self {
        let flags = kind.derive_flags(flags);
        let length = kind.payload_len().min(MAX_FRAME_LENGTH as usize) as u32;
        Frame {
            header: FrameHeader::new(length, kind.frame_type(), flags, stream_id),
            kind,
        }
    }

    /// Pair a decoded header with its payload as read from the wire
    pub(crate) fn from_parts(header: FrameHeader, kind: FrameKind) -> Self {
        Frame { header, kind }
    }

    /// DATA frame
    pub fn data(stream_id: StreamId, data: Bytes, end_stream: bool) -> Self {
        let flags = FrameFlags::empty().with(FrameFlags::END_STREAM, end_stream);
        Frame::new(stream_id, flags, FrameKind::Data(DataFrame { data, pad_length: None }))
    }

    /// HEADERS frame
    pub fn headers(stream_id: StreamId, header_block: Bytes, end_stream: bool, end_headers: bool) -> Self {
        let flags = FrameFlags::empty()
            .with(FrameFlags::END_STREAM, end_stream)
            .with(FrameFlags::END_HEADERS, end_headers);
        Frame::new(
            stream_id,
            flags,
            FrameKind::Headers(HeadersFrame {
                header_block,
                priority: None,
                pad_length: None,
            }),
        )
    }

    /// PRIORITY frame
    pub fn priority(stream_id: StreamId, priority: PrioritySpec) -> Self {
        Frame::new(
            stream_id,
            FrameFlags::empty(),
            FrameKind::Priority(PriorityFrame { priority }),
        )
    }

    /// RST_STREAM frame
    pub fn rst_stream(stream_id: StreamId, error_code: ErrorCode) -> Self {
        Frame::new(
            stream_id,
            FrameFlags::empty(),
            FrameKind::RstStream(RstStreamFrame { error_code }),
        )
    }

    /// SETTINGS frame carrying parameters
    pub fn settings(settings: Settings) -> Self {
        Frame::new(
            0,
            FrameFlags::empty(),
            FrameKind::Settings(SettingsFrame { settings }),
        )
    }

    /// Empty SETTINGS frame with ACK
    pub fn settings_ack() -> Self {
        Frame::new(
            0,
            FrameFlags::from_u8(FrameFlags::ACK),
            FrameKind::Settings(SettingsFrame {
                settings: Settings::new(),
            }),
        )
    }

    /// PUSH_PROMISE frame
    pub fn push_promise(
        stream_id: StreamId,
        promised_stream_id: StreamId,
        header_block: Bytes,
        end_headers: bool,
    ) -> Self {
        Frame::new(
            stream_id,
            FrameFlags::empty().with(FrameFlags::END_HEADERS, end_headers),
            FrameKind::PushPromise(PushPromiseFrame {
                promised_stream_id: promised_stream_id & STREAM_ID_MASK,
                header_block,
                pad_length: None,
            }),
        )
    }

    /// PING request
    pub fn ping(data: [u8; 8]) -> Self {
        Frame::new(0, FrameFlags::empty(), FrameKind::Ping(PingFrame { data }))
    }

    /// PING reply echoing `data`
    pub fn ping_ack(data: [u8; 8]) -> Self {
        Frame::new(
            0,
            FrameFlags::from_u8(FrameFlags::ACK),
            FrameKind::Ping(PingFrame { data }),
        )
    }

    /// GOAWAY frame
    pub fn goaway(last_stream_id: StreamId, error_code: ErrorCode, debug_data: Bytes) -> Self {
        Frame::new(
            0,
            FrameFlags::empty(),
            FrameKind::Goaway(GoawayFrame {
                last_stream_id: last_stream_id & STREAM_ID_MASK,
                error_code,
                debug_data,
            }),
        )
    }

    /// WINDOW_UPDATE frame (stream 0 for the connection window)
    pub fn window_update(stream_id: StreamId, increment: u32) -> Self {
        Frame::new(
            stream_id,
            FrameFlags::empty(),
            FrameKind::WindowUpdate(WindowUpdateFrame {
                increment: increment & STREAM_ID_MASK,
            }),
        )
    }

    /// CONTINUATION frame
    pub fn continuation(stream_id: StreamId, header_block: Bytes, end_headers: bool) -> Self {
        Frame::new(
            stream_id,
            FrameFlags::empty().with(FrameFlags::END_HEADERS, end_headers),
            FrameKind::Continuation(ContinuationFrame { header_block }),
        )
    }

    /// Add padding to a DATA, HEADERS or PUSH_PROMISE frame
    ///
    /// Other variants are returned unchanged.
    pub fn with_padding(self, pad_length: u8) -> Self {
        let Frame { header, mut kind } = self;
        match &mut kind {
            FrameKind::Data(f) => f.pad_length = Some(pad_length),
            FrameKind::Headers(f) => f.pad_length = Some(pad_length),
            FrameKind::PushPromise(f) => f.pad_length = Some(pad_length),
            _ => return Frame { header, kind },
        }
        Frame::new(header.stream_id, header.flags, kind)
    }

    /// Attach a priority block to a HEADERS frame
    pub fn with_priority(self, priority: PrioritySpec) -> Self {
        let Frame { header, mut kind } = self;
        match &mut kind {
            FrameKind::Headers(f) => f.priority = Some(priority),
            _ => return Frame { header, kind },
        }
        Frame::new(header.stream_id, header.flags, kind)
    }

    /// Whether the payload exceeds what one frame can carry
    pub fn is_oversized(&self) -> bool {
        self.kind.payload_len() > MAX_FRAME_LENGTH as usize
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    pub fn into_kind(self) -> FrameKind {
        self.kind
    }

    pub fn stream_id(&self) -> StreamId {
        self.header.stream_id
    }

    pub fn flags(&self) -> FrameFlags {
        self.header.flags
    }

    pub fn frame_type(&self) -> FrameType {
        self.kind.frame_type()
    }

    /// Payload length as declared in the header
    pub fn payload_len(&self) -> usize {
        self.header.length as usize
    }

    /// END_STREAM on a DATA or HEADERS frame
    pub fn is_end_stream(&self) -> bool {
        self.frame_type().carries_end_stream() && self.header.flags.is_end_stream()
    }

    /// END_HEADERS on a HEADERS, PUSH_PROMISE or CONTINUATION frame
    pub fn is_end_headers(&self) -> bool {
        matches!(
            self.frame_type(),
            FrameType::Headers | FrameType::PushPromise | FrameType::Continuation
        ) && self.header.flags.is_end_headers()
    }

    /// ACK on a SETTINGS or PING frame
    pub fn is_ack(&self) -> bool {
        matches!(self.frame_type(), FrameType::Settings | FrameType::Ping)
            && self.header.flags.is_ack()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stream={} flags=0x{:x} len={}",
            self.frame_type().name(),
            self.header.stream_id,
            self.header.flags.as_u8(),
            self.header.length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::Data.as_u8(), 0x0);
        assert_eq!(FrameType::Headers.as_u8(), 0x1);
        assert_eq!(FrameType::Continuation.as_u8(), 0x9);

        assert_eq!(FrameType::from_u8(0x0), Some(FrameType::Data));
        assert_eq!(FrameType::from_u8(0x9), Some(FrameType::Continuation));
        assert_eq!(FrameType::from_u8(0xff), None);
    }

    #[test]
    fn test_frame_flags() {
        let mut flags = FrameFlags::empty();
        assert!(!flags.is_end_stream());

        flags.set(FrameFlags::END_STREAM);
        assert!(flags.is_end_stream());
        assert!(!flags.is_end_headers());

        flags.set(FrameFlags::END_HEADERS);
        assert!(flags.is_end_headers());

        flags.clear(FrameFlags::END_STREAM);
        assert!(!flags.is_end_stream());
        assert_eq!(flags.as_u8(), FrameFlags::END_HEADERS);
    }

    #[test]
    fn test_data_frame_length() {
        let frame = Frame::data(1, Bytes::from("Hello"), true);
        assert_eq!(frame.payload_len(), 5);
        assert!(frame.is_end_stream());
        assert!(!frame.flags().is_padded());

        let padded = frame.with_padding(10);
        assert_eq!(padded.payload_len(), 16); // 5 + 1 + 10
        assert!(padded.flags().is_padded());
        assert!(padded.is_end_stream());
    }

    #[test]
    fn test_headers_priority_length() {
        let frame = Frame::headers(2, Bytes::from("test header block"), false, true)
            .with_priority(PrioritySpec::new(1, false, 2));
        assert_eq!(frame.payload_len(), 22);
        assert!(frame.flags().is_priority());
        assert!(frame.is_end_headers());
    }

    #[test]
    fn test_priority_weight_convention() {
        let spec = PrioritySpec::new(1, true, 256);
        assert_eq!(spec.wire_weight(), 255);
        assert_eq!(spec.dependency_word(), 0x8000_0001);

        let decoded = PrioritySpec::from_wire(0x8000_0001, 255);
        assert_eq!(decoded, spec);
        assert_eq!(PrioritySpec::from_wire(3, 0).weight, 1);
    }

    #[test]
    fn test_stream_id_reserved_bit_masked() {
        let frame = Frame::data(0x8000_0003, Bytes::new(), false);
        assert_eq!(frame.stream_id(), 3);
    }

    #[test]
    fn test_ack_frames() {
        assert!(Frame::settings_ack().is_ack());
        assert_eq!(Frame::settings_ack().payload_len(), 0);
        assert!(!Frame::ping([0; 8]).is_ack());
        assert!(Frame::ping_ack([0; 8]).is_ack());
        // END_STREAM and ACK share a bit; only DATA/HEADERS read it as END_STREAM
        assert!(!Frame::ping_ack([0; 8]).is_end_stream());
    }

    #[test]
    fn test_display() {
        let frame = Frame::headers(3, Bytes::from_static(b"abc"), false, true);
        assert_eq!(frame.to_string(), "HEADERS stream=3 flags=0x4 len=3");
    }
}
