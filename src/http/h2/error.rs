//! HTTP/2 error types
//!
//! This module defines error types for HTTP/2 operations, mapping to
//! the error codes carried by RST_STREAM and GOAWAY.

use super::stream::StreamId;
use std::fmt;

/// HTTP/2 errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on the underlying byte stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the URL / header utilities
    #[error("HTTP error: {0}")]
    Http(#[from] crate::http::Error),

    /// Protocol error detected (error code 0x1)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Internal error (error code 0x2)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Flow control error (error code 0x3)
    #[error("Flow control error: {0}")]
    FlowControl(String),

    /// SETTINGS not acknowledged in time (error code 0x4)
    #[error("Settings timeout")]
    SettingsTimeout,

    /// Frame on a closed stream (error code 0x5)
    #[error("Stream closed: {0}")]
    StreamClosed(StreamId),

    /// Length or flag inconsistency (error code 0x6)
    #[error("Frame size error: {0}")]
    FrameSize(String),

    /// Stream refused by the peer (error code 0x7)
    #[error("Refused stream: {0}")]
    RefusedStream(StreamId),

    /// Stream cancelled (error code 0x8)
    #[error("Stream cancelled: {0}")]
    Cancel(StreamId),

    /// Header block could not be decoded (error code 0x9)
    #[error("Compression error: {0}")]
    Compression(String),

    /// Stream reset by the peer with the given code
    #[error("Stream {stream_id} reset: {code}")]
    Reset { stream_id: StreamId, code: ErrorCode },

    /// Peer closed the connection with GOAWAY
    #[error("GOAWAY received: {code}, last stream {last_stream_id}")]
    GoAway { last_stream_id: StreamId, code: ErrorCode },

    /// Invalid stream ID
    #[error("Invalid stream ID: {0}")]
    InvalidStreamId(StreamId),

    /// Unknown frame type byte
    #[error("Invalid frame type: {0}")]
    InvalidFrameType(u8),

    /// Timeout waiting for operation
    #[error("Timeout")]
    Timeout,

    /// Stream not found
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Peer's MAX_CONCURRENT_STREAMS reached
    #[error("Too many concurrent streams")]
    TooManyStreams,

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Missing or malformed connection preface
    #[error("Missing connection preface")]
    MissingPreface,

    /// HTTP/1.1 upgrade handshake failed
    #[error("Upgrade failed: {0}")]
    Upgrade(String),

    /// Initiating server push is not implemented
    #[error("Server push is not supported")]
    PushNotSupported,
}

impl Error {
    /// Wire code used when this error terminates a stream or connection
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Protocol(_)
            | Error::InvalidStreamId(_)
            | Error::InvalidFrameType(_)
            | Error::InvalidSettings(_)
            | Error::MissingPreface
            | Error::Upgrade(_) => ErrorCode::ProtocolError,
            Error::FlowControl(_) => ErrorCode::FlowControlError,
            Error::SettingsTimeout => ErrorCode::SettingsTimeout,
            Error::StreamClosed(_) => ErrorCode::StreamClosed,
            Error::FrameSize(_) => ErrorCode::FrameSizeError,
            Error::RefusedStream(_) | Error::TooManyStreams => ErrorCode::RefusedStream,
            Error::Cancel(_) => ErrorCode::Cancel,
            Error::Compression(_) => ErrorCode::CompressionError,
            Error::Reset { code, .. } | Error::GoAway { code, .. } => *code,
            Error::ConnectionClosed => ErrorCode::NoError,
            Error::Io(_)
            | Error::Http(_)
            | Error::Internal(_)
            | Error::Timeout
            | Error::StreamNotFound(_)
            | Error::PushNotSupported => ErrorCode::InternalError,
        }
    }

    /// Whether the byte stream itself failed, so no GOAWAY can be written
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

/// HTTP/2 error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame size incorrect
    FrameSizeError = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
    /// Negotiated TLS parameters not acceptable
    InadequateSecurity = 0xc,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            _ => None,
        }
    }

    /// Decode a received code; unknown values are treated as INTERNAL_ERROR
    pub fn from_wire(code: u32) -> Self {
        Self::from_u32(code).unwrap_or(ErrorCode::InternalError)
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;
