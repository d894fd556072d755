//! HTTP/2 protocol engine
//!
//! Frame codec, stream state machine, flow-control windows and a
//! connection multiplexer for the h2-10 draft wire format.
//!
//! # Architecture
//!
//! The engine is layered so that every protocol rule can be exercised
//! without a socket:
//!
//! - [`codec`] turns bytes into [`Frame`] values and back,
//! - [`stream`] and [`flow_control`] hold per-stream state and credit,
//! - [`connection`] is the sans-I/O core that applies frames to that state,
//! - [`driver`] runs the core on real transports with reader, writer and
//!   connection-loop threads.
//!
//! Header compression is external: blocks are opaque to the core and go
//! through the [`HeaderCodec`] owned by the driver.
//!
//! ## Features
//!
//! - **Frames**: all ten frame types, padding, priority blocks
//! - **Streams**: seven-state machine, id parity and ordering rules
//! - **Flow control**: connection and stream windows with automatic replenishment
//! - **Settings**: exchange, ACK deadline, retroactive window adjustment
//! - **Upgrade**: cleartext `Upgrade: h2-10` handshake
//! - **Telemetry**: injected sink, `tracing` by default
//!
//! # Examples
//!
//! ## Server
//!
//! ```no_run
//! use h2engine::http::h2::{Connection, ConnectionConfig, StreamEvent};
//! use std::net::TcpListener;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:8080")?;
//! let (socket, _) = listener.accept()?;
//! let conn = Connection::server(socket, ConnectionConfig::server())?;
//!
//! let stream = conn.accept()?;
//! if let StreamEvent::Headers { headers, .. } = stream.recv()? {
//!     println!("{} {:?}", stream.id(), headers.get("path"));
//! }
//! stream.send_headers(&[("status", "200")], false)?;
//! stream.send_data(&b"OK"[..], true)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Frames
//!
//! ```
//! use h2engine::http::h2::{Frame, FrameCodec};
//! use bytes::Bytes;
//!
//! let frame = Frame::data(2, Bytes::from_static(b"hello"), true);
//! let wire = FrameCodec::encode_to_bytes(&frame).unwrap();
//! assert_eq!(&wire[..9], &[0, 0, 5, 0, 1, 0, 0, 0, 2]);
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod flow_control;
pub mod frames;
pub mod hpack;
pub mod settings;
pub mod stream;
pub mod telemetry;
pub mod upgrade;

pub use codec::FrameCodec;
pub use config::{ConnectionBuilder, ConnectionConfig, Role};
pub use connection::{Event, H2Connection};
pub use driver::{Connection, StreamEvent, StreamHandle};
pub use error::{Error, ErrorCode, Result};
pub use flow_control::Window;
pub use frames::{Frame, FrameFlags, FrameHeader, FrameKind, FrameType, PrioritySpec};
pub use hpack::{HeaderCodec, HpackCodec};
pub use settings::{Settings, SettingsBuilder, DEFAULT_SETTINGS};
pub use stream::{H2Stream, StreamId, StreamState};
pub use telemetry::{NoopTelemetry, Telemetry, TracingTelemetry};

/// Connection preface sent by clients
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFFFFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;

/// ALPN token for HTTP/2 over TLS
pub const ALPN_PROTOCOL: &str = "h2";

/// Version token advertised in `Upgrade:` by default
pub const DEFAULT_UPGRADE_TOKEN: &str = "h2-10";

pub const UPGRADE_TOKEN_DRAFT_09: &str = "HTTP-draft-09/2.0";

pub const UPGRADE_TOKEN_DRAFT_06: &str = "HTTP-draft-06/2.0";
