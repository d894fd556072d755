//! Sans-I/O HTTP/2 connection core
//!
//! [`H2Connection`] holds the complete protocol state of one connection:
//! the stream table, the connection window, the SETTINGS exchange and the
//! header-block assembly. It never touches a socket. Received frames go in
//! through [`H2Connection::recv_frame`] and come out as [`Event`]s; outgoing
//! HEADERS and DATA are cut into frames by the `prepare_*` methods. The
//! threaded driver owns one of these and does the I/O around it.

use super::config::{ConnectionConfig, Role};
use super::error::{Error, ErrorCode, Result};
use super::flow_control::Window;
use super::frames::*;
use super::settings::{Settings, DEFAULT_SETTINGS};
use super::stream::{Direction, StreamId, StreamManager, StreamState};
use super::telemetry::Telemetry;
use super::{CONNECTION_PREFACE, CONNECTION_STREAM_ID, DEFAULT_INITIAL_WINDOW_SIZE};
use crate::http::transport::read_full;
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

/// Upper bound on one assembled header block
pub const MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// Write the client connection preface
pub fn write_preface<W: Write>(writer: &mut W) -> Result<()> {
    writer.write_all(CONNECTION_PREFACE)?;
    Ok(())
}

/// Read and check the client connection preface
pub fn read_preface<R: Read>(reader: &mut R) -> Result<()> {
    let mut preface = [0u8; 24];
    read_full(reader, &mut preface)?;
    if preface[..] != CONNECTION_PREFACE[..] {
        return Err(Error::MissingPreface);
    }
    Ok(())
}

/// Outcome of feeding one frame to the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Frame the connection wants written (ACKs, WINDOW_UPDATE, RST_STREAM)
    Transmit(Frame),
    /// A complete header block
    ///
    /// Blocks with `accepted == false` belong to refused or ignored
    /// streams; they must still be decoded to keep the compression
    /// context in sync, then dropped.
    Headers {
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
        accepted: bool,
    },
    /// A complete PUSH_PROMISE header block
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        block: Bytes,
    },
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    /// Stream terminated by RST_STREAM or by a received GOAWAY
    Reset { stream_id: StreamId, code: ErrorCode },
    /// Reply to one of our PINGs
    Pong([u8; 8]),
    GoAway {
        last_stream_id: StreamId,
        code: ErrorCode,
        debug_data: Bytes,
    },
    /// Send window opened; stream 0 means the connection window
    WindowUpdated { stream_id: StreamId },
    /// Peer SETTINGS applied; windows and frame size may have changed
    SettingsChanged,
}

/// Header block waiting for CONTINUATION frames
#[derive(Debug)]
struct PendingBlock {
    stream_id: StreamId,
    promised_stream_id: Option<StreamId>,
    block: BytesMut,
    end_stream: bool,
    accepted: bool,
}

/// How a received frame's stream id relates to the stream table
enum Target {
    Known,
    Closed { in_grace: bool },
    Purged,
    New,
}

/// Protocol state of one connection
pub struct H2Connection {
    config: ConnectionConfig,
    /// Our SETTINGS currently in effect (acknowledged by the peer)
    local_settings: Settings,
    /// Sent SETTINGS awaiting ACK, oldest first
    pending_settings: VecDeque<(Settings, Instant)>,
    /// Peer SETTINGS in effect
    remote_settings: Settings,
    streams: StreamManager,
    /// Window of stream 0
    window: Window,
    continuation: Option<PendingBlock>,
    peer_settings_received: bool,
    goaway_sent: Option<StreamId>,
    goaway_received: Option<(StreamId, ErrorCode)>,
    telemetry: Arc<dyn Telemetry>,
}

impl H2Connection {
    /// Create the protocol state for a connection
    pub fn new(config: ConnectionConfig) -> Self {
        let mut streams = StreamManager::new(config.role.is_client());
        streams.set_closed_stream_grace(config.closed_stream_grace);

        H2Connection {
            window: Window::new(config.connection_window_size, DEFAULT_INITIAL_WINDOW_SIZE),
            telemetry: config.telemetry.clone(),
            local_settings: DEFAULT_SETTINGS,
            pending_settings: VecDeque::new(),
            remote_settings: DEFAULT_SETTINGS,
            streams,
            continuation: None,
            peer_settings_received: false,
            goaway_sent: None,
            goaway_received: None,
            config,
        }
    }

    /// Frames that open the connection after the preface
    ///
    /// Our SETTINGS, followed by a connection WINDOW_UPDATE when the
    /// configured connection window is larger than the default.
    pub fn start(&mut self, now: Instant) -> Vec<Frame> {
        let settings = self.config.settings;
        self.pending_settings.push_back((settings, now));

        let mut frames = vec![Frame::settings(settings)];
        let extra = self
            .config
            .connection_window_size
            .saturating_sub(DEFAULT_INITIAL_WINDOW_SIZE);
        if extra > 0 {
            frames.push(Frame::window_update(CONNECTION_STREAM_ID, extra));
        }
        frames
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Connection-level window
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    pub fn stream_state(&self, stream_id: StreamId) -> Option<StreamState> {
        self.streams.get_stream(stream_id).map(|s| s.state())
    }

    pub fn last_processed_id(&self) -> StreamId {
        self.streams.last_processed_id()
    }

    pub fn goaway_sent(&self) -> Option<StreamId> {
        self.goaway_sent
    }

    pub fn goaway_received(&self) -> Option<(StreamId, ErrorCode)> {
        self.goaway_received
    }

    /// GOAWAY exchanged and no stream left running
    pub fn is_drained(&self) -> bool {
        (self.goaway_sent.is_some() || self.goaway_received.is_some())
            && self.streams.open_stream_ids().is_empty()
    }

    /// Bytes that could go out on `stream_id` right now
    pub fn send_capacity(&self, stream_id: StreamId) -> usize {
        self.streams
            .get_stream(stream_id)
            .map(|s| s.window().available_send())
            .unwrap_or(0)
            .min(self.window.available_send())
    }

    fn classify(&self, stream_id: StreamId, now: Instant) -> Target {
        match self.streams.get_stream(stream_id) {
            Some(s) if s.state().is_closed() => Target::Closed {
                in_grace: self.streams.in_grace(stream_id, now),
            },
            Some(_) => Target::Known,
            None if self.streams.was_used(stream_id) => Target::Purged,
            None => Target::New,
        }
    }

    fn transition(
        &mut self,
        stream_id: StreamId,
        frame_type: FrameType,
        flags: FrameFlags,
        direction: Direction,
        now: Instant,
    ) -> Result<StreamState> {
        let stream = self
            .streams
            .get_stream_mut(stream_id)
            .ok_or(Error::StreamNotFound(stream_id))?;
        let (old, new) = stream.apply(frame_type, flags, direction, now)?;
        if old != new {
            self.telemetry.stream_state_changed(stream_id, old, new);
        }
        Ok(new)
    }

    fn stream_closed_reply(&self, stream_id: StreamId, in_grace: bool, out: &mut Vec<Event>) {
        if !in_grace {
            out.push(Event::Transmit(Frame::rst_stream(
                stream_id,
                ErrorCode::StreamClosed,
            )));
        }
    }

    /// Process one received frame
    ///
    /// An `Err` is connection-fatal: the caller sends GOAWAY with
    /// [`Error::code`] and tears down. Stream-local problems come back as
    /// `Transmit(RST_STREAM)` events instead.
    pub fn recv_frame(&mut self, frame: Frame, now: Instant) -> Result<Vec<Event>> {
        self.telemetry.frame_received(&frame);

        let header = *frame.header();
        let stream_id = header.stream_id;
        let flags = header.flags;
        let frame_type = frame.frame_type();

        if let Some(pending) = &self.continuation {
            if frame_type != FrameType::Continuation || stream_id != pending.stream_id {
                return Err(Error::Protocol(format!(
                    "{} on stream {} while header block for stream {} is open",
                    frame_type.name(),
                    stream_id,
                    pending.stream_id
                )));
            }
        }

        if !self.peer_settings_received && (frame_type != FrameType::Settings || flags.is_ack()) {
            return Err(Error::Protocol(format!(
                "first frame must be SETTINGS, got {}",
                frame_type.name()
            )));
        }

        if frame_type.is_connection_scoped() && stream_id != CONNECTION_STREAM_ID {
            return Err(Error::Protocol(format!(
                "{} on stream {}",
                frame_type.name(),
                stream_id
            )));
        }
        if !frame_type.is_connection_scoped()
            && frame_type != FrameType::WindowUpdate
            && stream_id == CONNECTION_STREAM_ID
        {
            return Err(Error::Protocol(format!(
                "{} on stream 0",
                frame_type.name()
            )));
        }

        let mut out = Vec::new();
        match frame.into_kind() {
            FrameKind::Settings(f) => self.recv_settings(f, flags, &mut out)?,
            FrameKind::Ping(f) => {
                if flags.is_ack() {
                    out.push(Event::Pong(f.data));
                } else {
                    out.push(Event::Transmit(Frame::ping_ack(f.data)));
                }
            }
            FrameKind::Goaway(f) => self.recv_goaway(f, now, &mut out),
            FrameKind::WindowUpdate(f) => {
                self.recv_window_update(stream_id, f, flags, now, &mut out)?
            }
            FrameKind::Headers(f) => self.recv_headers(stream_id, f, flags, now, &mut out)?,
            FrameKind::Continuation(f) => self.recv_continuation(f, flags, &mut out)?,
            FrameKind::PushPromise(f) => {
                self.recv_push_promise(stream_id, f, flags, now, &mut out)?
            }
            FrameKind::Data(f) => {
                self.recv_data(stream_id, f, header.length as usize, flags, now, &mut out)?
            }
            FrameKind::Priority(f) => self.recv_priority(stream_id, f, flags, now, &mut out)?,
            FrameKind::RstStream(f) => self.recv_rst_stream(stream_id, f, flags, now, &mut out)?,
        }
        Ok(out)
    }

    fn recv_settings(
        &mut self,
        frame: SettingsFrame,
        flags: FrameFlags,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        if flags.is_ack() {
            if let Some((settings, _)) = self.pending_settings.pop_front() {
                self.apply_local_settings(settings, out)?;
            }
            return Ok(());
        }

        self.peer_settings_received = true;
        let settings = frame.settings;

        if let Some(size) = settings.initial_window_size {
            for stream in self.streams.iter_mut() {
                stream.window_mut().update_peer_initial_size(size)?;
            }
            self.streams.set_peer_initial_window(size);
        }
        if settings.max_concurrent_streams.is_some() {
            self.streams
                .set_max_concurrent_streams(settings.max_concurrent_streams);
        }
        self.remote_settings.merge(&settings);

        out.push(Event::Transmit(Frame::settings_ack()));
        out.push(Event::SettingsChanged);
        Ok(())
    }

    /// Our SETTINGS were acknowledged: apply them
    ///
    /// A smaller INITIAL_WINDOW_SIZE can leave a stream at or below its
    /// threshold with the peer out of credit; such streams are refilled
    /// here since no DATA will arrive to trigger it.
    fn apply_local_settings(&mut self, settings: Settings, out: &mut Vec<Event>) -> Result<()> {
        if let Some(size) = settings.initial_window_size {
            for stream in self.streams.iter_mut() {
                stream.window_mut().update_initial_size(size)?;
                if !stream.state().can_receive() {
                    continue;
                }
                if let Some(increment) = stream.window_mut().replenish() {
                    out.push(Event::Transmit(Frame::window_update(stream.id(), increment)));
                }
            }
            self.streams.set_local_initial_window(size);
        }
        if settings.max_concurrent_streams.is_some() {
            self.streams
                .set_local_max_concurrent_streams(settings.max_concurrent_streams);
        }
        self.local_settings.merge(&settings);
        Ok(())
    }

    fn recv_goaway(&mut self, frame: GoawayFrame, now: Instant, out: &mut Vec<Event>) {
        let last = frame.last_stream_id;
        self.goaway_received = Some((last, frame.error_code));

        let refused: Vec<StreamId> = self
            .streams
            .open_stream_ids()
            .into_iter()
            .filter(|id| *id > last && self.streams.is_local(*id))
            .collect();
        for id in refused {
            if let Some(stream) = self.streams.get_stream_mut(id) {
                let old = stream.state();
                stream.close(now);
                self.telemetry
                    .stream_state_changed(id, old, StreamState::Closed);
            }
            out.push(Event::Reset {
                stream_id: id,
                code: ErrorCode::RefusedStream,
            });
        }

        out.push(Event::GoAway {
            last_stream_id: last,
            code: frame.error_code,
            debug_data: frame.debug_data,
        });
    }

    fn recv_window_update(
        &mut self,
        stream_id: StreamId,
        frame: WindowUpdateFrame,
        flags: FrameFlags,
        now: Instant,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        if stream_id == CONNECTION_STREAM_ID {
            self.window.apply_window_update(frame.increment)?;
            out.push(Event::WindowUpdated { stream_id });
            return Ok(());
        }

        match self.classify(stream_id, now) {
            Target::Known => {
                self.transition(stream_id, FrameType::WindowUpdate, flags, Direction::Recv, now)?;
                if let Some(stream) = self.streams.get_stream_mut(stream_id) {
                    stream.window_mut().apply_window_update(frame.increment)?;
                }
                out.push(Event::WindowUpdated { stream_id });
            }
            Target::Closed { in_grace } => self.stream_closed_reply(stream_id, in_grace, out),
            Target::Purged => self.stream_closed_reply(stream_id, false, out),
            Target::New => {
                return Err(Error::Protocol(format!(
                    "WINDOW_UPDATE on idle stream {}",
                    stream_id
                )))
            }
        }
        Ok(())
    }

    fn recv_headers(
        &mut self,
        stream_id: StreamId,
        frame: HeadersFrame,
        flags: FrameFlags,
        now: Instant,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        let accepted = match self.classify(stream_id, now) {
            Target::Known => {
                self.transition(stream_id, FrameType::Headers, flags, Direction::Recv, now)?;
                if let (Some(priority), Some(stream)) =
                    (frame.priority, self.streams.get_stream_mut(stream_id))
                {
                    if priority.stream_dependency != stream_id {
                        stream.set_priority(priority);
                    }
                }
                true
            }
            Target::Closed { in_grace } => {
                self.stream_closed_reply(stream_id, in_grace, out);
                false
            }
            Target::Purged => {
                self.stream_closed_reply(stream_id, false, out);
                false
            }
            Target::New => {
                self.streams.validate_remote_id(stream_id)?;
                if self.goaway_sent.is_some_and(|last| stream_id > last) {
                    self.streams.create_refused(stream_id, now);
                    false
                } else if self.streams.remote_limit_reached() {
                    self.streams.create_refused(stream_id, now);
                    out.push(Event::Transmit(Frame::rst_stream(
                        stream_id,
                        ErrorCode::RefusedStream,
                    )));
                    false
                } else {
                    let stream = self.streams.create_remote(stream_id);
                    if let Some(priority) = frame.priority {
                        if priority.stream_dependency != stream_id {
                            stream.set_priority(priority);
                        }
                    }
                    self.transition(stream_id, FrameType::Headers, flags, Direction::Recv, now)?;
                    true
                }
            }
        };

        let end_stream = flags.is_end_stream();
        if flags.is_end_headers() {
            out.push(Event::Headers {
                stream_id,
                block: frame.header_block,
                end_stream,
                accepted,
            });
        } else {
            self.continuation = Some(PendingBlock {
                stream_id,
                promised_stream_id: None,
                block: BytesMut::from(&frame.header_block[..]),
                end_stream,
                accepted,
            });
        }
        Ok(())
    }

    fn recv_continuation(
        &mut self,
        frame: ContinuationFrame,
        flags: FrameFlags,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        let mut pending = self
            .continuation
            .take()
            .ok_or_else(|| Error::Protocol("CONTINUATION without open header block".to_string()))?;

        if pending.block.len() + frame.header_block.len() > MAX_HEADER_BLOCK_SIZE {
            return Err(Error::Protocol(format!(
                "header block for stream {} exceeds {} bytes",
                pending.stream_id, MAX_HEADER_BLOCK_SIZE
            )));
        }
        pending.block.extend_from_slice(&frame.header_block);

        if !flags.is_end_headers() {
            self.continuation = Some(pending);
            return Ok(());
        }

        let block = pending.block.freeze();
        match pending.promised_stream_id {
            Some(promised_stream_id) => out.push(Event::PushPromise {
                stream_id: pending.stream_id,
                promised_stream_id,
                block,
            }),
            None => out.push(Event::Headers {
                stream_id: pending.stream_id,
                block,
                end_stream: pending.end_stream,
                accepted: pending.accepted,
            }),
        }
        Ok(())
    }

    fn recv_push_promise(
        &mut self,
        stream_id: StreamId,
        frame: PushPromiseFrame,
        flags: FrameFlags,
        now: Instant,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        if !self.config.role.is_client() {
            return Err(Error::Protocol("PUSH_PROMISE sent to a server".to_string()));
        }
        if !self.local_settings.get_enable_push() {
            return Err(Error::Protocol("PUSH_PROMISE with push disabled".to_string()));
        }

        let associated = self.stream_state(stream_id);
        if !matches!(
            associated,
            Some(StreamState::Open) | Some(StreamState::HalfClosedLocal)
        ) {
            return Err(Error::Protocol(format!(
                "PUSH_PROMISE on stream {} in state {:?}",
                stream_id, associated
            )));
        }

        let promised = frame.promised_stream_id;
        self.streams.validate_remote_id(promised)?;
        self.streams.create_remote(promised);
        self.transition(promised, FrameType::PushPromise, flags, Direction::Recv, now)?;

        if flags.is_end_headers() {
            out.push(Event::PushPromise {
                stream_id,
                promised_stream_id: promised,
                block: frame.header_block,
            });
        } else {
            self.continuation = Some(PendingBlock {
                stream_id,
                promised_stream_id: Some(promised),
                block: BytesMut::from(&frame.header_block[..]),
                end_stream: false,
                accepted: true,
            });
        }
        Ok(())
    }

    fn recv_data(
        &mut self,
        stream_id: StreamId,
        frame: DataFrame,
        length: usize,
        flags: FrameFlags,
        now: Instant,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        let target = self.classify(stream_id, now);
        if let Target::New = target {
            return Err(Error::Protocol(format!("DATA on idle stream {}", stream_id)));
        }

        // Padding counts against the window
        if let Some(increment) = self.window.consume_recv(length)? {
            out.push(Event::Transmit(Frame::window_update(
                CONNECTION_STREAM_ID,
                increment,
            )));
        }

        match target {
            Target::Known => {
                let state = self.transition(stream_id, FrameType::Data, flags, Direction::Recv, now)?;
                let increment = match self.streams.get_stream_mut(stream_id) {
                    Some(stream) => stream.window_mut().consume_recv(length)?,
                    None => None,
                };
                if let Some(increment) = increment {
                    if state.can_receive() {
                        out.push(Event::Transmit(Frame::window_update(stream_id, increment)));
                    }
                }

                let end_stream = flags.is_end_stream();
                if !frame.data.is_empty() || end_stream {
                    out.push(Event::Data {
                        stream_id,
                        data: frame.data,
                        end_stream,
                    });
                }
            }
            Target::Closed { in_grace } => self.stream_closed_reply(stream_id, in_grace, out),
            Target::Purged => self.stream_closed_reply(stream_id, false, out),
            Target::New => {}
        }
        Ok(())
    }

    fn recv_priority(
        &mut self,
        stream_id: StreamId,
        frame: PriorityFrame,
        flags: FrameFlags,
        now: Instant,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        let known = matches!(self.classify(stream_id, now), Target::Known);

        if frame.priority.stream_dependency == stream_id {
            out.push(Event::Transmit(Frame::rst_stream(
                stream_id,
                ErrorCode::ProtocolError,
            )));
            if known && self.stream_state(stream_id) != Some(StreamState::Idle) {
                self.transition(stream_id, FrameType::RstStream, flags, Direction::Send, now)?;
                out.push(Event::Reset {
                    stream_id,
                    code: ErrorCode::ProtocolError,
                });
            }
            return Ok(());
        }

        if known {
            self.transition(stream_id, FrameType::Priority, flags, Direction::Recv, now)?;
            if let Some(stream) = self.streams.get_stream_mut(stream_id) {
                stream.set_priority(frame.priority);
            }
        }
        Ok(())
    }

    fn recv_rst_stream(
        &mut self,
        stream_id: StreamId,
        frame: RstStreamFrame,
        flags: FrameFlags,
        now: Instant,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        match self.classify(stream_id, now) {
            Target::Known => {
                self.transition(stream_id, FrameType::RstStream, flags, Direction::Recv, now)?;
                out.push(Event::Reset {
                    stream_id,
                    code: frame.error_code,
                });
            }
            // Never answer a reset with a reset
            Target::Closed { .. } | Target::Purged => {}
            Target::New => {
                return Err(Error::Protocol(format!(
                    "RST_STREAM on idle stream {}",
                    stream_id
                )))
            }
        }
        Ok(())
    }

    /// Allocate a new local stream
    pub fn open_stream(&mut self) -> Result<StreamId> {
        if let Some((last_stream_id, code)) = self.goaway_received {
            return Err(Error::GoAway {
                last_stream_id,
                code,
            });
        }
        if self.goaway_sent.is_some() {
            return Err(Error::ConnectionClosed);
        }
        self.streams.create_stream()
    }

    /// Frame a header block for `stream_id`
    ///
    /// Blocks larger than the peer's MAX_FRAME_SIZE become HEADERS plus
    /// CONTINUATION frames; they must be written back to back.
    pub fn prepare_headers(
        &mut self,
        stream_id: StreamId,
        mut block: Bytes,
        end_stream: bool,
        now: Instant,
    ) -> Result<Vec<Frame>> {
        let flags = FrameFlags::empty().with(FrameFlags::END_STREAM, end_stream);
        self.transition(stream_id, FrameType::Headers, flags, Direction::Send, now)?;

        let max = self.remote_settings.get_max_frame_size() as usize;
        let first = block.split_to(block.len().min(max));
        let mut frames = vec![Frame::headers(stream_id, first, end_stream, block.is_empty())];
        while !block.is_empty() {
            let chunk = block.split_to(block.len().min(max));
            frames.push(Frame::continuation(stream_id, chunk, block.is_empty()));
        }
        Ok(frames)
    }

    /// Frame as much of `data` as the windows allow
    ///
    /// Sent bytes are split off the front of `data`; whatever remains must
    /// wait for a WINDOW_UPDATE or SETTINGS change. END_STREAM goes on the
    /// frame carrying the last byte, or on an empty frame when `data` is
    /// already empty.
    pub fn prepare_data(
        &mut self,
        stream_id: StreamId,
        data: &mut Bytes,
        end_stream: bool,
        now: Instant,
    ) -> Result<Vec<Frame>> {
        let max_frame = self.remote_settings.get_max_frame_size() as usize;
        let mut frames = Vec::new();

        loop {
            let stream = self
                .streams
                .get_stream(stream_id)
                .ok_or(Error::StreamNotFound(stream_id))?;
            if !stream.state().can_send() {
                return Err(Error::StreamClosed(stream_id));
            }

            if data.is_empty() {
                if end_stream {
                    let flags = FrameFlags::from_u8(FrameFlags::END_STREAM);
                    self.transition(stream_id, FrameType::Data, flags, Direction::Send, now)?;
                    frames.push(Frame::data(stream_id, Bytes::new(), true));
                }
                break;
            }

            let available = max_frame
                .min(stream.window().available_send())
                .min(self.window.available_send());
            if available == 0 {
                break;
            }

            let chunk = data.split_to(data.len().min(available));
            let last = data.is_empty() && end_stream;

            self.window.consume_send(chunk.len())?;
            if let Some(stream) = self.streams.get_stream_mut(stream_id) {
                stream.window_mut().consume_send(chunk.len())?;
            }
            let flags = FrameFlags::empty().with(FrameFlags::END_STREAM, last);
            self.transition(stream_id, FrameType::Data, flags, Direction::Send, now)?;
            frames.push(Frame::data(stream_id, chunk, last));

            if data.is_empty() {
                break;
            }
        }

        Ok(frames)
    }

    /// Reset a stream from our side
    ///
    /// Returns `None` when the stream is already closed or unknown.
    pub fn reset_stream(
        &mut self,
        stream_id: StreamId,
        code: ErrorCode,
        now: Instant,
    ) -> Option<Frame> {
        match self.stream_state(stream_id) {
            None | Some(StreamState::Closed) | Some(StreamState::Idle) => None,
            Some(_) => {
                self.transition(
                    stream_id,
                    FrameType::RstStream,
                    FrameFlags::empty(),
                    Direction::Send,
                    now,
                )
                .ok()?;
                Some(Frame::rst_stream(stream_id, code))
            }
        }
    }

    /// PING request
    pub fn ping(&self, data: [u8; 8]) -> Frame {
        Frame::ping(data)
    }

    /// PRIORITY frame for one of our streams
    pub fn priority(&mut self, stream_id: StreamId, priority: PrioritySpec) -> Result<Frame> {
        if priority.stream_dependency == stream_id {
            return Err(Error::Protocol(format!(
                "stream {} cannot depend on itself",
                stream_id
            )));
        }
        if let Some(stream) = self.streams.get_stream_mut(stream_id) {
            stream.set_priority(priority);
        }
        Ok(Frame::priority(stream_id, priority))
    }

    /// GOAWAY carrying the highest peer stream we processed
    pub fn goaway(&mut self, code: ErrorCode, debug_data: Bytes) -> Frame {
        let last = self.streams.last_processed_id();
        self.goaway_sent = Some(last);
        Frame::goaway(last, code, debug_data)
    }

    /// Initiating server push is not supported
    pub fn push_promise(&mut self, _stream_id: StreamId, _block: Bytes) -> Result<Vec<Frame>> {
        Err(Error::PushNotSupported)
    }

    /// Run timers: SETTINGS ACK deadline and closed-stream purge
    pub fn poll_timeout(&mut self, now: Instant) -> Result<()> {
        if let Some((_, sent)) = self.pending_settings.front() {
            if now.saturating_duration_since(*sent) >= self.config.settings_timeout {
                return Err(Error::SettingsTimeout);
            }
        }
        self.streams.purge_closed(now);
        Ok(())
    }
}
