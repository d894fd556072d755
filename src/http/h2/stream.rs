//! HTTP/2 stream management
//!
//! The seven-state stream lifecycle, the per-stream record owned by the
//! connection, and the stream table with its id allocation rules.

use super::error::{Error, Result};
use super::flow_control::Window;
use super::frames::{FrameFlags, FrameType, PrioritySpec};
use super::{DEFAULT_INITIAL_WINDOW_SIZE, MAX_STREAM_ID};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

/// Stream ID type
pub type StreamId = u32;

/// Which way a frame is travelling relative to this endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Recv => write!(f, "recv"),
        }
    }
}

/// Stream state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Idle: No frames have been sent/received
    Idle,
    /// Reserved (local): PUSH_PROMISE sent
    ReservedLocal,
    /// Reserved (remote): PUSH_PROMISE received
    ReservedRemote,
    /// Open: Both sides can send frames
    Open,
    /// Half-closed (local): We can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): They can't send, we can
    HalfClosedRemote,
    /// Closed: Stream is closed
    Closed,
}

impl StreamState {
    /// Check if stream can send data
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if stream can receive data
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }

    /// Open or half-closed; these count against MAX_CONCURRENT_STREAMS
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote
        )
    }

    /// Next state after a frame of `frame_type` with `flags` goes `direction`
    ///
    /// Connection-scoped frames and CONTINUATION leave the state alone.
    /// Frames arriving on a Closed stream are accepted here; the
    /// connection decides whether to ignore them or answer STREAM_CLOSED.
    pub fn transition(
        self,
        frame_type: FrameType,
        flags: FrameFlags,
        direction: Direction,
    ) -> Result<StreamState> {
        use Direction::*;
        use FrameType as T;
        use StreamState::*;

        if matches!(
            frame_type,
            T::Settings | T::Ping | T::Goaway | T::Continuation
        ) {
            return Ok(self);
        }

        let end_stream = frame_type.carries_end_stream() && flags.is_end_stream();

        if frame_type == T::RstStream && self != Idle {
            return Ok(Closed);
        }

        let next = match (self, frame_type, direction) {
            (Idle, T::Headers, Recv) if end_stream => Some(HalfClosedRemote),
            (Idle, T::Headers, Send) if end_stream => Some(HalfClosedLocal),
            (Idle, T::Headers, _) => Some(Open),
            (Idle, T::PushPromise, Recv) => Some(ReservedRemote),
            (Idle, T::PushPromise, Send) => Some(ReservedLocal),
            (Idle, T::Priority, _) => Some(Idle),

            (ReservedLocal, T::Headers, Send) if end_stream => Some(Closed),
            (ReservedLocal, T::Headers, Send) => Some(HalfClosedRemote),
            (ReservedLocal, T::Priority, _) | (ReservedLocal, T::WindowUpdate, Recv) => {
                Some(ReservedLocal)
            }

            (ReservedRemote, T::Headers, Recv) if end_stream => Some(Closed),
            (ReservedRemote, T::Headers, Recv) => Some(HalfClosedLocal),
            (ReservedRemote, T::Priority, _) | (ReservedRemote, T::WindowUpdate, Send) => {
                Some(ReservedRemote)
            }

            (Open, _, Recv) if end_stream => Some(HalfClosedRemote),
            (Open, _, Send) if end_stream => Some(HalfClosedLocal),
            (Open, _, _) => Some(Open),

            (HalfClosedLocal, _, Recv) if end_stream => Some(Closed),
            (HalfClosedLocal, _, Recv) => Some(HalfClosedLocal),
            (HalfClosedLocal, T::WindowUpdate | T::Priority, Send) => Some(HalfClosedLocal),

            (HalfClosedRemote, _, Send) if end_stream => Some(Closed),
            (HalfClosedRemote, _, Send) => Some(HalfClosedRemote),
            (HalfClosedRemote, T::WindowUpdate | T::Priority, Recv) => Some(HalfClosedRemote),

            (Closed, _, Recv) | (Closed, T::Priority, Send) => Some(Closed),

            _ => None,
        };

        next.ok_or_else(|| {
            Error::Protocol(format!(
                "{} {} not allowed in state {:?}",
                direction,
                frame_type.name(),
                self
            ))
        })
    }
}

/// HTTP/2 stream
#[derive(Debug)]
pub struct H2Stream {
    /// Stream ID
    id: StreamId,
    /// Stream state
    state: StreamState,
    /// Flow control for this stream
    window: Window,
    /// Priority information
    priority: Option<PrioritySpec>,
    /// When the stream entered Closed
    closed_at: Option<Instant>,
}

impl H2Stream {
    /// Create a new stream with default windows
    pub fn new(id: StreamId) -> Self {
        Self::with_window(id, Window::default())
    }

    /// Create a new stream with the given window
    pub fn with_window(id: StreamId, window: Window) -> Self {
        H2Stream {
            id,
            state: StreamState::Idle,
            window,
            priority: None,
            closed_at: None,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut Window {
        &mut self.window
    }

    /// Get priority
    pub fn priority(&self) -> Option<&PrioritySpec> {
        self.priority.as_ref()
    }

    /// Set priority
    pub fn set_priority(&mut self, priority: PrioritySpec) {
        self.priority = Some(priority);
    }

    pub fn closed_at(&self) -> Option<Instant> {
        self.closed_at
    }

    /// Run the state machine for one frame
    ///
    /// Returns the state before the frame alongside the new one.
    pub fn apply(
        &mut self,
        frame_type: FrameType,
        flags: FrameFlags,
        direction: Direction,
        now: Instant,
    ) -> Result<(StreamState, StreamState)> {
        let old = self.state;
        let new = old.transition(frame_type, flags, direction)?;
        self.set_state(new, now);
        Ok((old, new))
    }

    /// Force the stream closed (reset, refused, GOAWAY)
    pub fn close(&mut self, now: Instant) {
        self.set_state(StreamState::Closed, now);
    }

    fn set_state(&mut self, state: StreamState, now: Instant) {
        if state.is_closed() && self.closed_at.is_none() {
            self.closed_at = Some(now);
        }
        self.state = state;
    }
}

/// Stream manager
///
/// Owns every stream of a connection and enforces the id rules: the
/// parity of each initiator, strictly increasing ids, and the
/// concurrency limits advertised by both sides.
#[derive(Debug)]
pub struct StreamManager {
    /// Known streams, including recently closed ones
    streams: HashMap<StreamId, H2Stream>,
    /// Peer ids whose stream existed and was purged
    purged: HashSet<StreamId>,
    /// Whether local ids are odd
    is_client: bool,
    /// Next stream ID (client: odd, server: even)
    next_stream_id: StreamId,
    /// Highest peer-initiated id seen
    max_remote_id: StreamId,
    /// Highest peer-initiated id accepted for processing
    last_processed_id: StreamId,
    /// Peer's MAX_CONCURRENT_STREAMS, limits our streams
    max_concurrent_streams: Option<u32>,
    /// Our MAX_CONCURRENT_STREAMS, limits the peer's streams
    local_max_concurrent_streams: Option<u32>,
    /// Receive window for new streams
    local_initial_window: u32,
    /// Send window for new streams
    peer_initial_window: u32,
    /// How long a closed stream is kept around
    closed_stream_grace: Duration,
}

impl StreamManager {
    /// Create a new stream manager
    ///
    /// # Arguments
    /// * `is_client` - True if this is a client (odd stream IDs), false for server (even)
    pub fn new(is_client: bool) -> Self {
        StreamManager {
            streams: HashMap::new(),
            purged: HashSet::new(),
            is_client,
            next_stream_id: if is_client { 1 } else { 2 },
            max_remote_id: 0,
            last_processed_id: 0,
            max_concurrent_streams: None,
            local_max_concurrent_streams: None,
            local_initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
            peer_initial_window: DEFAULT_INITIAL_WINDOW_SIZE,
            closed_stream_grace: Duration::from_secs(2),
        }
    }

    /// Set the peer's limit on streams we open
    pub fn set_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.max_concurrent_streams = max;
    }

    /// Get maximum concurrent streams
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Set our limit on streams the peer opens
    pub fn set_local_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.local_max_concurrent_streams = max;
    }

    pub fn set_local_initial_window(&mut self, size: u32) {
        self.local_initial_window = size;
    }

    pub fn set_peer_initial_window(&mut self, size: u32) {
        self.peer_initial_window = size;
    }

    pub fn set_closed_stream_grace(&mut self, grace: Duration) {
        self.closed_stream_grace = grace;
    }

    /// Whether `stream_id` has our parity
    pub fn is_local(&self, stream_id: StreamId) -> bool {
        (stream_id % 2 == 1) == self.is_client
    }

    /// Get next stream ID (without incrementing)
    pub fn peek_next_stream_id(&self) -> StreamId {
        self.next_stream_id
    }

    /// Highest peer-initiated id accepted, as reported in GOAWAY
    pub fn last_processed_id(&self) -> StreamId {
        self.last_processed_id
    }

    fn new_stream(&self, id: StreamId) -> H2Stream {
        H2Stream::with_window(
            id,
            Window::new(self.local_initial_window, self.peer_initial_window),
        )
    }

    /// Allocate the next local id and create its stream
    pub fn create_stream(&mut self) -> Result<StreamId> {
        if let Some(max) = self.max_concurrent_streams {
            if self.active_local_count() >= max as usize {
                return Err(Error::TooManyStreams);
            }
        }
        if self.next_stream_id > MAX_STREAM_ID {
            return Err(Error::InvalidStreamId(self.next_stream_id));
        }

        let stream_id = self.next_stream_id;
        self.next_stream_id += 2; // Skip even for client, odd for server

        let stream = self.new_stream(stream_id);
        self.streams.insert(stream_id, stream);

        Ok(stream_id)
    }

    /// Check a never-seen peer id and record it
    ///
    /// The id must have the peer's parity and exceed every id the peer
    /// has used before.
    pub fn validate_remote_id(&mut self, stream_id: StreamId) -> Result<()> {
        if stream_id == 0 || self.is_local(stream_id) {
            return Err(Error::Protocol(format!(
                "stream {} has the wrong parity for a peer-initiated stream",
                stream_id
            )));
        }
        if stream_id <= self.max_remote_id {
            return Err(Error::Protocol(format!(
                "stream {} not above previous peer stream {}",
                stream_id, self.max_remote_id
            )));
        }
        self.max_remote_id = stream_id;
        Ok(())
    }

    /// Whether a new peer stream would exceed our advertised limit
    pub fn remote_limit_reached(&self) -> bool {
        match self.local_max_concurrent_streams {
            Some(max) => self.active_remote_count() >= max as usize,
            None => false,
        }
    }

    /// Create a stream for a validated peer id
    pub fn create_remote(&mut self, stream_id: StreamId) -> &mut H2Stream {
        self.last_processed_id = self.last_processed_id.max(stream_id);
        let stream = self.new_stream(stream_id);
        self.streams.entry(stream_id).or_insert(stream)
    }

    /// Remember a refused or ignored peer stream as already closed
    ///
    /// Late frames for it then fall under the closed-stream grace period.
    /// It does not count as processed.
    pub fn create_refused(&mut self, stream_id: StreamId, now: Instant) {
        let mut stream = self.new_stream(stream_id);
        stream.close(now);
        self.streams.insert(stream_id, stream);
    }

    /// Whether a stream with this id existed, even if since purged
    ///
    /// Peer ids that were skipped over never existed: a later HEADERS on
    /// one of them is an ordering violation, not a late frame.
    pub fn was_used(&self, stream_id: StreamId) -> bool {
        if self.streams.contains_key(&stream_id) {
            return true;
        }
        if self.is_local(stream_id) {
            stream_id < self.next_stream_id
        } else {
            self.purged.contains(&stream_id)
        }
    }

    /// Get a stream by ID
    pub fn get_stream(&self, stream_id: StreamId) -> Option<&H2Stream> {
        self.streams.get(&stream_id)
    }

    /// Get a mutable stream by ID
    pub fn get_stream_mut(&mut self, stream_id: StreamId) -> Option<&mut H2Stream> {
        self.streams.get_mut(&stream_id)
    }

    /// Remove a stream
    pub fn remove_stream(&mut self, stream_id: StreamId) -> Option<H2Stream> {
        let removed = self.streams.remove(&stream_id);
        if removed.is_some() && !self.is_local(stream_id) {
            self.purged.insert(stream_id);
        }
        removed
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut H2Stream> {
        self.streams.values_mut()
    }

    /// Get number of active streams
    pub fn active_stream_count(&self) -> usize {
        self.streams.values().filter(|s| s.state().is_active()).count()
    }

    fn active_local_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| s.state().is_active() && self.is_local(s.id()))
            .count()
    }

    fn active_remote_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| s.state().is_active() && !self.is_local(s.id()))
            .count()
    }

    /// Streams that are not yet closed
    pub fn open_stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self
            .streams
            .values()
            .filter(|s| !s.state().is_closed())
            .map(|s| s.id())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Get all stream IDs
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.keys().copied().collect()
    }

    /// Whether a closed stream is still inside its grace period
    pub fn in_grace(&self, stream_id: StreamId, now: Instant) -> bool {
        self.streams
            .get(&stream_id)
            .and_then(|s| s.closed_at())
            .is_some_and(|closed| now.saturating_duration_since(closed) < self.closed_stream_grace)
    }

    /// Drop closed streams whose grace period has elapsed
    pub fn purge_closed(&mut self, now: Instant) -> Vec<StreamId> {
        let grace = self.closed_stream_grace;
        let expired: Vec<StreamId> = self
            .streams
            .values()
            .filter(|s| {
                s.closed_at()
                    .is_some_and(|closed| now.saturating_duration_since(closed) >= grace)
            })
            .map(|s| s.id())
            .collect();
        for id in &expired {
            self.remove_stream(*id);
        }
        expired
    }
}
