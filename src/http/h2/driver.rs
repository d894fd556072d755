//! Threaded connection multiplexer
//!
//! A [`Connection`] runs three threads around one [`H2Connection`]:
//!
//! - the reader decodes frames from the transport and forwards them,
//! - the writer serializes frame batches to the transport,
//! - the connection loop owns all protocol state and the header codec.
//!
//! They talk over bounded `std::sync::mpsc` channels only. Each stream is
//! exposed as a [`StreamHandle`] with its own bounded inbound channel;
//! handles send commands to the loop and wait for its reply.
//!
//! # Examples
//!
//! ```no_run
//! use h2engine::http::h2::{Connection, ConnectionConfig, StreamEvent};
//! use std::net::TcpStream;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:8080")?;
//! let conn = Connection::client(stream, ConnectionConfig::client())?;
//!
//! let request = [
//!     ("method", "GET"),
//!     ("scheme", "http"),
//!     ("path", "/"),
//!     ("authority", "127.0.0.1"),
//! ];
//! let handle = conn.open_stream(&request, true)?;
//! while let Ok(event) = handle.recv() {
//!     if let StreamEvent::Data { end_stream: true, .. } = event {
//!         break;
//!     }
//! }
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

use super::codec::FrameCodec;
use super::config::{ConnectionConfig, Role};
use super::connection::{read_preface, write_preface, Event, H2Connection};
use super::error::{Error, ErrorCode, Result};
use super::frames::{Frame, FrameType};
use super::hpack::{HeaderCodec, HpackCodec};
use super::stream::{StreamId, StreamState};
use super::telemetry::Telemetry;
use crate::http::headers::{prefix_pseudo_headers, strip_pseudo_headers, HeaderList};
use crate::http::transport::Transport;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Interval at which the loop runs its timers when idle
const TICK: Duration = Duration::from_millis(50);

/// What a stream handler receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Headers {
        headers: HeaderList,
        end_stream: bool,
    },
    Data {
        data: Bytes,
        end_stream: bool,
    },
    /// Terminal: the stream was reset
    Reset(ErrorCode),
}

type Reply<T> = SyncSender<Result<T>>;

enum Command {
    Frame(Frame),
    ReadFailed(Error),
    WriteFailed(Error),
    OpenStream {
        headers: Vec<(String, String)>,
        end_stream: bool,
        reply: Reply<StreamHandle>,
    },
    SendHeaders {
        stream_id: StreamId,
        headers: Vec<(String, String)>,
        end_stream: bool,
        reply: Reply<()>,
    },
    SendData {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
        reply: Reply<()>,
    },
    Reset {
        stream_id: StreamId,
        code: ErrorCode,
    },
    Release {
        stream_id: StreamId,
    },
    Ping {
        reply: Reply<Duration>,
    },
    Close {
        reply: Option<Reply<()>>,
    },
}

/// Send a command and wait for the loop's answer
fn request<T>(
    commands: &SyncSender<Command>,
    build: impl FnOnce(Reply<T>) -> Command,
) -> Result<T> {
    let (tx, rx) = mpsc::sync_channel(1);
    commands
        .send(build(tx))
        .map_err(|_| Error::ConnectionClosed)?;
    rx.recv().map_err(|_| Error::ConnectionClosed)?
}

/// Upper-layer end of one stream
pub struct StreamHandle {
    stream_id: StreamId,
    commands: SyncSender<Command>,
    inbound: Receiver<StreamEvent>,
    released: bool,
}

impl StreamHandle {
    pub fn id(&self) -> StreamId {
        self.stream_id
    }

    /// Send a header list; names in the pseudo set get their `:` prefix
    pub fn send_headers<N, V>(&self, headers: &[(N, V)], end_stream: bool) -> Result<()>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let headers = prefix_pseudo_headers(headers);
        let stream_id = self.stream_id;
        request(&self.commands, |reply| Command::SendHeaders {
            stream_id,
            headers,
            end_stream,
            reply,
        })
    }

    /// Send a body chunk
    ///
    /// Blocks until every byte has been handed to the writer, which may
    /// take as long as the peer keeps the flow-control windows closed.
    pub fn send_data(&self, data: impl Into<Bytes>, end_stream: bool) -> Result<()> {
        let data = data.into();
        let stream_id = self.stream_id;
        request(&self.commands, |reply| Command::SendData {
            stream_id,
            data,
            end_stream,
            reply,
        })
    }

    /// Next inbound event
    ///
    /// Fails with [`Error::ConnectionClosed`] once the connection is gone
    /// or the stream has been dropped by the loop.
    pub fn recv(&self) -> Result<StreamEvent> {
        self.inbound.recv().map_err(|_| Error::ConnectionClosed)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<StreamEvent> {
        self.inbound.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::Timeout,
            RecvTimeoutError::Disconnected => Error::ConnectionClosed,
        })
    }

    /// Reset the stream with `code`, keeping the handle
    pub fn reset(&self, code: ErrorCode) -> Result<()> {
        self.commands
            .send(Command::Reset {
                stream_id: self.stream_id,
                code,
            })
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Abandon the stream with CANCEL
    pub fn cancel(self) {
        drop(self);
    }

    /// Drop without notifying the loop
    fn forget(mut self) {
        self.released = true;
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.commands.send(Command::Release {
                stream_id: self.stream_id,
            });
        }
    }
}

/// A running HTTP/2 connection
pub struct Connection {
    role: Role,
    commands: SyncSender<Command>,
    incoming: Receiver<StreamHandle>,
    event_loop: Option<JoinHandle<()>>,
}

impl Connection {
    /// Start the client side: writes the preface, then SETTINGS
    pub fn client<T: Transport>(transport: T, mut config: ConnectionConfig) -> Result<Self> {
        config.role = Role::Client;
        Self::start(transport, config)
    }

    /// Start the server side: reads and checks the preface first
    pub fn server<T: Transport>(transport: T, mut config: ConnectionConfig) -> Result<Self> {
        config.role = Role::Server;
        Self::start(transport, config)
    }

    /// Start the side given by `config.role`
    pub fn start<T: Transport>(mut transport: T, config: ConnectionConfig) -> Result<Self> {
        match config.role {
            Role::Client => write_preface(&mut transport)?,
            Role::Server => {
                transport.set_read_deadline(Some(config.settings_timeout))?;
                read_preface(&mut transport)?;
                transport.set_read_deadline(None)?;
            }
        }

        let capacity = config.channel_capacity;
        let role = config.role;
        let telemetry = config.telemetry.clone();
        let max_recv_frame = config.settings.get_max_frame_size();

        let mut conn = H2Connection::new(config);
        let (command_tx, command_rx) = mpsc::sync_channel(capacity);
        let (writer_tx, writer_rx) = mpsc::sync_channel(capacity);
        let (incoming_tx, incoming_rx) = mpsc::sync_channel(capacity);

        writer_tx
            .send(conn.start(Instant::now()))
            .map_err(|_| Error::ConnectionClosed)?;

        let reader = spawn_reader(
            transport.try_clone_transport()?,
            FrameCodec::with_max_frame_size(max_recv_frame),
            command_tx.clone(),
        )?;
        let writer = spawn_writer(
            transport.try_clone_transport()?,
            writer_rx,
            command_tx.clone(),
            telemetry.clone(),
        )?;

        let state = LoopState {
            conn,
            codec: HpackCodec::new(),
            commands: command_rx,
            command_tx: command_tx.clone(),
            writer: writer_tx,
            incoming: incoming_tx,
            streams: HashMap::new(),
            pending: VecDeque::new(),
            pings: HashMap::new(),
            next_ping: 0,
            close_waiters: Vec::new(),
            finished: false,
            telemetry: telemetry.clone(),
        };

        let event_loop = thread::Builder::new()
            .name("h2-connection".to_string())
            .spawn(move || {
                let code = state.run();
                // Dropping the loop state closes the writer channel and
                // unblocks a reader waiting on the command channel
                let _ = writer.join();
                let _ = transport.shutdown_transport();
                let _ = reader.join();
                telemetry.connection_closed(code);
            })?;

        Ok(Connection {
            role,
            commands: command_tx,
            incoming: incoming_rx,
            event_loop: Some(event_loop),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Open a stream by sending its request headers
    pub fn open_stream<N, V>(&self, headers: &[(N, V)], end_stream: bool) -> Result<StreamHandle>
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let headers = prefix_pseudo_headers(headers);
        request(&self.commands, |reply| Command::OpenStream {
            headers,
            end_stream,
            reply,
        })
    }

    /// Wait for the next peer-initiated stream
    pub fn accept(&self) -> Result<StreamHandle> {
        self.incoming.recv().map_err(|_| Error::ConnectionClosed)
    }

    pub fn accept_timeout(&self, timeout: Duration) -> Result<StreamHandle> {
        self.incoming.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::Timeout,
            RecvTimeoutError::Disconnected => Error::ConnectionClosed,
        })
    }

    /// Measure one PING round trip
    pub fn ping(&self) -> Result<Duration> {
        request(&self.commands, |reply| Command::Ping { reply })
    }

    /// Send GOAWAY(NO_ERROR), let open streams finish, then shut down
    pub fn close(mut self) -> Result<()> {
        let result = request(&self.commands, |reply| Command::Close { reply: Some(reply) });
        if let Some(handle) = self.event_loop.take() {
            let _ = handle.join();
        }
        match result {
            Err(Error::ConnectionClosed) => Ok(()),
            other => other,
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.event_loop.is_some() {
            let _ = self.commands.try_send(Command::Close { reply: None });
        }
    }
}

fn spawn_reader<T: Transport>(
    mut transport: T,
    codec: FrameCodec,
    commands: SyncSender<Command>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("h2-reader".to_string())
        .spawn(move || loop {
            match codec.read_frame(&mut transport) {
                Ok(frame) => {
                    if commands.send(Command::Frame(frame)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = commands.send(Command::ReadFailed(e));
                    return;
                }
            }
        })?;
    Ok(handle)
}

fn spawn_writer<T: Transport>(
    mut transport: T,
    batches: Receiver<Vec<Frame>>,
    commands: SyncSender<Command>,
    telemetry: Arc<dyn Telemetry>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("h2-writer".to_string())
        .spawn(move || {
            while let Ok(mut batch) = batches.recv() {
                loop {
                    match batches.try_recv() {
                        Ok(more) => batch.extend(more),
                        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                    }
                }
                drop_cancelled_data(&mut batch);

                if let Err(e) = FrameCodec::write_frames(&mut transport, &batch) {
                    let _ = commands.try_send(Command::WriteFailed(e));
                    // Keep draining so the loop never blocks on a dead writer
                    while batches.recv().is_ok() {}
                    return;
                }
                for frame in &batch {
                    telemetry.frame_sent(frame);
                }
            }
        })?;
    Ok(handle)
}

/// Remove DATA frames queued ahead of a RST_STREAM for the same stream
fn drop_cancelled_data(batch: &mut Vec<Frame>) {
    let mut reset = HashSet::new();
    let mut keep = vec![true; batch.len()];
    for (i, frame) in batch.iter().enumerate().rev() {
        match frame.frame_type() {
            FrameType::RstStream => {
                reset.insert(frame.stream_id());
            }
            FrameType::Data if reset.contains(&frame.stream_id()) => keep[i] = false,
            _ => {}
        }
    }
    let mut keep = keep.into_iter();
    batch.retain(|_| keep.next().unwrap_or(true));
}

/// Outbound body bytes waiting for window
struct PendingData {
    stream_id: StreamId,
    data: Bytes,
    end_stream: bool,
    reply: Reply<()>,
}

struct LoopState {
    conn: H2Connection,
    codec: HpackCodec,
    commands: Receiver<Command>,
    command_tx: SyncSender<Command>,
    writer: SyncSender<Vec<Frame>>,
    incoming: SyncSender<StreamHandle>,
    streams: HashMap<StreamId, SyncSender<StreamEvent>>,
    pending: VecDeque<PendingData>,
    pings: HashMap<[u8; 8], (Instant, Reply<Duration>)>,
    next_ping: u64,
    close_waiters: Vec<Reply<()>>,
    finished: bool,
    telemetry: Arc<dyn Telemetry>,
}

impl LoopState {
    /// Run until drained or failed; returns the GOAWAY code exchanged
    fn run(mut self) -> Option<ErrorCode> {
        match self.serve() {
            Ok(()) => {
                for waiter in self.close_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.conn
                    .goaway_received()
                    .map(|(_, code)| code)
                    .or(self.conn.goaway_sent().map(|_| ErrorCode::NoError))
            }
            Err(e) => {
                self.telemetry.connection_error(&e);
                let code = e.code();
                if !e.is_transport() {
                    let goaway = self.conn.goaway(code, Bytes::from(e.to_string()));
                    let _ = self.writer.send(vec![goaway]);
                }
                Some(code)
            }
        }
    }

    fn serve(&mut self) -> Result<()> {
        loop {
            match self.commands.recv_timeout(TICK) {
                Ok(command) => self.handle(command)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }

            let now = Instant::now();
            self.conn.poll_timeout(now)?;
            self.expire_pings(now);

            if self.finished || self.conn.is_drained() {
                return Ok(());
            }
        }
    }

    fn write(&self, frames: Vec<Frame>) -> Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        self.writer
            .send(frames)
            .map_err(|_| Error::ConnectionClosed)
    }

    fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Frame(frame) => {
                let events = self.conn.recv_frame(frame, Instant::now())?;
                self.dispatch(events)
            }
            Command::ReadFailed(e) | Command::WriteFailed(e) => {
                let goaway_seen =
                    self.conn.goaway_sent().is_some() || self.conn.goaway_received().is_some();
                if goaway_seen && e.is_transport() {
                    self.finished = true;
                    return Ok(());
                }
                Err(e)
            }
            Command::OpenStream {
                headers,
                end_stream,
                reply,
            } => match self.open_stream(headers, end_stream) {
                Ok(handle) => {
                    if let Err(mpsc::SendError(Ok(handle))) = reply.send(Ok(handle)) {
                        // Requester went away
                        let stream_id = handle.id();
                        handle.forget();
                        self.handle(Command::Release { stream_id })?;
                    }
                    Ok(())
                }
                Err(e) if is_fatal(&e) => Err(e),
                Err(e) => {
                    let _ = reply.send(Err(e));
                    Ok(())
                }
            },
            Command::SendHeaders {
                stream_id,
                headers,
                end_stream,
                reply,
            } => {
                let result = self.send_headers(stream_id, &headers, end_stream);
                match result {
                    Err(e) if is_fatal(&e) => Err(e),
                    other => {
                        let _ = reply.send(other);
                        Ok(())
                    }
                }
            }
            Command::SendData {
                stream_id,
                data,
                end_stream,
                reply,
            } => {
                self.pending.push_back(PendingData {
                    stream_id,
                    data,
                    end_stream,
                    reply,
                });
                self.flush_pending()
            }
            Command::Reset { stream_id, code } => {
                self.abort_pending(stream_id, code);
                let frame = self.conn.reset_stream(stream_id, code, Instant::now());
                self.write(frame.into_iter().collect())
            }
            Command::Release { stream_id } => {
                self.streams.remove(&stream_id);
                self.abort_pending(stream_id, ErrorCode::Cancel);
                let frame = self
                    .conn
                    .reset_stream(stream_id, ErrorCode::Cancel, Instant::now());
                self.write(frame.into_iter().collect())
            }
            Command::Ping { reply } => {
                self.next_ping += 1;
                let data = self.next_ping.to_be_bytes();
                self.pings.insert(data, (Instant::now(), reply));
                self.write(vec![self.conn.ping(data)])
            }
            Command::Close { reply } => {
                if let Some(reply) = reply {
                    self.close_waiters.push(reply);
                }
                if self.conn.goaway_sent().is_none() {
                    let goaway = self.conn.goaway(ErrorCode::NoError, Bytes::new());
                    self.write(vec![goaway])?;
                }
                Ok(())
            }
        }
    }

    fn open_stream(
        &mut self,
        headers: Vec<(String, String)>,
        end_stream: bool,
    ) -> Result<StreamHandle> {
        if !self.conn.role().is_client() {
            return Err(Error::PushNotSupported);
        }
        let stream_id = self.conn.open_stream()?;
        let handle = self.register(stream_id);
        self.send_headers(stream_id, &headers, end_stream)?;
        Ok(handle)
    }

    fn register(&mut self, stream_id: StreamId) -> StreamHandle {
        let (tx, rx) = mpsc::sync_channel(self.conn.config().channel_capacity);
        self.streams.insert(stream_id, tx);
        StreamHandle {
            stream_id,
            commands: self.command_tx.clone(),
            inbound: rx,
            released: false,
        }
    }

    fn send_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[(String, String)],
        end_stream: bool,
    ) -> Result<()> {
        // Encoding mutates the compression context, so refuse before it
        match self.conn.stream_state(stream_id) {
            Some(state) if state.can_send() || state == StreamState::Idle => {}
            _ => return Err(Error::StreamClosed(stream_id)),
        }
        let block = self.codec.encode(headers)?;
        let frames = self
            .conn
            .prepare_headers(stream_id, block, end_stream, Instant::now())?;
        self.write(frames)
    }

    /// Frame queued body data as far as the windows allow
    fn flush_pending(&mut self) -> Result<()> {
        let now = Instant::now();
        let mut blocked = HashSet::new();
        let mut remaining = VecDeque::with_capacity(self.pending.len());

        while let Some(mut entry) = self.pending.pop_front() {
            if blocked.contains(&entry.stream_id) {
                remaining.push_back(entry);
                continue;
            }
            match self
                .conn
                .prepare_data(entry.stream_id, &mut entry.data, entry.end_stream, now)
            {
                Ok(frames) => {
                    self.write(frames)?;
                    if entry.data.is_empty() {
                        let _ = entry.reply.send(Ok(()));
                    } else {
                        blocked.insert(entry.stream_id);
                        remaining.push_back(entry);
                    }
                }
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    let _ = entry.reply.send(Err(e));
                }
            }
        }

        self.pending = remaining;
        Ok(())
    }

    fn abort_pending(&mut self, stream_id: StreamId, code: ErrorCode) {
        let (aborted, kept): (VecDeque<_>, VecDeque<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.stream_id == stream_id);
        self.pending = kept;
        for entry in aborted {
            let _ = entry.reply.send(Err(Error::Reset { stream_id, code }));
        }
    }

    fn expire_pings(&mut self, now: Instant) {
        let timeout = self.conn.config().settings_timeout;
        let expired: Vec<[u8; 8]> = self
            .pings
            .iter()
            .filter(|(_, (sent, _))| now.saturating_duration_since(*sent) >= timeout)
            .map(|(data, _)| *data)
            .collect();
        for data in expired {
            if let Some((_, reply)) = self.pings.remove(&data) {
                let _ = reply.send(Err(Error::Timeout));
            }
        }
    }

    fn deliver(&mut self, stream_id: StreamId, event: StreamEvent) -> Result<()> {
        let Some(inbound) = self.streams.get(&stream_id) else {
            return Ok(());
        };
        match inbound.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Disconnected(_)) => {
                self.streams.remove(&stream_id);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.streams.remove(&stream_id);
                self.abort_pending(stream_id, ErrorCode::FlowControlError);
                let frame =
                    self.conn
                        .reset_stream(stream_id, ErrorCode::FlowControlError, Instant::now());
                self.write(frame.into_iter().collect())
            }
        }
    }

    fn dispatch(&mut self, events: Vec<Event>) -> Result<()> {
        let mut transmit = Vec::new();
        let mut flush = false;

        for event in events {
            match event {
                Event::Transmit(frame) => transmit.push(frame),
                Event::Headers {
                    stream_id,
                    block,
                    end_stream,
                    accepted,
                } => {
                    // Decoded even when dropped, to keep the table in sync
                    let headers = strip_pseudo_headers(self.codec.decode(&block)?);
                    if accepted {
                        self.stream_headers(stream_id, headers, end_stream, &mut transmit)?;
                    }
                }
                Event::PushPromise {
                    promised_stream_id,
                    block,
                    ..
                } => {
                    self.codec.decode(&block)?;
                    transmit.extend(self.conn.reset_stream(
                        promised_stream_id,
                        ErrorCode::RefusedStream,
                        Instant::now(),
                    ));
                }
                Event::Data {
                    stream_id,
                    data,
                    end_stream,
                } => self.deliver(stream_id, StreamEvent::Data { data, end_stream })?,
                Event::Reset { stream_id, code } => {
                    self.abort_pending(stream_id, code);
                    self.deliver(stream_id, StreamEvent::Reset(code))?;
                    self.streams.remove(&stream_id);
                }
                Event::Pong(data) => {
                    if let Some((sent, reply)) = self.pings.remove(&data) {
                        let _ = reply.send(Ok(sent.elapsed()));
                    }
                }
                Event::GoAway { .. } => {}
                Event::WindowUpdated { .. } | Event::SettingsChanged => flush = true,
            }
        }

        self.write(transmit)?;
        if flush {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn stream_headers(
        &mut self,
        stream_id: StreamId,
        headers: HeaderList,
        end_stream: bool,
        transmit: &mut Vec<Frame>,
    ) -> Result<()> {
        let event = StreamEvent::Headers {
            headers,
            end_stream,
        };
        if self.streams.contains_key(&stream_id) || self.conn.streams().is_local(stream_id) {
            return self.deliver(stream_id, event);
        }

        // First HEADERS of a peer stream
        let handle = self.register(stream_id);
        self.deliver(stream_id, event)?;
        match self.incoming.try_send(handle) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(handle)) | Err(TrySendError::Disconnected(handle)) => {
                handle.forget();
                self.streams.remove(&stream_id);
                transmit.extend(self.conn.reset_stream(
                    stream_id,
                    ErrorCode::RefusedStream,
                    Instant::now(),
                ));
                Ok(())
            }
        }
    }
}

/// Errors from a send operation that end the whole connection
fn is_fatal(error: &Error) -> bool {
    matches!(
        error,
        Error::Io(_) | Error::Compression(_) | Error::ConnectionClosed | Error::FlowControl(_)
    )
}
