//! HTTP/2 connection integration tests
//!
//! These tests verify end-to-end connection behavior:
//! - Preface and SETTINGS exchange between two protocol cores
//! - Request/response over HPACK-encoded header blocks
//! - Flow-control balance across both peers
//! - Connection-fatal errors and the GOAWAY they produce
//! - The threaded multiplexer over Unix and TCP sockets
//! - The cleartext upgrade handshake

use bytes::Bytes;
use h2engine::http::h2::codec::FrameCodec;
use h2engine::http::h2::connection::{Event, H2Connection};
use h2engine::http::h2::upgrade::{client_upgrade, server_upgrade};
use h2engine::http::h2::*;
use h2engine::http::{strip_pseudo_headers, Url};
use h2engine::net;
use std::io::Write;
use std::net::SocketAddr;
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

/// Pass frames through the wire codec, as a socket would
fn wire(frames: Vec<Frame>) -> Vec<Frame> {
    let mut bytes = Vec::new();
    FrameCodec::write_frames(&mut bytes, &frames).unwrap();
    let codec = FrameCodec::new();
    let mut reader = &bytes[..];
    let mut out = Vec::new();
    while !reader.is_empty() {
        out.push(codec.read_frame(&mut reader).unwrap());
    }
    out
}

/// Feed frames to `conn`; returns its events minus the frames it transmits
fn feed(conn: &mut H2Connection, frames: Vec<Frame>) -> (Vec<Event>, Vec<Frame>) {
    let mut events = Vec::new();
    let mut replies = Vec::new();
    for frame in wire(frames) {
        for event in conn.recv_frame(frame, Instant::now()).unwrap() {
            match event {
                Event::Transmit(frame) => replies.push(frame),
                other => events.push(other),
            }
        }
    }
    (events, replies)
}

fn handshake() -> (H2Connection, H2Connection) {
    let mut client = H2Connection::new(ConnectionConfig::client());
    let mut server = H2Connection::new(ConnectionConfig::server());
    let now = Instant::now();

    let client_frames = client.start(now);
    let server_frames = server.start(now);

    let (_, server_acks) = feed(&mut server, client_frames);
    let (_, client_acks) = feed(&mut client, server_frames);
    assert_eq!(server_acks, vec![Frame::settings_ack()]);
    assert_eq!(client_acks, vec![Frame::settings_ack()]);

    feed(&mut server, client_acks);
    feed(&mut client, server_acks);
    (client, server)
}

#[test]
fn test_request_response_between_cores() {
    let (mut client, mut server) = handshake();
    let mut client_hpack = HpackCodec::new();
    let mut server_hpack = HpackCodec::new();
    let now = Instant::now();

    let request = h2engine::http::prefix_pseudo_headers(&[
        ("method", "GET"),
        ("path", "/index.html"),
        ("scheme", "http"),
        ("authority", "go.com"),
    ]);
    let id = client.open_stream().unwrap();
    assert_eq!(id, 1);
    let block = client_hpack.encode(&request).unwrap();
    let frames = client.prepare_headers(id, block, true, now).unwrap();

    let (events, _) = feed(&mut server, frames);
    let (block, end_stream) = match &events[..] {
        [Event::Headers {
            stream_id: 1,
            block,
            end_stream,
            accepted: true,
        }] => (block.clone(), *end_stream),
        other => panic!("unexpected events {:?}", other),
    };
    assert!(end_stream);
    let headers = strip_pseudo_headers(server_hpack.decode(&block).unwrap());
    assert_eq!(headers.get("path"), Some("/index.html"));
    assert_eq!(server.stream_state(1), Some(StreamState::HalfClosedRemote));

    let response = h2engine::http::prefix_pseudo_headers(&[("status", "200")]);
    let mut frames = server
        .prepare_headers(1, server_hpack.encode(&response).unwrap(), false, now)
        .unwrap();
    let mut body = Bytes::from_static(b"hello");
    frames.extend(server.prepare_data(1, &mut body, true, now).unwrap());
    assert_eq!(server.stream_state(1), Some(StreamState::Closed));

    let (events, _) = feed(&mut client, frames);
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1],
        Event::Data {
            stream_id: 1,
            data: Bytes::from_static(b"hello"),
            end_stream: true,
        }
    );
    assert_eq!(client.stream_state(1), Some(StreamState::Closed));
}

#[test]
fn test_connection_window_is_conserved() {
    let (mut client, mut server) = handshake();
    let now = Instant::now();

    let id = client.open_stream().unwrap();
    let frames = client.prepare_headers(id, Bytes::new(), false, now).unwrap();
    feed(&mut server, frames);

    let mut body = Bytes::from(vec![0xAB; 50_000]);
    let frames = client.prepare_data(id, &mut body, false, now).unwrap();
    assert!(body.is_empty());
    assert_eq!(client.window().available_send(), 65535 - 50_000);

    let (events, updates) = feed(&mut server, frames);
    let received: usize = events
        .iter()
        .map(|e| match e {
            Event::Data { data, .. } => data.len(),
            _ => 0,
        })
        .sum();
    assert_eq!(received, 50_000);

    let credited: u32 = updates
        .iter()
        .filter_map(|f| match f.kind() {
            FrameKind::WindowUpdate(w) if f.stream_id() == 0 => Some(w.increment),
            _ => None,
        })
        .sum();
    assert_eq!(credited, 32768);

    feed(&mut client, updates);
    // Sender's view of the window matches the receiver's
    assert_eq!(client.window().peer_current_size(), server.window().current_size());
    assert_eq!(
        client.window().available_send(),
        65535 - 50_000 + credited as usize
    );
}

#[test]
fn test_data_on_idle_stream_produces_goaway() {
    let (_, mut server) = handshake();
    let frame = wire(vec![Frame::data(1, Bytes::from_static(b"x"), false)]).remove(0);
    let err = server.recv_frame(frame, Instant::now()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ProtocolError);

    let goaway = server.goaway(err.code(), Bytes::new());
    match goaway.kind() {
        FrameKind::Goaway(f) => {
            assert_eq!(f.error_code, ErrorCode::ProtocolError);
            assert_eq!(f.last_stream_id, 0);
        }
        other => panic!("expected GOAWAY, got {:?}", other),
    }
}

#[test]
fn test_local_settings_apply_on_ack() {
    let config = ConnectionBuilder::new(Role::Server)
        .initial_window_size(1 << 20)
        .build()
        .unwrap();
    let mut server = H2Connection::new(config);
    let mut client = H2Connection::new(ConnectionConfig::client());
    let now = Instant::now();

    let server_frames = server.start(now);
    feed(&mut server, client.start(now));
    let (_, ack) = feed(&mut client, server_frames);

    // Client now sends with the larger window; server accepts after the ACK
    assert_eq!(server.local_settings().get_initial_window_size(), 65535);
    feed(&mut server, ack);
    assert_eq!(server.local_settings().get_initial_window_size(), 1 << 20);

    let id = client.open_stream().unwrap();
    assert_eq!(client.send_capacity(id), 65535); // connection window still limits
}

#[test]
fn test_large_header_block_uses_continuation() {
    let (mut client, mut server) = handshake();
    let mut hpack = HpackCodec::new();
    let mut peer_hpack = HpackCodec::new();

    let big = "v".repeat(40_000);
    let headers = vec![
        (":method".to_string(), "GET".to_string()),
        ("x-big".to_string(), big.clone()),
    ];
    let id = client.open_stream().unwrap();
    let frames = client
        .prepare_headers(id, hpack.encode(&headers).unwrap(), true, Instant::now())
        .unwrap();
    assert!(frames.len() >= 2);
    assert!(frames[1..]
        .iter()
        .all(|f| f.frame_type() == FrameType::Continuation));

    let (events, _) = feed(&mut server, frames);
    match &events[..] {
        [Event::Headers { block, .. }] => {
            let decoded = peer_hpack.decode(block).unwrap();
            assert_eq!(decoded[1].1, big);
        }
        other => panic!("unexpected events {:?}", other),
    }
}

fn unix_pair() -> (Connection, Connection) {
    let (a, b) = UnixStream::pair().unwrap();
    let client = Connection::client(a, ConnectionConfig::client()).unwrap();
    let server = Connection::server(b, ConnectionConfig::server()).unwrap();
    (client, server)
}

fn next_event(handle: &StreamHandle) -> StreamEvent {
    handle.recv_timeout(WAIT).unwrap()
}

/// Serve one stream: echo the request body back with status 200
fn echo_one(server: &Connection) {
    let stream = server.accept_timeout(WAIT).unwrap();
    let mut body = Vec::new();
    let mut done = match next_event(&stream) {
        StreamEvent::Headers { end_stream, .. } => end_stream,
        other => panic!("expected headers, got {:?}", other),
    };
    while !done {
        match next_event(&stream) {
            StreamEvent::Data { data, end_stream } => {
                body.extend_from_slice(&data);
                done = end_stream;
            }
            other => panic!("expected data, got {:?}", other),
        }
    }
    stream.send_headers(&[("status", "200")], false).unwrap();
    stream.send_data(body, true).unwrap();
}

fn read_response(handle: &StreamHandle) -> (String, Vec<u8>) {
    let status = match next_event(handle) {
        StreamEvent::Headers { headers, .. } => headers.get("status").unwrap_or("").to_string(),
        other => panic!("expected headers, got {:?}", other),
    };
    let mut body = Vec::new();
    loop {
        match next_event(handle) {
            StreamEvent::Data { data, end_stream } => {
                body.extend_from_slice(&data);
                if end_stream {
                    return (status, body);
                }
            }
            other => panic!("expected data, got {:?}", other),
        }
    }
}

fn request_headers() -> [(&'static str, &'static str); 4] {
    [
        ("method", "POST"),
        ("scheme", "http"),
        ("path", "/echo"),
        ("authority", "localhost"),
    ]
}

#[test]
fn test_driver_echo() {
    let (client, server) = unix_pair();
    let server_thread = thread::spawn(move || {
        echo_one(&server);
        server
    });

    let handle = client.open_stream(&request_headers(), false).unwrap();
    assert_eq!(handle.id(), 1);
    handle.send_data(&b"hello"[..], true).unwrap();
    let (status, body) = read_response(&handle);
    assert_eq!(status, "200");
    assert_eq!(body, b"hello");

    drop(handle);
    let server = server_thread.join().unwrap();
    client.close().unwrap();
    assert!(matches!(server.accept_timeout(WAIT), Err(Error::ConnectionClosed)));
}

#[test]
fn test_driver_flow_controlled_body() {
    let (client, server) = unix_pair();
    let server_thread = thread::spawn(move || {
        echo_one(&server);
        server
    });

    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let handle = client.open_stream(&request_headers(), false).unwrap();
    handle.send_data(payload.clone(), true).unwrap();
    let (_, body) = read_response(&handle);
    assert_eq!(body, payload);

    drop(handle);
    let _server = server_thread.join().unwrap();
    client.close().unwrap();
}

#[test]
fn test_driver_concurrent_streams() {
    let (client, server) = unix_pair();
    let server_thread = thread::spawn(move || {
        for _ in 0..3 {
            echo_one(&server);
        }
        server
    });

    let handles: Vec<StreamHandle> = (0..3)
        .map(|_| client.open_stream(&request_headers(), false).unwrap())
        .collect();
    let ids: Vec<StreamId> = handles.iter().map(|h| h.id()).collect();
    assert_eq!(ids, vec![1, 3, 5]);

    for (i, handle) in handles.iter().enumerate() {
        handle.send_data(format!("body-{}", i), true).unwrap();
    }
    for (i, handle) in handles.iter().enumerate() {
        let (_, body) = read_response(handle);
        assert_eq!(body, format!("body-{}", i).into_bytes());
    }

    drop(handles);
    let _server = server_thread.join().unwrap();
    client.close().unwrap();
}

#[test]
fn test_driver_ping() {
    let (client, _server) = unix_pair();
    let rtt = client.ping().unwrap();
    assert!(rtt < WAIT);
}

#[test]
fn test_driver_cancel_resets_peer() {
    let (client, server) = unix_pair();

    let handle = client.open_stream(&request_headers(), false).unwrap();
    let stream = server.accept_timeout(WAIT).unwrap();
    assert!(matches!(next_event(&stream), StreamEvent::Headers { .. }));

    handle.cancel();
    assert_eq!(next_event(&stream), StreamEvent::Reset(ErrorCode::Cancel));
}

#[test]
fn test_driver_goaway_on_protocol_error() {
    let (mut raw, b) = UnixStream::pair().unwrap();
    raw.write_all(CONNECTION_PREFACE).unwrap();
    let _server = Connection::server(b, ConnectionConfig::server()).unwrap();

    FrameCodec::write_frames(
        &mut raw,
        &[
            Frame::settings(Settings::new()),
            Frame::data(1, Bytes::from_static(b"x"), false),
        ],
    )
    .unwrap();

    raw.set_read_timeout(Some(WAIT)).unwrap();
    let codec = FrameCodec::new();
    loop {
        let frame = codec.read_frame(&mut raw).unwrap();
        if let FrameKind::Goaway(f) = frame.kind() {
            assert_eq!(f.error_code, ErrorCode::ProtocolError);
            assert_eq!(f.last_stream_id, 0);
            break;
        }
    }
}

#[test]
fn test_driver_bad_preface() {
    let (mut raw, b) = UnixStream::pair().unwrap();
    raw.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let err = Connection::server(b, ConnectionConfig::server()).err().unwrap();
    assert!(matches!(err, Error::MissingPreface));
}

fn loopback() -> (std::net::TcpListener, SocketAddr) {
    let listener = net::listen("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[test]
fn test_driver_over_tcp() {
    let (listener, addr) = loopback();
    let server_thread = thread::spawn(move || {
        let (socket, _) = net::accept(&listener).unwrap();
        let server = Connection::server(socket, ConnectionConfig::server()).unwrap();
        echo_one(&server);
        server
    });

    let socket = net::connect_addr(addr, WAIT).unwrap();
    let client = Connection::client(socket, ConnectionConfig::client()).unwrap();
    let handle = client.open_stream(&request_headers(), false).unwrap();
    handle.send_data(&b"over tcp"[..], true).unwrap();
    assert_eq!(read_response(&handle).1, b"over tcp");

    drop(handle);
    let _server = server_thread.join().unwrap();
    client.close().unwrap();
}

#[test]
fn test_upgrade_then_h2() {
    let (listener, addr) = loopback();
    let server_thread = thread::spawn(move || {
        let (mut socket, _) = net::accept(&listener).unwrap();
        let upgrade = server_upgrade(&mut socket).unwrap();
        assert_eq!(upgrade.path, "/up");
        assert_eq!(upgrade.token, "h2-10");
        assert_eq!(upgrade.settings.max_concurrent_streams, Some(100));

        let server = Connection::server(socket, ConnectionConfig::server()).unwrap();
        echo_one(&server);
        server
    });

    let url = Url::parse(&format!("http://127.0.0.1:{}/up", addr.port())).unwrap();
    let mut socket = net::connect(&url, WAIT).unwrap();
    let config = ConnectionBuilder::new(Role::Client)
        .max_concurrent_streams(100)
        .build()
        .unwrap();
    client_upgrade(&mut socket, &url, &config.settings, &config.upgrade_token).unwrap();

    let client = Connection::client(socket, config).unwrap();
    let handle = client.open_stream(&request_headers(), false).unwrap();
    handle.send_data(&b"upgraded"[..], true).unwrap();
    assert_eq!(read_response(&handle).1, b"upgraded");

    drop(handle);
    let _server = server_thread.join().unwrap();
    client.close().unwrap();
}
