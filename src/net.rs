//! Socket helpers
//!
//! Thin wrappers over `socket2` for the sockets an HTTP/2 endpoint wants:
//! Nagle disabled on streams, address reuse on listeners, bounded connects.

use crate::http::Url;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Default listen backlog
pub const DEFAULT_BACKLOG: i32 = 128;

/// Connect to `host:port` of a URL, trying each resolved address in turn
pub fn connect(url: &Url, timeout: Duration) -> io::Result<TcpStream> {
    let addrs = (url.host(), url.port()).to_socket_addrs()?;

    let mut last_error = None;
    for addr in addrs {
        match connect_addr(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}", url.authority()),
        )
    }))
}

/// Connect to a single address
pub fn connect_addr(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_nodelay(true)?;
    socket.connect_timeout(&SockAddr::from(addr), timeout)?;
    Ok(socket.into())
}

/// Bind a listening socket
pub fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(DEFAULT_BACKLOG)?;
    Ok(socket.into())
}

/// Accept one connection with Nagle disabled
pub fn accept(listener: &TcpListener) -> io::Result<(TcpStream, SocketAddr)> {
    let (stream, peer) = listener.accept()?;
    stream.set_nodelay(true)?;
    Ok((stream, peer))
}
