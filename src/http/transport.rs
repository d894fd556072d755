//! Transport abstraction
//!
//! The multiplexer runs its reader and writer on separate threads, so a
//! transport must be able to hand out independent handles onto the same
//! byte stream, and one of them must be able to shut the stream down to
//! unblock a pending read.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// A bidirectional byte stream usable by the connection threads
pub trait Transport: Read + Write + Send + Sized + 'static {
    /// Open another handle onto the same stream
    fn try_clone_transport(&self) -> io::Result<Self>;

    /// Shut down both directions, waking any blocked reader
    fn shutdown_transport(&self) -> io::Result<()>;

    /// Bound blocking reads; `None` blocks forever
    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn try_clone_transport(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_transport(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            // Already torn down by the peer
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

impl Transport for UnixStream {
    fn try_clone_transport(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_transport(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn set_read_deadline(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

/// Read exactly `buf.len()` bytes, mapping a clean EOF to `UnexpectedEof`
pub fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Connection closed",
                ))
            }
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_unix_clone_shares_stream() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut writer = a.try_clone_transport().unwrap();
        writer.write_all(b"Hello").unwrap();

        let mut buf = [0u8; 5];
        read_full(&mut b, &mut buf).unwrap();
        assert_eq!(&buf, b"Hello");
    }

    #[test]
    fn test_shutdown_wakes_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            // Hold the connection open without sending anything
            thread::sleep(Duration::from_millis(500));
            drop(stream);
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = stream.try_clone_transport().unwrap();
        let blocked = thread::spawn(move || {
            let mut buf = [0u8; 1];
            read_full(&mut reader, &mut buf)
        });

        thread::sleep(Duration::from_millis(50));
        stream.shutdown_transport().unwrap();

        let result = blocked.join().unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        handle.join().unwrap();
    }

    #[test]
    fn test_read_full_reports_eof() {
        let (a, mut b) = UnixStream::pair().unwrap();
        drop(a);
        let mut buf = [0u8; 4];
        let err = read_full(&mut b, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
