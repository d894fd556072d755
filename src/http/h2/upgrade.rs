//! Cleartext upgrade from HTTP/1.1
//!
//! # Client request
//!
//! ```http
//! GET / HTTP/1.1
//! Host: go.com
//! Connection: Upgrade, HTTP2-Settings
//! Upgrade: h2-10
//! HTTP2-Settings: AAMAAABkAAQAAP__
//! ```
//!
//! # Server response
//!
//! ```http
//! HTTP/1.1 101 Switching Protocols
//! Connection: Upgrade
//! Upgrade: h2-10
//! ```
//!
//! After the 101 both sides speak HTTP/2 on the same byte stream; the
//! client starts with the preface. The version token is configurable;
//! a server answers with whichever supported token the client offered.

use super::error::{Error, Result};
use super::settings::Settings;
use super::{DEFAULT_UPGRADE_TOKEN, UPGRADE_TOKEN_DRAFT_06, UPGRADE_TOKEN_DRAFT_09};
use crate::http::headers::HeaderList;
use crate::http::url::Url;
use crate::http::CRLF;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::BytesMut;
use std::io::{Read, Write};

/// Version tokens a server accepts
pub const SUPPORTED_UPGRADE_TOKENS: [&str; 3] = [
    DEFAULT_UPGRADE_TOKEN,
    UPGRADE_TOKEN_DRAFT_09,
    UPGRADE_TOKEN_DRAFT_06,
];

/// Longest request or response head accepted during the upgrade
const MAX_HEAD_SIZE: usize = 8192;

pub fn is_supported_token(token: &str) -> bool {
    SUPPORTED_UPGRADE_TOKENS
        .iter()
        .any(|t| t.eq_ignore_ascii_case(token))
}

/// `HTTP2-Settings` value: base64url of a SETTINGS payload, unpadded
pub fn encode_settings_header(settings: &Settings) -> String {
    let mut payload = BytesMut::with_capacity(settings.encoded_len());
    settings.encode_payload(&mut payload);
    URL_SAFE_NO_PAD.encode(&payload)
}

/// Inverse of [`encode_settings_header`]
pub fn decode_settings_header(value: &str) -> Result<Settings> {
    let payload = URL_SAFE_NO_PAD
        .decode(value.trim().trim_end_matches('='))
        .map_err(|e| Error::Upgrade(format!("bad HTTP2-Settings: {}", e)))?;
    Settings::decode_payload(&payload)
}

/// A validated upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub method: String,
    pub path: String,
    /// Token the client offered and the server echoed
    pub token: String,
    /// Client SETTINGS carried in `HTTP2-Settings`
    pub settings: Settings,
    pub headers: HeaderList,
}

/// Read one message head, stopping right after the blank line
///
/// Bytes past the head belong to HTTP/2 and must stay unread.
fn read_head<R: Read>(reader: &mut R) -> Result<String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_HEAD_SIZE {
            return Err(Error::Upgrade("message head too large".to_string()));
        }
        let n = reader.read(&mut byte)?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        head.push(byte[0]);
    }
    String::from_utf8(head).map_err(|_| Error::Upgrade("message head is not UTF-8".to_string()))
}

/// Split a head into its start line and header list
fn parse_head(head: &str) -> Result<(String, HeaderList)> {
    let mut lines = head.split(CRLF).filter(|l| !l.is_empty());
    let start = lines
        .next()
        .ok_or_else(|| Error::Upgrade("empty message head".to_string()))?
        .to_string();
    let mut headers = HeaderList::new();
    for line in lines {
        let (name, value) = HeaderList::parse_header_line(line)?;
        headers.insert(name, value);
    }
    Ok((start, headers))
}

fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Client side: request the upgrade and wait for 101
pub fn client_upgrade<S: Read + Write>(
    stream: &mut S,
    url: &Url,
    settings: &Settings,
    token: &str,
) -> Result<()> {
    let request = format!(
        "GET {path} HTTP/1.1{crlf}\
         Host: {host}{crlf}\
         Connection: Upgrade, HTTP2-Settings{crlf}\
         Upgrade: {token}{crlf}\
         HTTP2-Settings: {settings}{crlf}{crlf}",
        path = url.path(),
        host = url.authority(),
        token = token,
        settings = encode_settings_header(settings),
        crlf = CRLF,
    );
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let (status_line, headers) = parse_head(&read_head(stream)?)?;
    let mut parts = status_line.split_whitespace();
    let status = parts.nth(1).unwrap_or("");
    if status != "101" {
        return Err(Error::Upgrade(format!("upgrade refused: {}", status_line)));
    }
    match headers.get("Upgrade") {
        Some(echoed) if echoed.eq_ignore_ascii_case(token) => Ok(()),
        other => Err(Error::Upgrade(format!(
            "server switched to {:?}, expected {}",
            other, token
        ))),
    }
}

/// Server side: validate the request and answer 101
///
/// On error nothing is written; the caller can fall back to HTTP/1.1.
pub fn server_upgrade<S: Read + Write>(stream: &mut S) -> Result<UpgradeRequest> {
    let (request_line, headers) = parse_head(&read_head(stream)?)?;
    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version)) if version.starts_with("HTTP/1.") => {
            (method.to_string(), path.to_string())
        }
        _ => {
            return Err(Error::Upgrade(format!(
                "bad request line: {}",
                request_line
            )))
        }
    };

    let connection = headers.get("Connection").unwrap_or("");
    if !has_token(connection, "Upgrade") || !has_token(connection, "HTTP2-Settings") {
        return Err(Error::Upgrade(format!(
            "Connection header {:?} lacks Upgrade, HTTP2-Settings",
            connection
        )));
    }

    let token = headers
        .get("Upgrade")
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .find(|t| is_supported_token(t))
        .ok_or_else(|| Error::Upgrade("no supported Upgrade token".to_string()))?
        .to_string();

    let encoded = headers.get_all("HTTP2-Settings");
    if encoded.len() != 1 {
        return Err(Error::Upgrade(format!(
            "expected one HTTP2-Settings header, got {}",
            encoded.len()
        )));
    }
    let settings = decode_settings_header(encoded[0])?;

    let response = format!(
        "HTTP/1.1 101 Switching Protocols{crlf}\
         Connection: Upgrade{crlf}\
         Upgrade: {token}{crlf}{crlf}",
        token = token,
        crlf = CRLF,
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;

    Ok(UpgradeRequest {
        method,
        path,
        token,
        settings,
        headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::settings::SettingsBuilder;
    use std::io::Cursor;

    /// In-memory stream: reads from `input`, collects writes
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(input: &[u8]) -> Self {
            Duplex {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_settings_header() {
        let settings = SettingsBuilder::new()
            .max_concurrent_streams(100)
            .initial_window_size(65535)
            .build()
            .unwrap();
        let encoded = encode_settings_header(&settings);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(decode_settings_header(&encoded).unwrap(), settings);
    }

    #[test]
    fn test_client_upgrade() {
        let mut stream = Duplex::new(
            b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: h2-10\r\n\r\nPRI",
        );
        let url = Url::parse("http://go.com/index.html").unwrap();
        client_upgrade(&mut stream, &url, &Settings::new(), "h2-10").unwrap();

        let request = String::from_utf8(stream.output.clone()).unwrap();
        assert!(request.starts_with("GET /index.html HTTP/1.1\r\n"));
        assert!(request.contains("Connection: Upgrade, HTTP2-Settings\r\n"));
        assert!(request.contains("Upgrade: h2-10\r\n"));
        assert!(request.contains("HTTP2-Settings: \r\n"));

        // Nothing past the blank line was consumed
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"PRI");
    }

    #[test]
    fn test_client_upgrade_refused() {
        let mut stream = Duplex::new(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        let url = Url::parse("http://go.com").unwrap();
        let err = client_upgrade(&mut stream, &url, &Settings::new(), "h2-10").unwrap_err();
        assert!(matches!(err, Error::Upgrade(_)));
    }

    #[test]
    fn test_server_upgrade_echoes_token() {
        let settings = SettingsBuilder::new().max_concurrent_streams(10).build().unwrap();
        let request = format!(
            "GET /a HTTP/1.1\r\nHost: go.com\r\nConnection: Upgrade, HTTP2-Settings\r\n\
             Upgrade: HTTP-draft-06/2.0\r\nHTTP2-Settings: {}\r\n\r\n",
            encode_settings_header(&settings)
        );
        let mut stream = Duplex::new(request.as_bytes());
        let upgrade = server_upgrade(&mut stream).unwrap();

        assert_eq!(upgrade.method, "GET");
        assert_eq!(upgrade.path, "/a");
        assert_eq!(upgrade.token, "HTTP-draft-06/2.0");
        assert_eq!(upgrade.settings, settings);
        assert_eq!(
            String::from_utf8(stream.output).unwrap(),
            "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: HTTP-draft-06/2.0\r\n\r\n"
        );
    }

    #[test]
    fn test_server_upgrade_rejects() {
        let missing = b"GET / HTTP/1.1\r\nHost: go.com\r\nUpgrade: h2-10\r\nHTTP2-Settings: \r\n\r\n";
        let mut stream = Duplex::new(missing);
        assert!(server_upgrade(&mut stream).is_err());
        assert!(stream.output.is_empty());

        let unknown = b"GET / HTTP/1.1\r\nConnection: Upgrade, HTTP2-Settings\r\nUpgrade: websocket\r\nHTTP2-Settings: \r\n\r\n";
        assert!(server_upgrade(&mut Duplex::new(unknown)).is_err());
    }
}
