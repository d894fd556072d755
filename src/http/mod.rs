//! HTTP plumbing shared by the HTTP/2 engine
//!
//! This module holds the pieces that sit around the binary protocol:
//! URL/authority parsing, header-name handling and the transport seam
//! the multiplexer reads from and writes to.
//!
//! # Examples
//!
//! ```
//! use h2engine::http::Url;
//!
//! let url = Url::parse("https://go.com:8443/index.html").unwrap();
//! assert_eq!(url.host(), "go.com");
//! assert_eq!(url.port(), 8443);
//! assert_eq!(url.path(), "/index.html");
//! ```

pub mod h2;
pub mod headers;
pub mod transport;
pub mod url;

pub use headers::{prefix_pseudo_headers, strip_pseudo_headers, HeaderList};
pub use transport::Transport;
pub use url::Url;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("parse error \"{0}\" in HOST:PORT")]
    HostPort(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
