//! URL and authority parsing
//!
//! Only the `scheme://host[:port][/path]` shape used to reach an HTTP/2 peer
//! is supported. Bracketed IPv6 literals are not: an authority may contain
//! at most one `:`.

use super::{Error, Result, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use std::fmt;

/// A parsed `http` / `https` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl Url {
    /// Parse a URL, defaulting the port from the scheme when absent
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| Error::Parse(format!("missing scheme in {:?}", input)))?;

        let scheme = scheme.to_ascii_lowercase();
        if scheme.is_empty() {
            return Err(Error::Parse(format!("empty scheme in {:?}", input)));
        }

        let (authority, path) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, "/"),
        };

        let (host, port) = split_host_port(authority)?;
        let port = match port {
            Some(port) => port,
            None => default_port(&scheme)?,
        };

        Ok(Url {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Get the scheme (lowercase)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Get the host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the port (explicit or defaulted)
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the path, `/` when the URL has none
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port`, suitable for `:authority` and socket resolution
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the URL asks for TLS
    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

/// Split `host[:port]`
///
/// More than one `:` is rejected with the `HOST:PORT` parse error.
pub fn split_host_port(authority: &str) -> Result<(&str, Option<u16>)> {
    let host_port_error = || Error::HostPort(authority.to_string());

    let mut parts = authority.split(':');
    let host = parts.next().unwrap_or_default();
    let port = parts.next();
    if parts.next().is_some() || host.is_empty() {
        return Err(host_port_error());
    }

    match port {
        None => Ok((host, None)),
        Some(port) => {
            let port = port.parse::<u16>().map_err(|_| host_port_error())?;
            Ok((host, Some(port)))
        }
    }
}

/// Port implied by a scheme
pub fn default_port(scheme: &str) -> Result<u16> {
    match scheme {
        "http" => Ok(DEFAULT_HTTP_PORT),
        "https" => Ok(DEFAULT_HTTPS_PORT),
        other => Err(Error::UnsupportedScheme(other.to_string())),
    }
}
