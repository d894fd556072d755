//! Header lists and pseudo-header naming
//!
//! HTTP/2 carries request and response control data as pseudo-headers
//! (`:method`, `:path`, ...). Upper layers use the bare names; this module
//! rewrites them on the way out and strips the prefix on the way in.

use super::{Error, Result};
use std::fmt;

/// Names that travel as pseudo-headers
pub const PSEUDO_HEADERS: [&str; 5] = ["method", "scheme", "path", "authority", "status"];

/// Ordered header list
///
/// Headers are stored in insertion order and support:
/// - Case-insensitive header name lookups
/// - Multiple values for the same header name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    headers: Vec<(String, String)>,
}

impl HeaderList {
    /// Create a new empty header list
    pub fn new() -> Self {
        HeaderList {
            headers: Vec::new(),
        }
    }

    /// Append a header, keeping earlier values with the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Get the first value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over all headers
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Consume into the underlying pairs
    pub fn into_vec(self) -> Vec<(String, String)> {
        self.headers
    }

    /// Parse a `Name: value` line
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHeader(format!("No colon in header: {}", line)))?;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidHeader("Empty header name".to_string()));
        }

        Ok((name.to_string(), value.trim().to_string()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderList {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        HeaderList {
            headers: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}

/// Whether a bare name is sent as a pseudo-header
pub fn is_pseudo_header(name: &str) -> bool {
    PSEUDO_HEADERS.contains(&name)
}

/// Build an outgoing header set
///
/// Pseudo names gain their `:` prefix and are moved ahead of regular
/// headers, keeping relative order within each group.
pub fn prefix_pseudo_headers<N, V>(headers: &[(N, V)]) -> Vec<(String, String)>
where
    N: AsRef<str>,
    V: AsRef<str>,
{
    let pairs: Vec<(&str, &str)> = headers
        .iter()
        .map(|(n, v)| (n.as_ref(), v.as_ref()))
        .collect();
    let (pseudo, regular): (Vec<(&str, &str)>, Vec<(&str, &str)>) =
        pairs.into_iter().partition(|(n, _)| is_pseudo_header(n));

    pseudo
        .into_iter()
        .map(|(n, v)| (format!(":{}", n), v.to_string()))
        .chain(regular.into_iter().map(|(n, v)| (n.to_string(), v.to_string())))
        .collect()
}

/// Inverse of [`prefix_pseudo_headers`] for a decoded header set
pub fn strip_pseudo_headers(headers: Vec<(String, String)>) -> HeaderList {
    headers
        .into_iter()
        .map(|(name, value)| match name.strip_prefix(':') {
            Some(bare) if is_pseudo_header(bare) => (bare.to_string(), value),
            _ => (name, value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_moves_pseudo_first() {
        let headers = [
            ("user-agent", "h2engine"),
            ("method", "GET"),
            ("path", "/"),
            ("accept", "*/*"),
            ("authority", "go.com:80"),
        ];
        let wire = prefix_pseudo_headers(&headers);
        let names: Vec<&str> = wire.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![":method", ":path", ":authority", "user-agent", "accept"]
        );
    }

    #[test]
    fn test_strip_is_inverse() {
        let wire = vec![
            (":status".to_string(), "200".to_string()),
            ("content-type".to_string(), "text/plain".to_string()),
        ];
        let headers = strip_pseudo_headers(wire);
        assert_eq!(headers.get("status"), Some("200"));
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert!(!headers.contains(":status"));
    }

    #[test]
    fn test_unknown_colon_names_pass_through() {
        let headers = strip_pseudo_headers(vec![(":protocol".to_string(), "ws".to_string())]);
        assert_eq!(headers.get(":protocol"), Some("ws"));
        assert!(!is_pseudo_header("protocol"));
    }

    #[test]
    fn test_parse_header_line() {
        let (name, value) = HeaderList::parse_header_line("Upgrade:  h2-10 ").unwrap();
        assert_eq!(name, "Upgrade");
        assert_eq!(value, "h2-10");

        assert!(HeaderList::parse_header_line("no colon here").is_err());
        assert!(HeaderList::parse_header_line(": value").is_err());
    }

    #[test]
    fn test_get_all() {
        let mut headers = HeaderList::new();
        headers.insert("Connection", "Upgrade");
        headers.insert("connection", "HTTP2-Settings");
        assert_eq!(headers.get_all("CONNECTION"), vec!["Upgrade", "HTTP2-Settings"]);
        assert_eq!(headers.len(), 2);
    }
}
