//! HTTP/2 settings management
//!
//! SETTINGS parameters, the immutable default set, and the 6-octet-entry
//! payload format shared by SETTINGS frames and the `HTTP2-Settings`
//! upgrade header.

use super::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

/// Size of one encoded settings entry (16-bit id + 32-bit value)
pub const SETTING_ENTRY_SIZE: usize = 6;

/// Largest legal flow-control window
pub const MAX_WINDOW_SIZE: u32 = 0x7FFF_FFFF;

/// Smallest legal SETTINGS_MAX_FRAME_SIZE
pub const MIN_MAX_FRAME_SIZE: u32 = 16_384;

/// Largest legal SETTINGS_MAX_FRAME_SIZE
pub const MAX_MAX_FRAME_SIZE: u32 = 0x00FF_FFFF;

/// HTTP/2 settings parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1)
    /// Allows the sender to inform the remote endpoint of the maximum size
    /// of the header compression table
    HeaderTableSize = 0x1,

    /// SETTINGS_ENABLE_PUSH (0x2)
    /// Used to disable server push
    EnablePush = 0x2,

    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3)
    /// Indicates the maximum number of concurrent streams
    MaxConcurrentStreams = 0x3,

    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4)
    /// Indicates the sender's initial window size for stream-level flow control
    InitialWindowSize = 0x4,

    /// SETTINGS_MAX_FRAME_SIZE (0x5)
    /// Indicates the size of the largest frame payload
    MaxFrameSize = 0x5,

    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6)
    /// Advises peer of the maximum size of header list
    MaxHeaderListSize = 0x6,
}

impl SettingsParameter {
    /// Convert to u16
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Create from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(SettingsParameter::HeaderTableSize),
            0x2 => Some(SettingsParameter::EnablePush),
            0x3 => Some(SettingsParameter::MaxConcurrentStreams),
            0x4 => Some(SettingsParameter::InitialWindowSize),
            0x5 => Some(SettingsParameter::MaxFrameSize),
            0x6 => Some(SettingsParameter::MaxHeaderListSize),
            _ => None,
        }
    }

    /// Get parameter name
    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::HeaderTableSize => "HEADER_TABLE_SIZE",
            SettingsParameter::EnablePush => "ENABLE_PUSH",
            SettingsParameter::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingsParameter::MaxFrameSize => "MAX_FRAME_SIZE",
            SettingsParameter::MaxHeaderListSize => "MAX_HEADER_LIST_SIZE",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// Protocol defaults, in effect until a peer says otherwise
pub const DEFAULT_SETTINGS: Settings = Settings {
    header_table_size: Some(4096),
    enable_push: Some(true),
    max_concurrent_streams: None,
    initial_window_size: Some(65_535),
    max_frame_size: Some(MIN_MAX_FRAME_SIZE),
    max_header_list_size: None,
};

/// HTTP/2 settings
///
/// `None` means "not carried": the parameter is absent from the encoded
/// payload and the protocol default applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Header table size (default: 4096)
    pub header_table_size: Option<u32>,

    /// Enable server push (default: true)
    pub enable_push: Option<bool>,

    /// Maximum concurrent streams (default: unlimited)
    pub max_concurrent_streams: Option<u32>,

    /// Initial window size (default: 65535)
    pub initial_window_size: Option<u32>,

    /// Maximum frame size (default: 16384, range: 16384-16777215)
    pub max_frame_size: Option<u32>,

    /// Maximum header list size (default: unlimited)
    pub max_header_list_size: Option<u32>,
}

impl Settings {
    /// Create empty settings
    pub const fn new() -> Self {
        Settings {
            header_table_size: None,
            enable_push: None,
            max_concurrent_streams: None,
            initial_window_size: None,
            max_frame_size: None,
            max_header_list_size: None,
        }
    }

    /// Get header table size (with default)
    pub fn get_header_table_size(&self) -> u32 {
        self.header_table_size.unwrap_or(4096)
    }

    /// Get enable push (with default)
    pub fn get_enable_push(&self) -> bool {
        self.enable_push.unwrap_or(true)
    }

    /// Get max concurrent streams (None = unlimited)
    pub fn get_max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Get initial window size (with default)
    pub fn get_initial_window_size(&self) -> u32 {
        self.initial_window_size.unwrap_or(65_535)
    }

    /// Get max frame size (with default)
    pub fn get_max_frame_size(&self) -> u32 {
        self.max_frame_size.unwrap_or(MIN_MAX_FRAME_SIZE)
    }

    /// Get max header list size (None = unlimited)
    pub fn get_max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    /// Carried parameters in identifier order
    pub fn entries(&self) -> Vec<(SettingsParameter, u32)> {
        let mut entries = Vec::with_capacity(6);
        if let Some(v) = self.header_table_size {
            entries.push((SettingsParameter::HeaderTableSize, v));
        }
        if let Some(v) = self.enable_push {
            entries.push((SettingsParameter::EnablePush, v as u32));
        }
        if let Some(v) = self.max_concurrent_streams {
            entries.push((SettingsParameter::MaxConcurrentStreams, v));
        }
        if let Some(v) = self.initial_window_size {
            entries.push((SettingsParameter::InitialWindowSize, v));
        }
        if let Some(v) = self.max_frame_size {
            entries.push((SettingsParameter::MaxFrameSize, v));
        }
        if let Some(v) = self.max_header_list_size {
            entries.push((SettingsParameter::MaxHeaderListSize, v));
        }
        entries
    }

    /// Number of carried parameters
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded payload size
    pub fn encoded_len(&self) -> usize {
        self.len() * SETTING_ENTRY_SIZE
    }

    /// Apply one received parameter, range-checking its value
    ///
    /// Unknown identifiers are ignored.
    pub fn apply(&mut self, id: u16, value: u32) -> Result<()> {
        let Some(param) = SettingsParameter::from_u16(id) else {
            return Ok(());
        };

        match param {
            SettingsParameter::HeaderTableSize => self.header_table_size = Some(value),
            SettingsParameter::EnablePush => {
                self.enable_push = Some(match value {
                    0 => false,
                    1 => true,
                    _ => {
                        return Err(Error::Protocol(format!(
                            "ENABLE_PUSH must be 0 or 1, got {}",
                            value
                        )))
                    }
                })
            }
            SettingsParameter::MaxConcurrentStreams => self.max_concurrent_streams = Some(value),
            SettingsParameter::InitialWindowSize => {
                if value > MAX_WINDOW_SIZE {
                    return Err(Error::FlowControl(format!(
                        "Initial window size {} exceeds maximum (2^31-1)",
                        value
                    )));
                }
                self.initial_window_size = Some(value);
            }
            SettingsParameter::MaxFrameSize => {
                if !(MIN_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&value) {
                    return Err(Error::Protocol(format!(
                        "Max frame size {} outside valid range (16384-16777215)",
                        value
                    )));
                }
                self.max_frame_size = Some(value);
            }
            SettingsParameter::MaxHeaderListSize => self.max_header_list_size = Some(value),
        }
        Ok(())
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        if let Some(initial_window_size) = self.initial_window_size {
            if initial_window_size > MAX_WINDOW_SIZE {
                return Err(Error::InvalidSettings(format!(
                    "Initial window size {} exceeds maximum (2^31-1)",
                    initial_window_size
                )));
            }
        }

        if let Some(max_frame_size) = self.max_frame_size {
            if !(MIN_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&max_frame_size) {
                return Err(Error::InvalidSettings(format!(
                    "Max frame size {} outside valid range (16384-16777215)",
                    max_frame_size
                )));
            }
        }

        Ok(())
    }

    /// Merge settings from another Settings object
    /// (values in `other` override values in `self`)
    pub fn merge(&mut self, other: &Settings) {
        if other.header_table_size.is_some() {
            self.header_table_size = other.header_table_size;
        }
        if other.enable_push.is_some() {
            self.enable_push = other.enable_push;
        }
        if other.max_concurrent_streams.is_some() {
            self.max_concurrent_streams = other.max_concurrent_streams;
        }
        if other.initial_window_size.is_some() {
            self.initial_window_size = other.initial_window_size;
        }
        if other.max_frame_size.is_some() {
            self.max_frame_size = other.max_frame_size;
        }
        if other.max_header_list_size.is_some() {
            self.max_header_list_size = other.max_header_list_size;
        }
    }

    /// Write the 6-octet entries
    pub fn encode_payload(&self, dst: &mut BytesMut) {
        for (param, value) in self.entries() {
            dst.put_u16(param.as_u16());
            dst.put_u32(value);
        }
    }

    /// Parse a payload of 6-octet entries
    pub fn decode_payload(mut payload: &[u8]) -> Result<Settings> {
        if payload.len() % SETTING_ENTRY_SIZE != 0 {
            return Err(Error::FrameSize(format!(
                "SETTINGS payload length {} is not a multiple of 6",
                payload.len()
            )));
        }

        let mut settings = Settings::new();
        while payload.has_remaining() {
            let id = payload.get_u16();
            let value = payload.get_u32();
            settings.apply(id, value)?;
        }
        Ok(settings)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries();
        write!(f, "{{")?;
        for (i, (param, value)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name(), value)?;
        }
        write!(f, "}}")
    }
}

/// Builder for HTTP/2 settings
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Create a new settings builder
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings::new(),
        }
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings.header_table_size = Some(size);
        self
    }

    /// Set enable push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings.enable_push = Some(enable);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings.max_concurrent_streams = Some(max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings.initial_window_size = Some(size);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings.max_frame_size = Some(size);
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings.max_header_list_size = Some(size);
        self
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parameter_conversion() {
        assert_eq!(SettingsParameter::HeaderTableSize.as_u16(), 0x1);
        assert_eq!(SettingsParameter::MaxHeaderListSize.as_u16(), 0x6);

        assert_eq!(
            SettingsParameter::from_u16(0x2),
            Some(SettingsParameter::EnablePush)
        );
        assert_eq!(SettingsParameter::from_u16(0x8), None);
        assert_eq!(SettingsParameter::from_u16(0xff), None);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = DEFAULT_SETTINGS;
        assert_eq!(settings.get_header_table_size(), 4096);
        assert!(settings.get_enable_push());
        assert_eq!(settings.get_initial_window_size(), 65535);
        assert_eq!(settings.get_max_frame_size(), 16384);
        assert_eq!(settings.get_max_concurrent_streams(), None);
        assert_eq!(settings.get_max_header_list_size(), None);
    }

    #[test]
    fn test_settings_builder() {
        let settings = SettingsBuilder::new()
            .header_table_size(8192)
            .enable_push(false)
            .max_concurrent_streams(100)
            .initial_window_size(65535)
            .build()
            .unwrap();

        assert_eq!(settings.get_header_table_size(), 8192);
        assert!(!settings.get_enable_push());
        assert_eq!(settings.get_max_concurrent_streams(), Some(100));
        assert_eq!(settings.get_initial_window_size(), 65535);
    }

    #[test]
    fn test_settings_validation() {
        let settings = SettingsBuilder::new()
            .initial_window_size(65535)
            .max_frame_size(16384)
            .build();
        assert!(settings.is_ok());

        let settings = SettingsBuilder::new()
            .initial_window_size(0x80000000) // 2^31
            .build();
        assert!(settings.is_err());

        let settings = SettingsBuilder::new().max_frame_size(1024).build();
        assert!(settings.is_err());

        let settings = SettingsBuilder::new().max_frame_size(16777216).build();
        assert!(settings.is_err());
    }

    #[test]
    fn test_settings_merge() {
        let mut settings1 = SettingsBuilder::new()
            .header_table_size(4096)
            .enable_push(true)
            .build()
            .unwrap();

        let settings2 = SettingsBuilder::new()
            .header_table_size(8192)
            .max_concurrent_streams(100)
            .build()
            .unwrap();

        settings1.merge(&settings2);

        assert_eq!(settings1.get_header_table_size(), 8192); // Overridden
        assert!(settings1.get_enable_push()); // Unchanged
        assert_eq!(settings1.get_max_concurrent_streams(), Some(100)); // Added
    }

    #[test]
    fn test_payload_layout() {
        let settings = SettingsBuilder::new()
            .max_concurrent_streams(100)
            .initial_window_size(65535)
            .build()
            .unwrap();

        let mut buf = BytesMut::new();
        settings.encode_payload(&mut buf);
        assert_eq!(settings.encoded_len(), 12);
        assert_eq!(
            &buf[..],
            &[0, 3, 0, 0, 0, 100, 0, 4, 0, 0, 0xff, 0xff]
        );

        let decoded = Settings::decode_payload(&buf).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn test_decode_ignores_unknown_ids() {
        let payload = [0x00, 0x08, 0, 0, 0, 1, 0x00, 0x01, 0, 0, 0x10, 0];
        let decoded = Settings::decode_payload(&payload).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.header_table_size, Some(4096));
    }

    #[test]
    fn test_decode_rejects_bad_values() {
        let push = [0x00, 0x02, 0, 0, 0, 2];
        assert!(matches!(
            Settings::decode_payload(&push),
            Err(Error::Protocol(_))
        ));

        let window = [0x00, 0x04, 0x80, 0, 0, 0];
        assert!(matches!(
            Settings::decode_payload(&window),
            Err(Error::FlowControl(_))
        ));

        let frame_size = [0x00, 0x05, 0, 0, 0x10, 0];
        assert!(matches!(
            Settings::decode_payload(&frame_size),
            Err(Error::Protocol(_))
        ));

        assert!(matches!(
            Settings::decode_payload(&[0, 1, 0]),
            Err(Error::FrameSize(_))
        ));
    }
}
