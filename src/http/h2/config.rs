//! Connection configuration

use super::error::{Error, Result};
use super::settings::{Settings, SettingsBuilder, DEFAULT_SETTINGS, MAX_WINDOW_SIZE};
use super::telemetry::{Telemetry, TracingTelemetry};
use super::{DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_UPGRADE_TOKEN};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which end of the connection this endpoint is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the preface, opens odd streams
    Client,
    /// Receives the preface, opens even streams
    Server,
}

impl Role {
    pub fn is_client(&self) -> bool {
        matches!(self, Role::Client)
    }
}

/// Settled configuration for one connection
#[derive(Clone)]
pub struct ConnectionConfig {
    pub role: Role,
    /// SETTINGS advertised to the peer
    pub settings: Settings,
    /// Receive window of stream 0
    pub connection_window_size: u32,
    /// Deadline for the SETTINGS ACK and for reading the preface
    pub settings_timeout: Duration,
    /// Time frames on a closed stream are silently ignored
    pub closed_stream_grace: Duration,
    /// Bound of every inter-thread channel
    pub channel_capacity: usize,
    /// Version token offered in `Upgrade:`
    pub upgrade_token: String,
    pub telemetry: Arc<dyn Telemetry>,
}

impl ConnectionConfig {
    /// Defaults for `role`
    pub fn new(role: Role) -> Self {
        ConnectionConfig {
            role,
            settings: DEFAULT_SETTINGS,
            connection_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            settings_timeout: Duration::from_secs(10),
            closed_stream_grace: Duration::from_secs(2),
            channel_capacity: 64,
            upgrade_token: DEFAULT_UPGRADE_TOKEN.to_string(),
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    pub fn server() -> Self {
        Self::new(Role::Server)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("role", &self.role)
            .field("settings", &self.settings)
            .field("connection_window_size", &self.connection_window_size)
            .field("settings_timeout", &self.settings_timeout)
            .field("closed_stream_grace", &self.closed_stream_grace)
            .field("channel_capacity", &self.channel_capacity)
            .field("upgrade_token", &self.upgrade_token)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionConfig`]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    settings: SettingsBuilder,
}

impl ConnectionBuilder {
    /// Create a new builder for `role`
    pub fn new(role: Role) -> Self {
        let defaults = DEFAULT_SETTINGS;
        let mut settings = SettingsBuilder::new()
            .header_table_size(defaults.get_header_table_size())
            .enable_push(defaults.get_enable_push())
            .initial_window_size(defaults.get_initial_window_size())
            .max_frame_size(defaults.get_max_frame_size());
        if let Some(max) = defaults.get_max_concurrent_streams() {
            settings = settings.max_concurrent_streams(max);
        }

        ConnectionBuilder {
            config: ConnectionConfig::new(role),
            settings,
        }
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings = self.settings.header_table_size(size);
        self
    }

    /// Set enable push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings = self.settings.enable_push(enable);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings = self.settings.max_concurrent_streams(max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings = self.settings.initial_window_size(size);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_frame_size(size);
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_header_list_size(size);
        self
    }

    /// Receive window of the connection as a whole
    pub fn connection_window_size(mut self, size: u32) -> Self {
        self.config.connection_window_size = size;
        self
    }

    pub fn settings_timeout(mut self, timeout: Duration) -> Self {
        self.config.settings_timeout = timeout;
        self
    }

    pub fn closed_stream_grace(mut self, grace: Duration) -> Self {
        self.config.closed_stream_grace = grace;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn upgrade_token(mut self, token: impl Into<String>) -> Self {
        self.config.upgrade_token = token.into();
        self
    }

    /// Replace the default `tracing` sink
    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ConnectionConfig> {
        let mut config = self.config;
        config.settings = self.settings.build()?;
        if config.connection_window_size > MAX_WINDOW_SIZE {
            return Err(Error::InvalidSettings(format!(
                "Connection window size {} exceeds maximum (2^31-1)",
                config.connection_window_size
            )));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::telemetry::NoopTelemetry;

    #[test]
    fn test_defaults() {
        let config = ConnectionBuilder::new(Role::Client).build().unwrap();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.settings.get_initial_window_size(), 65535);
        assert_eq!(config.settings.get_max_frame_size(), 16384);
        assert!(config.settings.get_enable_push());
        assert_eq!(config.connection_window_size, 65535);
        assert_eq!(config.settings_timeout, Duration::from_secs(10));
        assert_eq!(config.closed_stream_grace, Duration::from_secs(2));
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.upgrade_token, "h2-10");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConnectionBuilder::new(Role::Server)
            .max_concurrent_streams(10)
            .initial_window_size(1 << 20)
            .connection_window_size(1 << 24)
            .upgrade_token("HTTP-draft-06/2.0")
            .telemetry(Arc::new(NoopTelemetry))
            .build()
            .unwrap();

        assert_eq!(config.settings.get_max_concurrent_streams(), Some(10));
        assert_eq!(config.settings.get_initial_window_size(), 1 << 20);
        assert_eq!(config.connection_window_size, 1 << 24);
        assert_eq!(config.upgrade_token, "HTTP-draft-06/2.0");
    }

    #[test]
    fn test_builder_validates() {
        assert!(ConnectionBuilder::new(Role::Client)
            .max_frame_size(100)
            .build()
            .is_err());
        assert!(ConnectionBuilder::new(Role::Client)
            .connection_window_size(0x8000_0000)
            .build()
            .is_err());
    }
}
