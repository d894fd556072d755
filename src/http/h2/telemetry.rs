//! Connection telemetry
//!
//! The connection reports what it does through an injected [`Telemetry`]
//! sink instead of a process-wide logger. [`TracingTelemetry`] forwards
//! everything to `tracing`; [`NoopTelemetry`] discards it.

use super::error::{Error, ErrorCode};
use super::frames::Frame;
use super::stream::{StreamId, StreamState};

/// Observer of connection activity
///
/// Every hook has an empty default body.
pub trait Telemetry: Send + Sync {
    fn frame_received(&self, _frame: &Frame) {}

    fn frame_sent(&self, _frame: &Frame) {}

    fn stream_state_changed(&self, _stream_id: StreamId, _from: StreamState, _to: StreamState) {}

    /// A connection-fatal error, reported before teardown
    fn connection_error(&self, _error: &Error) {}

    /// Teardown finished; `code` is the GOAWAY code if one was exchanged
    fn connection_closed(&self, _code: Option<ErrorCode>) {}
}

/// Telemetry sink that records nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}

/// Telemetry sink emitting `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn frame_received(&self, frame: &Frame) {
        tracing::trace!(stream_id = frame.stream_id(), frame = %frame, "h2 frame received");
    }

    fn frame_sent(&self, frame: &Frame) {
        tracing::trace!(stream_id = frame.stream_id(), frame = %frame, "h2 frame sent");
    }

    fn stream_state_changed(&self, stream_id: StreamId, from: StreamState, to: StreamState) {
        tracing::debug!(stream_id, from = ?from, to = ?to, "h2 stream state changed");
    }

    fn connection_error(&self, error: &Error) {
        tracing::warn!(code = %error.code(), error = %error, "h2 connection error");
    }

    fn connection_closed(&self, code: Option<ErrorCode>) {
        match code {
            Some(code) => tracing::debug!(code = %code, "h2 connection closed"),
            None => tracing::debug!("h2 connection closed"),
        }
    }
}
