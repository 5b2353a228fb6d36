//! Observer hook for stream anomalies.
//!
//! The decoder never logs directly.  Every discarded region (garbage before a
//! marker, an oversized frame, a checksum failure, ...) is handed to a
//! [`DecodeObserver`], which keeps the core free of process-wide logging state
//! and lets callers count or assert on anomalies.

use tracing::warn;

use crate::protocol::codec::ProtocolError;

/// Receives every anomaly the stream decoder recovers from.
#[cfg_attr(test, mockall::automock)]
pub trait DecodeObserver {
    /// Called once per anomaly, in stream order.
    fn on_anomaly(&mut self, anomaly: &ProtocolError);
}

/// Default observer: logs each anomaly through `tracing` at `warn` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DecodeObserver for TracingObserver {
    fn on_anomaly(&mut self, anomaly: &ProtocolError) {
        warn!("discarding malformed stream data: {anomaly}");
    }
}
