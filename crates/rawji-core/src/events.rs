//! Event system for UI decoupling.
//!
//! Lets a CLI or GUI follow a conversion job without tight coupling to
//! the core logic.

use std::fmt;
use std::time::Duration;

use crate::conversion::ConversionStatus;
use crate::orchestrator::JobState;

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted while a conversion job runs.
#[derive(Debug, Clone)]
pub enum ConversionEvent {
    /// Session opened on a camera.
    DeviceOpened { model: String, firmware: String },
    /// Job moved to a new state.
    StateChanged { from: JobState, to: JobState },
    /// USB transfer completed.
    Packet {
        direction: PacketDirection,
        length: usize,
        /// First bytes of the transfer.
        head: Vec<u8>,
    },
    /// Status poll answered.
    Poll {
        attempt: u32,
        status: ConversionStatus,
        elapsed: Duration,
    },
    /// Camera was busy; retrying after `delay`.
    BusyRetry {
        operation: &'static str,
        attempt: u32,
        delay: Duration,
    },
    /// A best-effort cleanup step failed.
    CleanupFailed { step: &'static str, error: String },
    /// JPEG retrieved.
    Complete { bytes: usize },
}

/// Observer trait for receiving conversion events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait ConversionObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ConversionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl ConversionObserver for NullObserver {
    fn on_event(&self, _event: &ConversionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl ConversionObserver for TracingObserver {
    fn on_event(&self, event: &ConversionEvent) {
        match event {
            ConversionEvent::DeviceOpened { model, firmware } => {
                tracing::info!(model = %model, firmware = %firmware, "Camera ready");
            }
            ConversionEvent::StateChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "State changed");
            }
            ConversionEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "USB Packet");
            }
            ConversionEvent::Poll {
                attempt,
                status,
                elapsed,
            } => {
                tracing::debug!(
                    attempt = attempt,
                    status = %status,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Conversion status"
                );
            }
            ConversionEvent::BusyRetry {
                operation,
                attempt,
                delay,
            } => {
                tracing::warn!(
                    operation = operation,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Camera busy, retrying"
                );
            }
            ConversionEvent::CleanupFailed { step, error } => {
                tracing::warn!(step = step, error = %error, "Cleanup step failed");
            }
            ConversionEvent::Complete { bytes } => {
                tracing::info!(bytes = bytes, "Conversion complete");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Observer that keeps every event for inspection.
    #[derive(Default)]
    pub(crate) struct RecordingObserver {
        pub events: Mutex<Vec<ConversionEvent>>,
    }

    impl RecordingObserver {
        pub fn states(&self) -> Vec<JobState> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ConversionEvent::StateChanged { to, .. } => Some(*to),
                    _ => None,
                })
                .collect()
        }

        pub fn polls(&self) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| matches!(e, ConversionEvent::Poll { .. }))
                .count()
        }
    }

    impl ConversionObserver for RecordingObserver {
        fn on_event(&self, event: &ConversionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
