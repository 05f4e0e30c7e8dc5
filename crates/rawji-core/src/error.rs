//! Crate-level error taxonomy.

use std::fmt;

use thiserror::Error;

use crate::orchestrator::JobState;
use crate::ptp::ProtocolError;
use crate::recipe::ValidationError;
use crate::transport::TransportError;

/// Every failure a caller of the core can observe.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Invalid recipe: {0}")]
    Validation(#[from] ValidationError),

    /// Camera not ready, or another job holds the device.
    #[error("Device busy")]
    DeviceBusy,

    #[error("Camera reported conversion failure (status {code})")]
    ConversionFailed { code: u32 },

    #[error("Conversion did not complete within {waited_ms}ms")]
    PollTimeout { waited_ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

/// A failed conversion job: the primary error, the state it happened in,
/// and whatever went wrong while cleaning up afterwards.
#[derive(Debug)]
pub struct JobError {
    pub state: JobState,
    pub source: Error,
    pub cleanup: Vec<Error>,
}

impl JobError {
    pub fn new(state: JobState, source: Error) -> Self {
        Self {
            state,
            source,
            cleanup: Vec::new(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in state {})", self.source, self.state)?;
        if !self.cleanup.is_empty() {
            write!(f, "; {} cleanup step(s) also failed", self.cleanup.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors raised before a job has touched the device.
impl From<Error> for JobError {
    fn from(source: Error) -> Self {
        Self::new(JobState::Idle, source)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
