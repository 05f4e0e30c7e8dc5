//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for bulk USB communication with a
//! camera, allowing different implementations (nusb, mock, etc.).
//! A transport value is the open, claimed device handle: dropping it
//! releases the interface.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Permission denied opening device: {0}")]
    PermissionDenied(String),

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Endpoint stalled")]
    Stall,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Map an I/O error from a bulk transfer onto the transport taxonomy.
    pub fn from_transfer(err: std::io::Error, timeout: Duration, write: bool) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::TimedOut => TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            },
            ErrorKind::BrokenPipe => TransportError::Stall,
            ErrorKind::NotConnected | ErrorKind::ConnectionAborted => TransportError::Disconnected,
            ErrorKind::PermissionDenied => TransportError::PermissionDenied(err.to_string()),
            _ if write => TransportError::WriteFailed(err.to_string()),
            _ => TransportError::ReadFailed(err.to_string()),
        }
    }
}

/// Abstract USB transport interface.
///
/// Implementations move raw bytes over the bulk endpoint pair bound at
/// open time. They never retry: a failed transfer is reported as-is and
/// the retry policy lives in the orchestrator.
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the bulk OUT endpoint.
    fn bulk_write(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Read up to `max_len` bytes from the bulk IN endpoint.
    fn bulk_read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Get the device VID.
    fn vendor_id(&self) -> u16;

    /// Get the device PID.
    fn product_id(&self) -> u16;
}
