//! PTP framing and session errors.

use thiserror::Error;

use super::response::ResponseCode;
use super::session::SessionState;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Container too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Container of {length} bytes exceeds limit of {limit}")]
    ContainerTooLarge { length: usize, limit: usize },

    #[error("Too many parameters: {count} (max 5)")]
    TooManyParams { count: usize },

    #[error("Unexpected container type 0x{actual:04X}, expected 0x{expected:04X}")]
    UnexpectedContainer { expected: u16, actual: u16 },

    #[error("Transaction id mismatch: sent {expected}, device echoed {actual}")]
    TransactionMismatch { expected: u32, actual: u32 },

    #[error("Operation 0x{operation:04X} failed with response {code}")]
    UnexpectedResponse { operation: u16, code: ResponseCode },

    #[error("Operation 0x{operation:04X} response is missing parameter {index}")]
    MissingParameter { operation: u16, index: usize },

    #[error("Session is {state}, cannot run operation 0x{operation:04X}")]
    SessionState { state: SessionState, operation: u16 },

    #[error("Device does not advertise operation 0x{operation:04X}")]
    OperationNotAdvertised { operation: u16 },

    #[error("Unknown conversion state {state}")]
    UnknownConversionState { state: u32 },

    #[error("Malformed dataset: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
