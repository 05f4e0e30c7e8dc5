//! PTP (Picture Transfer Protocol) over USB bulk endpoints.

pub mod constants;
pub mod container;
pub mod dataset;
pub mod error;
pub mod response;
pub mod session;

pub use container::Container;
pub use dataset::{DeviceInfo, ObjectInfo};
pub use error::ProtocolError;
pub use response::ResponseCode;
pub use session::{
    DataPhase, PtpSession, SessionOptions, SessionState, Transaction, TransactionResponse,
};
