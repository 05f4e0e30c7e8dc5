//! PTP response code parsing and naming.

use std::fmt;

use super::constants::*;

/// Response code returned in a PTP Response container.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    pub const OK: ResponseCode = ResponseCode(PTP_RC_OK);
    pub const DEVICE_BUSY: ResponseCode = ResponseCode(PTP_RC_DEVICE_BUSY);
    pub const SESSION_ALREADY_OPEN: ResponseCode = ResponseCode(PTP_RC_SESSION_ALREADY_OPEN);

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }

    /// Camera reports busy / not ready. Worth retrying later.
    pub fn is_busy(&self) -> bool {
        *self == Self::DEVICE_BUSY
    }

    /// Standard name, if this is a known code.
    pub fn name(&self) -> Option<&'static str> {
        let name = match self.0 {
            PTP_RC_OK => "OK",
            PTP_RC_GENERAL_ERROR => "GeneralError",
            PTP_RC_SESSION_NOT_OPEN => "SessionNotOpen",
            PTP_RC_INVALID_TRANSACTION_ID => "InvalidTransactionID",
            PTP_RC_OPERATION_NOT_SUPPORTED => "OperationNotSupported",
            PTP_RC_PARAMETER_NOT_SUPPORTED => "ParameterNotSupported",
            PTP_RC_INCOMPLETE_TRANSFER => "IncompleteTransfer",
            PTP_RC_INVALID_STORAGE_ID => "InvalidStorageID",
            PTP_RC_INVALID_OBJECT_HANDLE => "InvalidObjectHandle",
            PTP_RC_DEVICE_PROP_NOT_SUPPORTED => "DevicePropNotSupported",
            PTP_RC_STORE_FULL => "StoreFull",
            PTP_RC_ACCESS_DENIED => "AccessDenied",
            PTP_RC_DEVICE_BUSY => "DeviceBusy",
            PTP_RC_INVALID_PARAMETER => "InvalidParameter",
            PTP_RC_SESSION_ALREADY_OPEN => "SessionAlreadyOpen",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Debug for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResponseCode(0x{:04X} '{}')", self.0, self.name().unwrap_or("?"))
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:04X} ({})", self.0, name),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert!(ResponseCode(0x2001).is_ok());
        assert!(ResponseCode(0x2019).is_busy());
        assert_eq!(ResponseCode(0x201E).name(), Some("SessionAlreadyOpen"));
    }

    #[test]
    fn test_display_unknown_code() {
        assert_eq!(ResponseCode(0xA001).to_string(), "0xA001");
        assert_eq!(ResponseCode(0x2002).to_string(), "0x2002 (GeneralError)");
    }
}
