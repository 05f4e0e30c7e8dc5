//! PTP (ISO 15740) and Fujifilm vendor constants.

// Container types
pub const CONTAINER_COMMAND: u16 = 0x0001;
pub const CONTAINER_DATA: u16 = 0x0002;
pub const CONTAINER_RESPONSE: u16 = 0x0003;

/// length(4) + type(2) + code(2) + transaction id(4)
pub const CONTAINER_HEADER_SIZE: usize = 12;
pub const MAX_PARAMS: usize = 5;

// Standard operation codes
pub const PTP_OC_GET_DEVICE_INFO: u16 = 0x1001;
pub const PTP_OC_OPEN_SESSION: u16 = 0x1002;
pub const PTP_OC_CLOSE_SESSION: u16 = 0x1003;
pub const PTP_OC_GET_OBJECT: u16 = 0x1009;
pub const PTP_OC_DELETE_OBJECT: u16 = 0x100B;
pub const PTP_OC_GET_DEVICE_PROP_VALUE: u16 = 0x1015;

// Fujifilm vendor operation codes
pub const FUJI_OC_SEND_OBJECT_INFO: u16 = 0x900C;
pub const FUJI_OC_SEND_OBJECT: u16 = 0x900D;
pub const FUJI_OC_START_RAW_CONVERSION: u16 = 0x9060;
pub const FUJI_OC_GET_CONVERSION_STATUS: u16 = 0x9061;

// Fujifilm device properties
pub const FUJI_DPC_RAW_CONV_PROFILE: u32 = 0xD185;

// Response codes
pub const PTP_RC_OK: u16 = 0x2001;
pub const PTP_RC_GENERAL_ERROR: u16 = 0x2002;
pub const PTP_RC_SESSION_NOT_OPEN: u16 = 0x2003;
pub const PTP_RC_INVALID_TRANSACTION_ID: u16 = 0x2004;
pub const PTP_RC_OPERATION_NOT_SUPPORTED: u16 = 0x2005;
pub const PTP_RC_PARAMETER_NOT_SUPPORTED: u16 = 0x2006;
pub const PTP_RC_INCOMPLETE_TRANSFER: u16 = 0x2007;
pub const PTP_RC_INVALID_STORAGE_ID: u16 = 0x2008;
pub const PTP_RC_INVALID_OBJECT_HANDLE: u16 = 0x2009;
pub const PTP_RC_DEVICE_PROP_NOT_SUPPORTED: u16 = 0x200A;
pub const PTP_RC_STORE_FULL: u16 = 0x200C;
pub const PTP_RC_ACCESS_DENIED: u16 = 0x200F;
pub const PTP_RC_DEVICE_BUSY: u16 = 0x2019;
pub const PTP_RC_INVALID_PARAMETER: u16 = 0x201D;
pub const PTP_RC_SESSION_ALREADY_OPEN: u16 = 0x201E;

/// Object format Fujifilm uses for RAF uploads.
pub const FUJI_OFC_RAF: u16 = 0xF802;
/// Filename the camera expects on the uploaded RAF object.
pub const FUJI_UPLOAD_FILENAME: &str = "FUP_FILE.dat";

/// Upper bound for one bulk transfer chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;
/// Refuse containers larger than this.
pub const DEFAULT_MAX_CONTAINER_SIZE: usize = 100 * 1024 * 1024;
