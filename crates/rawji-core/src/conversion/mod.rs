//! Fujifilm RAW conversion extension.

pub mod extension;

#[cfg(test)]
pub(crate) mod sim;

pub use extension::{ConversionId, ConversionStatus, ObjectHandle, RawConversion, VendorOpcodes};
