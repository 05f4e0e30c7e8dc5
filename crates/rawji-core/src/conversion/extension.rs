//! Fujifilm USB RAW conversion operations layered on a PTP session.
//!
//! Every method runs one or more PTP transactions and never retries;
//! busy handling and polling cadence belong to the orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::Error;
use crate::ptp::constants::*;
use crate::ptp::{DeviceInfo, ObjectInfo, ProtocolError, PtpSession, Transaction};
use crate::recipe::RecipeBlob;
use crate::transport::UsbTransport;

/// Device-side object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Identifier the camera assigns to a running conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversionId(pub u32);

impl fmt::Display for ConversionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Result of one status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Pending,
    InProgress,
    Complete(ObjectHandle),
    /// Camera status code.
    Failed(u32),
}

impl ConversionStatus {
    fn from_params(state: u32, detail: u32) -> Result<Self, ProtocolError> {
        match state {
            0 => Ok(ConversionStatus::Pending),
            1 => Ok(ConversionStatus::InProgress),
            2 => Ok(ConversionStatus::Complete(ObjectHandle(detail))),
            3 => Ok(ConversionStatus::Failed(detail)),
            other => Err(ProtocolError::UnknownConversionState { state: other }),
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionStatus::Pending => write!(f, "pending"),
            ConversionStatus::InProgress => write!(f, "in progress"),
            ConversionStatus::Complete(handle) => write!(f, "complete ({handle})"),
            ConversionStatus::Failed(code) => write!(f, "failed (status {code})"),
        }
    }
}

/// Vendor operation codes. Firmware revisions have moved these before, so
/// they can be overridden from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorOpcodes {
    pub send_object_info: u16,
    pub send_object: u16,
    pub start_conversion: u16,
    pub conversion_status: u16,
}

impl Default for VendorOpcodes {
    fn default() -> Self {
        Self {
            send_object_info: FUJI_OC_SEND_OBJECT_INFO,
            send_object: FUJI_OC_SEND_OBJECT,
            start_conversion: FUJI_OC_START_RAW_CONVERSION,
            conversion_status: FUJI_OC_GET_CONVERSION_STATUS,
        }
    }
}

/// RAW conversion extension over an owned PTP session.
pub struct RawConversion<'t, T: UsbTransport + ?Sized> {
    session: PtpSession<'t, T>,
    opcodes: VendorOpcodes,
}

impl<'t, T: UsbTransport + ?Sized> RawConversion<'t, T> {
    pub fn new(session: PtpSession<'t, T>, opcodes: VendorOpcodes) -> Self {
        Self { session, opcodes }
    }

    pub fn session(&self) -> &PtpSession<'t, T> {
        &self.session
    }

    pub fn opcodes(&self) -> &VendorOpcodes {
        &self.opcodes
    }

    /// Open the session and confirm the camera offers RAW conversion.
    pub fn open(&mut self, session_id: u32) -> Result<DeviceInfo, Error> {
        self.open_session(session_id)?;
        self.device_info()
    }

    pub fn open_session(&mut self, session_id: u32) -> Result<(), Error> {
        self.session.open_session(session_id)
    }

    /// Read DeviceInfo and verify the conversion operations are advertised.
    pub fn device_info(&mut self) -> Result<DeviceInfo, Error> {
        let info = self.session.device_info()?;
        self.verify(&info)?;
        Ok(info)
    }

    /// Check that the device advertises the conversion operations.
    pub fn verify(&self, info: &DeviceInfo) -> Result<(), Error> {
        for operation in [self.opcodes.start_conversion, self.opcodes.conversion_status] {
            if !info.supports_operation(operation) {
                return Err(ProtocolError::OperationNotAdvertised { operation }.into());
            }
        }
        Ok(())
    }

    /// Send a RAF to the camera and return the handle it was stored under.
    pub fn upload_object(&mut self, data: &[u8]) -> Result<ObjectHandle, Error> {
        let handle = self.send_object_info(data.len())?;
        self.send_object(handle, data)?;
        Ok(handle)
    }

    /// Announce an upload of `size` bytes. The camera allocates the object
    /// here, so the returned handle must be deleted even if the payload
    /// never arrives.
    #[instrument(skip(self))]
    pub fn send_object_info(&mut self, size: usize) -> Result<ObjectHandle, Error> {
        let size = u32::try_from(size).map_err(|_| ProtocolError::ContainerTooLarge {
            length: size,
            limit: u32::MAX as usize,
        })?;
        let object_info = ObjectInfo::raf(size).to_bytes();

        let response = self
            .session
            .transaction(
                Transaction::new(self.opcodes.send_object_info, &[0, 0, 0]).sending(&object_info),
            )?
            .into_ok()?;
        let handle = ObjectHandle(response.param(2)?);
        debug!(handle = %handle, "Object info accepted");
        Ok(handle)
    }

    /// Send the payload for the object announced last.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub fn send_object(&mut self, handle: ObjectHandle, data: &[u8]) -> Result<(), Error> {
        self.session
            .transaction(Transaction::new(self.opcodes.send_object, &[]).sending(data))?
            .into_ok()?;
        info!(handle = %handle, bytes = data.len(), "RAF uploaded");
        Ok(())
    }

    /// Deliver the recipe and start converting `source`.
    #[instrument(skip(self, blob))]
    pub fn start_conversion(
        &mut self,
        source: ObjectHandle,
        blob: &RecipeBlob,
    ) -> Result<ConversionId, Error> {
        let response = self
            .session
            .transaction(
                Transaction::new(self.opcodes.start_conversion, &[source.0])
                    .sending(blob.as_bytes()),
            )?
            .into_ok()?;
        // Some bodies do not assign a separate id and track the source object.
        let id = ConversionId(response.params.first().copied().unwrap_or(source.0));
        info!(id = %id, "Conversion started");
        Ok(id)
    }

    pub fn poll_status(&mut self, id: ConversionId) -> Result<ConversionStatus, Error> {
        let response = self
            .session
            .transaction(Transaction::new(self.opcodes.conversion_status, &[id.0]))?
            .into_ok()?;
        let state = response.param(0)?;
        let detail = response.params.get(1).copied().unwrap_or(0);
        let status = ConversionStatus::from_params(state, detail)?;
        debug!(id = %id, status = %status, "Conversion status");
        Ok(status)
    }

    #[instrument(skip(self))]
    pub fn retrieve_object(&mut self, handle: ObjectHandle) -> Result<Vec<u8>, Error> {
        let response = self
            .session
            .transaction(Transaction::new(PTP_OC_GET_OBJECT, &[handle.0]).receiving())?
            .into_ok()?;
        info!(handle = %handle, bytes = response.data.len(), "Object retrieved");
        Ok(response.data)
    }

    #[instrument(skip(self))]
    pub fn delete_object(&mut self, handle: ObjectHandle) -> Result<(), Error> {
        self.session
            .transaction(Transaction::new(PTP_OC_DELETE_OBJECT, &[handle.0, 0]))?
            .into_ok()?;
        debug!(handle = %handle, "Object deleted");
        Ok(())
    }

    /// Read the camera's current conversion profile. Bodies outside the
    /// supported family report other sizes, so the bytes are returned as is.
    pub fn read_profile(&mut self) -> Result<Vec<u8>, Error> {
        let response = self
            .session
            .transaction(
                Transaction::new(PTP_OC_GET_DEVICE_PROP_VALUE, &[FUJI_DPC_RAW_CONV_PROFILE])
                    .receiving(),
            )?
            .into_ok()?;
        debug!(bytes = response.data.len(), "Profile read");
        Ok(response.data)
    }

    pub fn close(&mut self) -> Result<(), Error> {
        self.session.close()
    }
}
