//! nusb-based USB transport implementation.
//!
//! The camera exposes PTP on interface 0 with one bulk IN and one bulk
//! OUT endpoint. Both are claimed once at open and kept for the life of
//! the handle so buffered IN data is never dropped between reads.

use std::io::{Read, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Bulk, In, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbTransport};
use crate::camera::{self, FUJIFILM_VENDOR_ID};

const PTP_INTERFACE: u8 = 0;
const ENDPOINT_BUFFER: usize = 512 * 1024;

/// nusb-based USB transport.
pub struct NusbTransport {
    // Held so the claim outlives the endpoint streams.
    _interface: Interface,
    reader: Mutex<EndpointRead<Bulk>>,
    writer: Mutex<EndpointWrite<Bulk>>,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open the first attached camera listed in the supported body table.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if camera::lookup(device_info.vendor_id(), device_info.product_id()).is_some() {
                return Self::open_device_info(device_info);
            }
        }

        Err(TransportError::DeviceNotFound {
            vid: FUJIFILM_VENDOR_ID,
            pid: 0,
        })
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            model = camera::lookup(vid, pid).map(|m| m.name).unwrap_or("unknown"),
            "Found camera"
        );

        let device = device_info.open().wait().map_err(|e| {
            let err = std::io::Error::from(e);
            if err.kind() == std::io::ErrorKind::PermissionDenied {
                TransportError::PermissionDenied(err.to_string())
            } else {
                TransportError::OpenFailed(err.to_string())
            }
        })?;

        // Desktop environments often bind an MTP/PTP driver to the camera.
        let interface = device
            .detach_and_claim_interface(PTP_INTERFACE)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: PTP_INTERFACE,
                message: e.to_string(),
            })?;

        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != PTP_INTERFACE {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                            if ep.direction() == nusb::transfer::Direction::In {
                                in_endpoint = ep.address();
                            } else {
                                out_endpoint = ep.address();
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "Out".into(),
            });
        }

        let reader = interface
            .endpoint::<Bulk, In>(in_endpoint)
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: PTP_INTERFACE,
                message: e.to_string(),
            })?
            .reader(ENDPOINT_BUFFER);
        let writer = interface
            .endpoint::<Bulk, Out>(out_endpoint)
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: PTP_INTERFACE,
                message: e.to_string(),
            })?
            .writer(ENDPOINT_BUFFER);

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            _interface: interface,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            vid,
            pid,
        })
    }

    /// Release the interface and close the device.
    pub fn close(self) {
        info!(
            vendor_id = %format!("{:04X}", self.vid),
            product_id = %format!("{:04X}", self.pid),
            "Releasing device"
        );
        drop(self);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic mid-transfer leaves nothing half-initialised in the stream itself.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn bulk_write(&self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let mut writer = lock(&self.writer);
        writer.set_write_timeout(timeout);

        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|e| TransportError::from_transfer(e, timeout, true))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(max_len))]
    fn bulk_read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut reader = lock(&self.reader);
        reader.set_read_timeout(timeout);

        let mut buf = vec![0u8; max_len];
        let n = reader
            .read(&mut buf)
            .map_err(|e| TransportError::from_transfer(e, timeout, false))?;

        buf.truncate(n);
        debug!(bytes_read = n, "Read complete");
        Ok(buf)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
