//! Scripted camera for tests: answers PTP containers written to a
//! [`MockTransport`] the way a body in USB RAW conversion mode does.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::ptp::constants::*;
use crate::ptp::{Container, DeviceInfo};
use crate::transport::MockTransport;

pub(crate) const RAF_HANDLE: u32 = 0x0000_0101;
pub(crate) const JPEG_HANDLE: u32 = 0x0000_0202;
pub(crate) const CONVERSION_ID: u32 = 0x0000_0077;

/// What the camera saw.
#[derive(Debug, Default)]
pub(crate) struct CameraLog {
    /// Operation codes of every command container, in order.
    pub operations: Vec<u16>,
    pub raf: Vec<u8>,
    pub blob: Vec<u8>,
    pub deleted: Vec<u32>,
    pub polls: u32,
}

impl CameraLog {
    pub fn count(&self, operation: u16) -> usize {
        self.operations.iter().filter(|&&op| op == operation).count()
    }
}

pub(crate) struct SimulatedCamera {
    /// Advertised in DeviceInfo.
    pub operations: Vec<u16>,
    pub model: String,
    /// Busy answers per operation before it is served.
    pub busy: HashMap<u16, u32>,
    /// Operations answered with GeneralError.
    pub failing: Vec<u16>,
    /// `[state, detail]` pairs served in order, then Complete(JPEG_HANDLE).
    pub statuses: VecDeque<[u32; 2]>,
    pub object_info_params: Vec<u32>,
    pub jpeg: Vec<u8>,
    pub profile: Vec<u8>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self {
            operations: vec![
                PTP_OC_GET_DEVICE_INFO,
                PTP_OC_OPEN_SESSION,
                PTP_OC_CLOSE_SESSION,
                PTP_OC_GET_OBJECT,
                PTP_OC_DELETE_OBJECT,
                PTP_OC_GET_DEVICE_PROP_VALUE,
                FUJI_OC_SEND_OBJECT_INFO,
                FUJI_OC_SEND_OBJECT,
                FUJI_OC_START_RAW_CONVERSION,
                FUJI_OC_GET_CONVERSION_STATUS,
            ],
            model: "X-T3".into(),
            busy: HashMap::new(),
            failing: Vec::new(),
            statuses: [[1, 0]].into(),
            object_info_params: vec![0, 0, RAF_HANDLE],
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9],
            profile: Vec::new(),
        }
    }
}

impl SimulatedCamera {
    /// Answer `operation` with DeviceBusy `times` times first.
    pub fn busy_on(mut self, operation: u16, times: u32) -> Self {
        self.busy.insert(operation, times);
        self
    }

    /// Answer `operation` with GeneralError.
    pub fn failing_on(mut self, operation: u16) -> Self {
        self.failing.push(operation);
        self
    }

    /// Attach to `mock` as its responder.
    pub fn install(mut self, mock: &MockTransport) -> Arc<Mutex<CameraLog>> {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        let shared = Arc::clone(&log);
        let mut pending: Option<Container> = None;

        mock.set_responder(move |bytes| {
            let container = Container::from_bytes(bytes).unwrap();
            let mut log = shared.lock().unwrap();

            if container.container_type == CONTAINER_DATA {
                let command = pending.take().expect("data phase without command");
                match command.code {
                    FUJI_OC_SEND_OBJECT => log.raf = container.payload,
                    FUJI_OC_START_RAW_CONVERSION => log.blob = container.payload,
                    _ => {}
                }
                return self.answer(&command, &mut log);
            }

            log.operations.push(container.code);
            if matches!(
                container.code,
                FUJI_OC_SEND_OBJECT_INFO | FUJI_OC_SEND_OBJECT | FUJI_OC_START_RAW_CONVERSION
            ) {
                pending = Some(container);
                return Vec::new();
            }
            self.answer(&container, &mut log)
        });
        log
    }

    fn answer(&mut self, command: &Container, log: &mut CameraLog) -> Vec<Vec<u8>> {
        let tx = command.transaction_id;
        let respond = |code: u16, params: &[u32]| Container::response(code, tx, params).to_bytes();
        let data = |payload: Vec<u8>| Container::data(command.code, tx, payload).to_bytes();

        match command.code {
            FUJI_OC_GET_CONVERSION_STATUS => log.polls += 1,
            PTP_OC_DELETE_OBJECT => log.deleted.push(command.params[0]),
            _ => {}
        }
        if let Some(remaining) = self.busy.get_mut(&command.code)
            && *remaining > 0
        {
            *remaining -= 1;
            return vec![respond(PTP_RC_DEVICE_BUSY, &[])];
        }
        if self.failing.contains(&command.code) {
            return vec![respond(PTP_RC_GENERAL_ERROR, &[])];
        }

        match command.code {
            PTP_OC_OPEN_SESSION | PTP_OC_CLOSE_SESSION | FUJI_OC_SEND_OBJECT => {
                vec![respond(PTP_RC_OK, &[])]
            }
            PTP_OC_GET_DEVICE_INFO => {
                let info = DeviceInfo {
                    standard_version: 100,
                    manufacturer: "FUJIFILM".into(),
                    model: self.model.clone(),
                    operations_supported: self.operations.clone(),
                    ..Default::default()
                };
                vec![data(info.to_bytes()), respond(PTP_RC_OK, &[])]
            }
            FUJI_OC_SEND_OBJECT_INFO => vec![respond(PTP_RC_OK, &self.object_info_params)],
            FUJI_OC_START_RAW_CONVERSION => vec![respond(PTP_RC_OK, &[CONVERSION_ID])],
            FUJI_OC_GET_CONVERSION_STATUS => {
                let [state, detail] = self.statuses.pop_front().unwrap_or([2, JPEG_HANDLE]);
                vec![respond(PTP_RC_OK, &[state, detail])]
            }
            PTP_OC_GET_OBJECT => vec![data(self.jpeg.clone()), respond(PTP_RC_OK, &[])],
            PTP_OC_GET_DEVICE_PROP_VALUE => {
                vec![data(self.profile.clone()), respond(PTP_RC_OK, &[])]
            }
            PTP_OC_DELETE_OBJECT => vec![respond(PTP_RC_OK, &[])],
            _ => vec![respond(PTP_RC_OPERATION_NOT_SUPPORTED, &[])],
        }
    }
}
