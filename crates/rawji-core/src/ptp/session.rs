//! PTP session: transaction framing over a bulk transport.
//!
//! A transaction is a Command container, an optional Data container
//! (host→device for send-type operations, device→host for get-type
//! operations) and a Response container. The session assigns strictly
//! increasing transaction ids and refuses any container whose echoed id
//! does not match the outstanding request.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, instrument, trace, warn};

use super::constants::*;
use super::container::Container;
use super::dataset::DeviceInfo;
use super::error::ProtocolError;
use super::response::ResponseCode;
use crate::error::Error;
use crate::transport::{TransportError, UsbTransport};

/// Lifecycle of a PTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    /// A protocol violation was seen; only CloseSession is still attempted.
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Closed => write!(f, "CLOSED"),
            SessionState::Open => write!(f, "OPEN"),
            SessionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Transfer limits for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Per-transfer timeout for command and response containers.
    pub command_timeout: Duration,
    /// Per-transfer timeout for data-phase chunks.
    pub data_timeout: Duration,
    /// Largest single bulk transfer.
    pub chunk_size: usize,
    /// Largest container accepted from the device.
    pub max_container_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(3),
            data_timeout: Duration::from_secs(10),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_container_size: DEFAULT_MAX_CONTAINER_SIZE,
        }
    }
}

/// Direction and payload of a transaction's data phase.
#[derive(Debug, Clone, Copy)]
pub enum DataPhase<'d> {
    None,
    Send(&'d [u8]),
    Receive,
}

/// One operation request.
#[derive(Debug, Clone)]
pub struct Transaction<'d> {
    pub operation: u16,
    pub params: Vec<u32>,
    pub data: DataPhase<'d>,
}

impl<'d> Transaction<'d> {
    pub fn new(operation: u16, params: &[u32]) -> Self {
        Self {
            operation,
            params: params.to_vec(),
            data: DataPhase::None,
        }
    }

    pub fn sending(mut self, payload: &'d [u8]) -> Self {
        self.data = DataPhase::Send(payload);
        self
    }

    pub fn receiving(mut self) -> Self {
        self.data = DataPhase::Receive;
        self
    }
}

/// Outcome of a completed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    pub operation: u16,
    pub transaction_id: u32,
    pub code: ResponseCode,
    pub params: Vec<u32>,
    /// Payload of the device→host data phase, empty otherwise.
    pub data: Vec<u8>,
}

impl TransactionResponse {
    /// Accept only an OK response. DeviceBusy becomes [`Error::DeviceBusy`]
    /// so callers can retry; any other code is a protocol error.
    pub fn into_ok(self) -> Result<Self, Error> {
        if self.code.is_ok() {
            Ok(self)
        } else if self.code.is_busy() {
            Err(Error::DeviceBusy)
        } else {
            Err(ProtocolError::UnexpectedResponse {
                operation: self.operation,
                code: self.code,
            }
            .into())
        }
    }

    pub fn param(&self, index: usize) -> Result<u32, ProtocolError> {
        self.params
            .get(index)
            .copied()
            .ok_or(ProtocolError::MissingParameter {
                operation: self.operation,
                index,
            })
    }
}

/// PTP session over a borrowed device handle.
pub struct PtpSession<'t, T: UsbTransport + ?Sized> {
    transport: &'t T,
    options: SessionOptions,
    state: SessionState,
    session_id: u32,
    next_transaction_id: u32,
    last_transaction_id: Option<u32>,
    /// Bytes read past the end of the previous container.
    rx_buffer: Vec<u8>,
}

impl<'t, T: UsbTransport + ?Sized> PtpSession<'t, T> {
    pub fn new(transport: &'t T, options: SessionOptions) -> Self {
        Self {
            transport,
            options,
            state: SessionState::Closed,
            session_id: 0,
            next_transaction_id: 0,
            last_transaction_id: None,
            rx_buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Id of the most recently issued transaction.
    pub fn last_transaction_id(&self) -> Option<u32> {
        self.last_transaction_id
    }

    /// Open the session and read the device's capabilities.
    pub fn open(&mut self, session_id: u32) -> Result<DeviceInfo, Error> {
        self.open_session(session_id)?;
        self.device_info()
    }

    /// Run OpenSession. A busy answer leaves the session closed, so the
    /// call can be repeated.
    #[instrument(skip(self))]
    pub fn open_session(&mut self, session_id: u32) -> Result<(), Error> {
        if self.state == SessionState::Open {
            return Err(ProtocolError::SessionState {
                state: self.state,
                operation: PTP_OC_OPEN_SESSION,
            }
            .into());
        }
        self.rx_buffer.clear();
        self.session_id = session_id;

        let response = self.open_session_once()?;
        if response.code == ResponseCode::SESSION_ALREADY_OPEN {
            warn!("Session already open on device, closing and reopening");
            let close = Transaction::new(PTP_OC_CLOSE_SESSION, &[]);
            let id = self.allocate_transaction_id();
            // A stale session may refuse the close; the reopen decides.
            if let Err(e) = self.exchange(&close, id) {
                debug!(error = %e, "CloseSession of stale session failed");
            }
            self.open_session_once()?.into_ok()?;
        } else {
            response.into_ok()?;
        }

        self.state = SessionState::Open;
        info!(session_id, "Session opened");
        Ok(())
    }

    /// Read the GetDeviceInfo dataset.
    pub fn device_info(&mut self) -> Result<DeviceInfo, Error> {
        let info = self
            .transaction(Transaction::new(PTP_OC_GET_DEVICE_INFO, &[]).receiving())?
            .into_ok()?;
        let device_info = DeviceInfo::from_bytes(&info.data).map_err(|e| self.violation(e))?;
        info!(
            manufacturer = %device_info.manufacturer,
            model = %device_info.model,
            version = %device_info.device_version,
            "Device info"
        );
        Ok(device_info)
    }

    fn open_session_once(&mut self) -> Result<TransactionResponse, Error> {
        // OpenSession always carries transaction id 0; the session's
        // transactions then count up from 1.
        self.next_transaction_id = 0;
        let id = self.allocate_transaction_id();
        let request = Transaction::new(PTP_OC_OPEN_SESSION, &[self.session_id]);
        self.exchange(&request, id)
    }

    /// Run one transaction on the open session.
    #[instrument(skip(self, request), fields(op = request.operation))]
    pub fn transaction(&mut self, request: Transaction<'_>) -> Result<TransactionResponse, Error> {
        if self.state != SessionState::Open {
            return Err(ProtocolError::SessionState {
                state: self.state,
                operation: request.operation,
            }
            .into());
        }
        if request.params.len() > MAX_PARAMS {
            return Err(ProtocolError::TooManyParams {
                count: request.params.len(),
            }
            .into());
        }
        let id = self.allocate_transaction_id();
        self.exchange(&request, id)
    }

    /// Close the session. Also attempted from `Aborted` to leave the camera clean.
    #[instrument(skip(self))]
    pub fn close(&mut self) -> Result<(), Error> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let id = self.allocate_transaction_id();
        let result = self.exchange(&Transaction::new(PTP_OC_CLOSE_SESSION, &[]), id);
        self.state = SessionState::Closed;
        self.rx_buffer.clear();
        result?.into_ok()?;
        info!(session_id = self.session_id, "Session closed");
        Ok(())
    }

    fn allocate_transaction_id(&mut self) -> u32 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        self.last_transaction_id = Some(id);
        id
    }

    fn violation(&mut self, err: ProtocolError) -> Error {
        if self.state == SessionState::Open {
            warn!(error = %err, "Protocol violation, aborting session");
            self.state = SessionState::Aborted;
        }
        err.into()
    }

    fn exchange(
        &mut self,
        request: &Transaction<'_>,
        transaction_id: u32,
    ) -> Result<TransactionResponse, Error> {
        let result = self.run_phases(request, transaction_id);
        if let Err(Error::Transport(err)) = &result {
            self.desync(err);
        }
        result
    }

    /// A transfer failed mid-transaction: the pipe may still hold part of
    /// it, so buffered bytes are dropped and only CloseSession is allowed.
    fn desync(&mut self, err: &TransportError) {
        self.rx_buffer.clear();
        if self.state == SessionState::Open {
            warn!(error = %err, "Transfer failed mid-transaction, aborting session");
            self.state = SessionState::Aborted;
        }
    }

    fn run_phases(
        &mut self,
        request: &Transaction<'_>,
        transaction_id: u32,
    ) -> Result<TransactionResponse, Error> {
        let command = Container::command(request.operation, transaction_id, &request.params);
        trace!(
            op = request.operation,
            transaction_id,
            params = ?request.params,
            "Command"
        );
        self.transport
            .bulk_write(&command.to_bytes(), self.options.command_timeout)?;

        let mut data = Vec::new();
        match request.data {
            DataPhase::None => {}
            DataPhase::Send(payload) => {
                self.send_data(request.operation, transaction_id, payload)?;
            }
            DataPhase::Receive => {
                let container = self.read_container(self.options.data_timeout)?;
                if container.container_type == CONTAINER_DATA {
                    self.check_transaction_id(transaction_id, &container)?;
                    debug!(bytes = container.payload.len(), "Data phase received");
                    data = container.payload;
                } else {
                    // A device may skip the data phase and answer with an error
                    // response straight away.
                    return self.finish(request, transaction_id, container, data);
                }
            }
        }

        let container = self.read_container(self.options.command_timeout)?;
        self.finish(request, transaction_id, container, data)
    }

    fn finish(
        &mut self,
        request: &Transaction<'_>,
        transaction_id: u32,
        container: Container,
        data: Vec<u8>,
    ) -> Result<TransactionResponse, Error> {
        if container.container_type != CONTAINER_RESPONSE {
            return Err(self.violation(ProtocolError::UnexpectedContainer {
                expected: CONTAINER_RESPONSE,
                actual: container.container_type,
            }));
        }
        self.check_transaction_id(transaction_id, &container)?;

        let code = ResponseCode(container.code);
        trace!(code = %code, params = ?container.params, "Response");
        Ok(TransactionResponse {
            operation: request.operation,
            transaction_id,
            code,
            params: container.params,
            data,
        })
    }

    fn check_transaction_id(&mut self, expected: u32, container: &Container) -> Result<(), Error> {
        if container.transaction_id != expected {
            return Err(self.violation(ProtocolError::TransactionMismatch {
                expected,
                actual: container.transaction_id,
            }));
        }
        Ok(())
    }

    fn send_data(&mut self, operation: u16, transaction_id: u32, payload: &[u8]) -> Result<(), Error> {
        let bytes = Container::data(operation, transaction_id, payload.to_vec()).to_bytes();
        let total = bytes.len();
        for (i, chunk) in bytes.chunks(self.options.chunk_size.max(1)).enumerate() {
            self.transport.bulk_write(chunk, self.options.data_timeout)?;
            trace!(chunk = i, sent = (i * self.options.chunk_size + chunk.len()).min(total), total, "Data chunk");
        }
        debug!(bytes = payload.len(), "Data phase sent");
        Ok(())
    }

    fn read_container(&mut self, timeout: Duration) -> Result<Container, Error> {
        let mut empty_reads = 0;
        loop {
            if let Some(length) = Container::declared_length(&self.rx_buffer) {
                if length < CONTAINER_HEADER_SIZE {
                    return Err(self.violation(ProtocolError::Truncated {
                        expected: CONTAINER_HEADER_SIZE,
                        actual: length,
                    }));
                }
                if length > self.options.max_container_size {
                    return Err(self.violation(ProtocolError::ContainerTooLarge {
                        length,
                        limit: self.options.max_container_size,
                    }));
                }
                if self.rx_buffer.len() >= length {
                    let rest = self.rx_buffer.split_off(length);
                    let bytes = std::mem::replace(&mut self.rx_buffer, rest);
                    return Container::from_bytes(&bytes).map_err(|e| self.violation(e));
                }
            }

            let chunk = self.transport.bulk_read(self.options.chunk_size, timeout)?;
            if chunk.is_empty() {
                empty_reads += 1;
                if empty_reads > 8 {
                    return Err(self.violation(ProtocolError::Truncated {
                        expected: CONTAINER_HEADER_SIZE,
                        actual: self.rx_buffer.len(),
                    }));
                }
                continue;
            }
            self.rx_buffer.extend_from_slice(&chunk);
        }
    }
}
