//! Mock USB transport for testing.
//!
//! Writes are logged raw and also reassembled into whole PTP containers
//! (using the length prefix), so a test can script a camera by installing
//! a responder that answers each complete container.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::camera::{FUJIFILM_VENDOR_ID, X_T3};

/// Simulated device logic: receives one complete container written by the
/// host and returns the byte blocks the device sends back.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// Mock transport for unit testing session and orchestrator logic.
pub struct MockTransport {
    /// Queued blocks to return on read.
    read_queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    /// Captured raw writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Bytes of a container still being written in chunks.
    pending_out: Mutex<Vec<u8>>,
    /// Complete containers reassembled from the writes.
    containers: Arc<Mutex<Vec<Vec<u8>>>>,
    responder: Mutex<Option<Responder>>,
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
    /// Index of a future write that fails once.
    failing_write: Mutex<Option<usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_ids(FUJIFILM_VENDOR_ID, X_T3.product_id)
    }

    pub fn with_ids(vid: u16, pid: u16) -> Self {
        Self {
            read_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            pending_out: Mutex::new(Vec::new()),
            containers: Arc::new(Mutex::new(Vec::new())),
            responder: Mutex::new(None),
            vid,
            pid,
            connected: Arc::new(Mutex::new(true)),
            failing_write: Mutex::new(None),
        }
    }

    /// Install device logic that answers every complete container.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Queue a block to be returned on a future read.
    pub fn queue_read(&self, bytes: &[u8]) {
        self.read_queue.lock().unwrap().push_back(bytes.to_vec());
    }

    /// Get all captured raw writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Number of bulk writes issued so far.
    pub fn write_count(&self) -> usize {
        self.write_log.lock().unwrap().len()
    }

    /// Complete containers the host has sent.
    pub fn sent_containers(&self) -> Vec<Vec<u8>> {
        self.containers.lock().unwrap().clone()
    }

    /// Clear captured writes and containers.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
        self.containers.lock().unwrap().clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Make the write with this index (counting logged writes from zero)
    /// fail once. The failed bytes are neither logged nor delivered.
    pub fn fail_write(&self, index: usize) {
        *self.failing_write.lock().unwrap() = Some(index);
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn take_complete_containers(&self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut pending = self.pending_out.lock().unwrap();
        pending.extend_from_slice(data);

        let mut complete = Vec::new();
        while pending.len() >= 4 {
            let declared = u32::from_le_bytes([pending[0], pending[1], pending[2], pending[3]]) as usize;
            // Garbage length: hand the whole buffer over as one block.
            let len = if declared < 12 { pending.len() } else { declared };
            if pending.len() < len {
                break;
            }
            complete.push(pending.drain(..len).collect());
        }
        complete
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn bulk_write(&self, data: &[u8], _timeout: Duration) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        {
            let mut failing = self.failing_write.lock().unwrap();
            if *failing == Some(self.write_count()) {
                *failing = None;
                return Err(TransportError::WriteFailed("injected".into()));
            }
        }
        self.write_log.lock().unwrap().push(data.to_vec());

        for container in self.take_complete_containers(data) {
            let replies = match self.responder.lock().unwrap().as_mut() {
                Some(responder) => responder(&container),
                None => Vec::new(),
            };
            self.containers.lock().unwrap().push(container);
            self.read_queue.lock().unwrap().extend(replies);
        }
        Ok(())
    }

    fn bulk_read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        let mut queue = self.read_queue.lock().unwrap();
        let mut block = queue.pop_front().ok_or(TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })?;
        if block.len() > max_len {
            let rest = block.split_off(max_len);
            queue.push_front(rest);
        }
        Ok(block)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ptp::container::Container;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_mock_read_queue() {
        let mock = MockTransport::new();
        mock.queue_read(b"first");
        mock.queue_read(b"second");

        assert_eq!(mock.bulk_read(512, T).unwrap(), b"first");
        assert_eq!(mock.bulk_read(512, T).unwrap(), b"second");

        // Queue is empty now
        assert!(matches!(
            mock.bulk_read(512, T),
            Err(TransportError::Timeout { timeout_ms: 10 })
        ));
    }

    #[test]
    fn test_mock_read_splits_long_blocks() {
        let mock = MockTransport::new();
        mock.queue_read(b"HelloWorld");

        assert_eq!(mock.bulk_read(5, T).unwrap(), b"Hello");
        assert_eq!(mock.bulk_read(512, T).unwrap(), b"World");
    }

    #[test]
    fn test_mock_reassembles_chunked_containers() {
        let mock = MockTransport::new();
        let bytes = Container::data(0x100D, 7, vec![0xAB; 40]).to_bytes();

        mock.bulk_write(&bytes[..20], T).unwrap();
        assert!(mock.sent_containers().is_empty());
        mock.bulk_write(&bytes[20..], T).unwrap();

        assert_eq!(mock.write_count(), 2);
        assert_eq!(mock.sent_containers(), vec![bytes]);
    }

    #[test]
    fn test_mock_responder_answers_each_container() {
        let mock = MockTransport::new();
        mock.set_responder(|container| {
            let cmd = Container::from_bytes(container).unwrap();
            vec![Container::response(0x2001, cmd.transaction_id, &[]).to_bytes()]
        });

        mock.bulk_write(&Container::command(0x1002, 0, &[1]).to_bytes(), T)
            .unwrap();
        let reply = Container::from_bytes(&mock.bulk_read(512, T).unwrap()).unwrap();
        assert_eq!(reply.code, 0x2001);
        assert_eq!(reply.transaction_id, 0);
    }

    #[test]
    fn test_mock_injected_write_failure_is_one_shot() {
        let mock = MockTransport::new();
        mock.bulk_write(b"one", T).unwrap();
        mock.fail_write(1);

        assert!(matches!(
            mock.bulk_write(b"two", T),
            Err(TransportError::WriteFailed(_))
        ));
        assert_eq!(mock.write_count(), 1);
        mock.bulk_write(b"two", T).unwrap();
        assert_eq!(mock.get_writes(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(matches!(
            mock.bulk_write(b"test", T),
            Err(TransportError::Disconnected)
        ));
        mock.reconnect();
        assert!(mock.bulk_write(b"test", T).is_ok());
    }
}
