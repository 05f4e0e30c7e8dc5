//! PTP USB bulk container.
//!
//! Every phase of a transaction travels as one container:
//!
//! ```text
//! [0..4]   length (u32 LE, includes this header)
//! [4..6]   container type (u16 LE)
//! [6..8]   operation / response code (u16 LE)
//! [8..12]  transaction id (u32 LE)
//! [12..]   up to 5 u32 parameters (command/response) or payload (data)
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use super::constants::*;
use super::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub container_type: u16,
    pub code: u16,
    pub transaction_id: u32,
    pub params: Vec<u32>,
    pub payload: Vec<u8>,
}

impl Container {
    pub fn command(code: u16, transaction_id: u32, params: &[u32]) -> Self {
        Self {
            container_type: CONTAINER_COMMAND,
            code,
            transaction_id,
            params: params.to_vec(),
            payload: Vec::new(),
        }
    }

    pub fn data(code: u16, transaction_id: u32, payload: Vec<u8>) -> Self {
        Self {
            container_type: CONTAINER_DATA,
            code,
            transaction_id,
            params: Vec::new(),
            payload,
        }
    }

    pub fn response(code: u16, transaction_id: u32, params: &[u32]) -> Self {
        Self {
            container_type: CONTAINER_RESPONSE,
            code,
            transaction_id,
            params: params.to_vec(),
            payload: Vec::new(),
        }
    }

    /// Total encoded size.
    pub fn encoded_len(&self) -> usize {
        CONTAINER_HEADER_SIZE + self.params.len().min(MAX_PARAMS) * 4 + self.payload.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        // Writes into a Vec cannot fail.
        buf.write_u32::<LittleEndian>(self.encoded_len() as u32).unwrap();
        buf.write_u16::<LittleEndian>(self.container_type).unwrap();
        buf.write_u16::<LittleEndian>(self.code).unwrap();
        buf.write_u32::<LittleEndian>(self.transaction_id).unwrap();
        for &p in self.params.iter().take(MAX_PARAMS) {
            buf.write_u32::<LittleEndian>(p).unwrap();
        }
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Length declared in a container header, if enough bytes are present.
    pub fn declared_length(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < 4 {
            return None;
        }
        let mut cursor = Cursor::new(bytes);
        cursor.read_u32::<LittleEndian>().ok().map(|l| l as usize)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < CONTAINER_HEADER_SIZE {
            return Err(ProtocolError::Truncated {
                expected: CONTAINER_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let length = cursor.read_u32::<LittleEndian>()? as usize;
        let container_type = cursor.read_u16::<LittleEndian>()?;
        let code = cursor.read_u16::<LittleEndian>()?;
        let transaction_id = cursor.read_u32::<LittleEndian>()?;

        if length < CONTAINER_HEADER_SIZE || length > data.len() {
            return Err(ProtocolError::Truncated {
                expected: length.max(CONTAINER_HEADER_SIZE),
                actual: data.len(),
            });
        }
        let body = &data[CONTAINER_HEADER_SIZE..length];

        let mut params = Vec::new();
        let mut payload = Vec::new();
        if container_type == CONTAINER_DATA {
            payload = body.to_vec();
        } else {
            let mut cursor = Cursor::new(body);
            while params.len() < MAX_PARAMS && (body.len() - cursor.position() as usize) >= 4 {
                params.push(cursor.read_u32::<LittleEndian>()?);
            }
        }

        Ok(Self {
            container_type,
            code,
            transaction_id,
            params,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_layout() {
        let bytes = Container::command(PTP_OC_OPEN_SESSION, 0, &[1]).to_bytes();
        assert_eq!(
            bytes,
            [16, 0, 0, 0, 1, 0, 0x02, 0x10, 0, 0, 0, 0, 1, 0, 0, 0]
        );
    }

    #[test]
    fn test_data_container_keeps_payload_whole() {
        let container = Container::data(PTP_OC_GET_OBJECT, 9, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let parsed = Container::from_bytes(&container.to_bytes()).unwrap();
        assert!(parsed.params.is_empty());
        assert_eq!(parsed.payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(parsed.transaction_id, 9);
    }

    #[test]
    fn test_response_params_capped_at_five() {
        let mut bytes = Container::response(PTP_RC_OK, 3, &[1, 2, 3, 4, 5]).to_bytes();
        // Extra trailing word beyond the five allowed parameters.
        bytes.extend_from_slice(&6u32.to_le_bytes());
        let len = bytes.len() as u32;
        bytes[..4].copy_from_slice(&len.to_le_bytes());

        let parsed = Container::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.params, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_truncated_container_rejected() {
        let bytes = Container::response(PTP_RC_OK, 3, &[7]).to_bytes();
        assert!(matches!(
            Container::from_bytes(&bytes[..10]),
            Err(ProtocolError::Truncated { .. })
        ));
        assert!(matches!(
            Container::from_bytes(&bytes[..14]),
            Err(ProtocolError::Truncated { expected: 16, actual: 14 })
        ));
    }

    #[test]
    fn test_declared_length() {
        let bytes = Container::data(PTP_OC_GET_OBJECT, 1, vec![0; 100]).to_bytes();
        assert_eq!(Container::declared_length(&bytes), Some(112));
        assert_eq!(Container::declared_length(&bytes[..3]), None);
    }
}
