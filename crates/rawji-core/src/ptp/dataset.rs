//! PTP datasets carried in data phases: DeviceInfo and ObjectInfo.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use super::constants::{FUJI_OFC_RAF, FUJI_UPLOAD_FILENAME};
use super::error::ProtocolError;

/// Read a PTP string: u8 character count (including the NUL), then UTF-16LE.
pub fn read_string<R: Read>(reader: &mut R) -> Result<String, ProtocolError> {
    let count = reader.read_u8()? as usize;
    let mut units = Vec::with_capacity(count);
    for _ in 0..count {
        units.push(reader.read_u16::<LittleEndian>()?);
    }
    if units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|e| ProtocolError::Dataset(e.to_string()))
}

/// Append a PTP string. An empty string is a single zero count byte.
///
/// The count byte covers the terminator, so at most 254 UTF-16 units are
/// written; anything past that is cut off.
pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    if value.is_empty() {
        buf.push(0);
        return;
    }
    let units: Vec<u16> = value.encode_utf16().collect();
    buf.push((units.len() + 1).min(u8::MAX as usize) as u8);
    for unit in units.iter().take(u8::MAX as usize - 1) {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.extend_from_slice(&0u16.to_le_bytes());
}

fn read_u16_array(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u16>, ProtocolError> {
    let count = cursor.read_u32::<LittleEndian>()? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if count * 2 > remaining {
        return Err(ProtocolError::Dataset(format!(
            "array of {count} entries overruns dataset ({remaining} bytes left)"
        )));
    }
    (0..count)
        .map(|_| cursor.read_u16::<LittleEndian>().map_err(ProtocolError::from))
        .collect()
}

/// Parsed GetDeviceInfo dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub standard_version: u16,
    pub vendor_extension_id: u32,
    pub vendor_extension_version: u16,
    pub vendor_extension_desc: String,
    pub functional_mode: u16,
    pub operations_supported: Vec<u16>,
    pub events_supported: Vec<u16>,
    pub device_properties_supported: Vec<u16>,
    pub capture_formats: Vec<u16>,
    pub image_formats: Vec<u16>,
    pub manufacturer: String,
    pub model: String,
    pub device_version: String,
    pub serial_number: String,
}

impl DeviceInfo {
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = Cursor::new(data);
        Ok(Self {
            standard_version: cursor.read_u16::<LittleEndian>()?,
            vendor_extension_id: cursor.read_u32::<LittleEndian>()?,
            vendor_extension_version: cursor.read_u16::<LittleEndian>()?,
            vendor_extension_desc: read_string(&mut cursor)?,
            functional_mode: cursor.read_u16::<LittleEndian>()?,
            operations_supported: read_u16_array(&mut cursor)?,
            events_supported: read_u16_array(&mut cursor)?,
            device_properties_supported: read_u16_array(&mut cursor)?,
            capture_formats: read_u16_array(&mut cursor)?,
            image_formats: read_u16_array(&mut cursor)?,
            manufacturer: read_string(&mut cursor)?,
            model: read_string(&mut cursor)?,
            device_version: read_string(&mut cursor)?,
            serial_number: read_string(&mut cursor)?,
        })
    }

    pub fn supports_operation(&self, operation: u16) -> bool {
        self.operations_supported.contains(&operation)
    }

    /// Encode back to the wire layout. Used to script simulated cameras.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u16::<LittleEndian>(self.standard_version).unwrap();
        buf.write_u32::<LittleEndian>(self.vendor_extension_id).unwrap();
        buf.write_u16::<LittleEndian>(self.vendor_extension_version).unwrap();
        write_string(&mut buf, &self.vendor_extension_desc);
        buf.write_u16::<LittleEndian>(self.functional_mode).unwrap();
        for array in [
            &self.operations_supported,
            &self.events_supported,
            &self.device_properties_supported,
            &self.capture_formats,
            &self.image_formats,
        ] {
            buf.write_u32::<LittleEndian>(array.len() as u32).unwrap();
            for &v in array.iter() {
                buf.write_u16::<LittleEndian>(v).unwrap();
            }
        }
        write_string(&mut buf, &self.manufacturer);
        write_string(&mut buf, &self.model);
        write_string(&mut buf, &self.device_version);
        write_string(&mut buf, &self.serial_number);
        buf
    }
}

/// ObjectInfo dataset announcing a RAF upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub object_format: u16,
    pub compressed_size: u32,
    pub parent_object: u32,
    pub filename: String,
}

impl ObjectInfo {
    /// ObjectInfo the camera accepts for a RAF of `size` bytes.
    pub fn raf(size: u32) -> Self {
        Self {
            storage_id: 0,
            object_format: FUJI_OFC_RAF,
            compressed_size: size,
            parent_object: 0,
            filename: FUJI_UPLOAD_FILENAME.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(96);
        buf.write_u32::<LittleEndian>(self.storage_id).unwrap();
        buf.write_u16::<LittleEndian>(self.object_format).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // protection status
        buf.write_u32::<LittleEndian>(self.compressed_size).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // thumb format
        // thumb size, thumb width/height, image width/height, bit depth
        for _ in 0..6 {
            buf.write_u32::<LittleEndian>(0).unwrap();
        }
        buf.write_u32::<LittleEndian>(self.parent_object).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap(); // association type
        buf.write_u32::<LittleEndian>(0).unwrap(); // association desc
        buf.write_u32::<LittleEndian>(0).unwrap(); // sequence number
        write_string(&mut buf, &self.filename);
        write_string(&mut buf, ""); // capture date
        write_string(&mut buf, ""); // modification date
        write_string(&mut buf, ""); // keywords
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_encoding() {
        let mut buf = Vec::new();
        write_string(&mut buf, "AB");
        assert_eq!(buf, [3, b'A', 0, b'B', 0, 0, 0]);
        assert_eq!(read_string(&mut Cursor::new(&buf[..])).unwrap(), "AB");

        let mut empty = Vec::new();
        write_string(&mut empty, "");
        assert_eq!(empty, [0]);
        assert_eq!(read_string(&mut Cursor::new(&empty[..])).unwrap(), "");
    }

    #[test]
    fn test_long_string_is_cut_to_count_byte() {
        let long = "x".repeat(300);
        let mut buf = Vec::new();
        write_string(&mut buf, &long);
        assert_eq!(buf[0], 255);
        assert_eq!(buf.len(), 1 + 255 * 2);

        let back = read_string(&mut Cursor::new(buf.as_slice())).unwrap();
        assert_eq!(back, "x".repeat(254));
    }

    #[test]
    fn test_device_info_parse() {
        let info = DeviceInfo {
            standard_version: 100,
            vendor_extension_id: 0x0E,
            vendor_extension_version: 100,
            vendor_extension_desc: "fujifilm.co.jp: 1.0;".into(),
            operations_supported: vec![0x1001, 0x1002, 0x9060],
            device_properties_supported: vec![0xD185],
            manufacturer: "FUJIFILM".into(),
            model: "X-T3".into(),
            ..Default::default()
        };
        let parsed = DeviceInfo::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(parsed, info);
        assert!(parsed.supports_operation(0x9060));
        assert!(!parsed.supports_operation(0x9061));
    }

    #[test]
    fn test_device_info_overrun_rejected() {
        let mut bytes = DeviceInfo::default().to_bytes();
        // Claim 1000 operations where none follow.
        bytes[11..15].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            DeviceInfo::from_bytes(&bytes),
            Err(ProtocolError::Dataset(_))
        ));
    }

    #[test]
    fn test_raf_object_info_layout() {
        let bytes = ObjectInfo::raf(0x0123_4567).to_bytes();
        assert_eq!(&bytes[4..6], &FUJI_OFC_RAF.to_le_bytes());
        assert_eq!(&bytes[8..12], &0x0123_4567u32.to_le_bytes());
        // Fixed part is 52 bytes, then the filename string.
        assert_eq!(bytes[52] as usize, FUJI_UPLOAD_FILENAME.len() + 1);
        assert_eq!(bytes.len(), 52 + 1 + (FUJI_UPLOAD_FILENAME.len() + 1) * 2 + 3);
    }
}
