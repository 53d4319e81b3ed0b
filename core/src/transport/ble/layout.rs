/// Radio layouts and packet-format constants
///
/// A BLE advertisement structure is capped at 31 bytes, so every layout has a
/// fixed, small capacity. The layout is picked once in `TransportConfig`; a
/// transport never mixes layouts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel that opens every framed packet
pub const FRAME_MAGIC: [u8; 2] = [0xFF, 0xFF];

/// Total bytes of one advertisement structure
pub const ADVERTISEMENT_MAX_BYTES: usize = 31;

/// Bytes of the UUID service-data packet (16-byte UUID + 13-byte body)
pub const UUID_PACKET_SIZE: usize = 29;

/// Bytes of the 128-bit service UUID
pub const UUID_SIZE: usize = 16;

/// Service-data body carried next to the UUID
pub const SERVICE_DATA_SIZE: usize = UUID_PACKET_SIZE - UUID_SIZE;

/// Length-prefixed frame size
pub const LENGTH_PREFIXED_FRAME_SIZE: usize = ADVERTISEMENT_MAX_BYTES;

/// Bytes before the payload in a length-prefixed frame: length, type, magic
pub const LENGTH_PREFIXED_HEADER_SIZE: usize = 4;

/// Smallest legal `length` byte (one payload byte)
pub const LENGTH_PREFIXED_MIN_LENGTH: u8 = 4;

/// Value of the reserved type byte written by encode
pub const LENGTH_PREFIXED_DEFAULT_TYPE: u8 = 0;

/// Bytes of the company identifier in manufacturer data
pub const COMPANY_ID_SIZE: usize = 2;

/// Company identifier used by EventMesh nodes
pub const EVENTMESH_COMPANY_ID: u16 = 0xF1A9;

/// Manufacturer payload budget: 31 minus AD length, AD type and company id
pub const MANUFACTURER_DATA_CAPACITY: usize = ADVERTISEMENT_MAX_BYTES - 2 - COMPANY_ID_SIZE;

/// How a payload is laid out inside an advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RadioLayout {
    /// 128-bit service UUID plus service data, magic in the UUID's first bytes
    UuidServiceData,
    /// Company id followed by the raw payload
    ManufacturerData {
        /// Company identifier, little-endian on the wire
        company_id: u16,
    },
    /// `[length][type][magic][payload]` padded to 31 bytes
    LengthPrefixed,
}

impl RadioLayout {
    /// Manufacturer layout with the EventMesh company id
    pub fn manufacturer() -> Self {
        RadioLayout::ManufacturerData {
            company_id: EVENTMESH_COMPANY_ID,
        }
    }

    /// Maximum payload bytes this layout can carry
    pub fn capacity(&self) -> usize {
        match self {
            RadioLayout::UuidServiceData => UUID_PACKET_SIZE - FRAME_MAGIC.len(),
            RadioLayout::ManufacturerData { .. } => MANUFACTURER_DATA_CAPACITY,
            RadioLayout::LengthPrefixed => {
                LENGTH_PREFIXED_FRAME_SIZE - LENGTH_PREFIXED_HEADER_SIZE
            }
        }
    }

    /// Exact raw size for fixed layouts, `None` for manufacturer data
    pub fn frame_size(&self) -> Option<usize> {
        match self {
            RadioLayout::UuidServiceData => Some(UUID_PACKET_SIZE),
            RadioLayout::ManufacturerData { .. } => None,
            RadioLayout::LengthPrefixed => Some(LENGTH_PREFIXED_FRAME_SIZE),
        }
    }

    /// Smallest and largest raw packet this layout accepts on receive
    pub fn raw_size_bounds(&self) -> (usize, usize) {
        match self.frame_size() {
            Some(size) => (size, size),
            None => (COMPANY_ID_SIZE, COMPANY_ID_SIZE + MANUFACTURER_DATA_CAPACITY),
        }
    }

    /// Whether encode pads short payloads up to the full frame
    pub fn pads_payload(&self) -> bool {
        !matches!(self, RadioLayout::ManufacturerData { .. })
    }
}

impl Default for RadioLayout {
    fn default() -> Self {
        Self::manufacturer()
    }
}

impl fmt::Display for RadioLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioLayout::UuidServiceData => write!(f, "uuid-service-data"),
            RadioLayout::ManufacturerData { company_id } => {
                write!(f, "manufacturer-data(0x{:04X})", company_id)
            }
            RadioLayout::LengthPrefixed => write!(f, "length-prefixed"),
        }
    }
}

impl std::str::FromStr for RadioLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uuid" | "uuid-service-data" => Ok(RadioLayout::UuidServiceData),
            "manufacturer" | "manufacturer-data" => Ok(RadioLayout::manufacturer()),
            "length-prefixed" | "frame" => Ok(RadioLayout::LengthPrefixed),
            other => Err(format!("unknown layout: {}", other)),
        }
    }
}
