/// Frame codec between application payloads and advertisement packets
///
/// The only place that knows the binary layout of a packet. Both directions
/// are pure functions; nothing here touches the radio.
///
/// Layouts:
/// - UUID service data: `[FF FF][payload 0..27][zero pad]` split into a
///   16-byte big-endian UUID and a 13-byte service-data body
/// - Manufacturer data: `[company id LE:2][payload]`, never padded
/// - Length-prefixed: `[3 + n][type][FF FF][payload n][zero pad]`, 31 bytes

use super::layout::{
    RadioLayout, COMPANY_ID_SIZE, FRAME_MAGIC, LENGTH_PREFIXED_DEFAULT_TYPE,
    LENGTH_PREFIXED_FRAME_SIZE, LENGTH_PREFIXED_HEADER_SIZE, LENGTH_PREFIXED_MIN_LENGTH,
    UUID_PACKET_SIZE, UUID_SIZE,
};
use thiserror::Error;
use uuid::Uuid;

/// Errors from encoding or decoding a packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Payload too large: {size} bytes (capacity {capacity})")]
    PayloadTooLarge { size: usize, capacity: usize },
    #[error("Empty payload cannot be framed")]
    EmptyPayload,
    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },
    #[error("Bad frame magic")]
    BadMagic,
    #[error("Length byte {declared} inconsistent with {available} frame bytes")]
    LengthMismatch { declared: u8, available: usize },
}

/// An encoded packet, ready to hand to the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioPacket {
    /// Advertised as service data keyed by `service_uuid`
    ServiceData {
        service_uuid: Uuid,
        service_data: Vec<u8>,
    },
    /// Advertised as manufacturer-specific data
    ManufacturerData { company_id: u16, data: Vec<u8> },
    /// Advertised as one raw frame
    Frame(Vec<u8>),
}

impl RadioPacket {
    /// Contiguous bytes as the radio delivers them on the receive path
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RadioPacket::ServiceData {
                service_uuid,
                service_data,
            } => {
                let mut bytes = Vec::with_capacity(UUID_SIZE + service_data.len());
                bytes.extend_from_slice(service_uuid.as_bytes());
                bytes.extend_from_slice(service_data);
                bytes
            }
            RadioPacket::ManufacturerData { company_id, data } => {
                let mut bytes = Vec::with_capacity(COMPANY_ID_SIZE + data.len());
                bytes.extend_from_slice(&company_id.to_le_bytes());
                bytes.extend_from_slice(data);
                bytes
            }
            RadioPacket::Frame(frame) => frame.clone(),
        }
    }

    /// Size on air in bytes
    pub fn len(&self) -> usize {
        match self {
            RadioPacket::ServiceData { service_data, .. } => UUID_SIZE + service_data.len(),
            RadioPacket::ManufacturerData { data, .. } => COMPANY_ID_SIZE + data.len(),
            RadioPacket::Frame(frame) => frame.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode `payload` for `layout`
pub fn encode(payload: &[u8], layout: &RadioLayout) -> Result<RadioPacket, FramingError> {
    let capacity = layout.capacity();
    if payload.len() > capacity {
        return Err(FramingError::PayloadTooLarge {
            size: payload.len(),
            capacity,
        });
    }

    match layout {
        RadioLayout::UuidServiceData => Ok(encode_service_data(payload)),
        RadioLayout::ManufacturerData { company_id } => Ok(RadioPacket::ManufacturerData {
            company_id: *company_id,
            data: payload.to_vec(),
        }),
        RadioLayout::LengthPrefixed => encode_length_prefixed(payload),
    }
}

/// Decode raw received bytes for `layout`
pub fn decode(bytes: &[u8], layout: &RadioLayout) -> Result<Vec<u8>, FramingError> {
    match layout {
        RadioLayout::UuidServiceData => decode_service_data(bytes),
        RadioLayout::ManufacturerData { company_id } => decode_manufacturer(bytes, *company_id),
        RadioLayout::LengthPrefixed => decode_length_prefixed(bytes),
    }
}

fn encode_service_data(payload: &[u8]) -> RadioPacket {
    let mut packet = [0u8; UUID_PACKET_SIZE];
    packet[..FRAME_MAGIC.len()].copy_from_slice(&FRAME_MAGIC);
    packet[FRAME_MAGIC.len()..FRAME_MAGIC.len() + payload.len()].copy_from_slice(payload);

    let mut uuid_bytes = [0u8; UUID_SIZE];
    uuid_bytes.copy_from_slice(&packet[..UUID_SIZE]);

    RadioPacket::ServiceData {
        service_uuid: Uuid::from_bytes(uuid_bytes),
        service_data: packet[UUID_SIZE..].to_vec(),
    }
}

fn decode_service_data(bytes: &[u8]) -> Result<Vec<u8>, FramingError> {
    if bytes.len() != UUID_PACKET_SIZE {
        return Err(FramingError::MalformedFrame {
            expected: UUID_PACKET_SIZE,
            actual: bytes.len(),
        });
    }
    if bytes[..FRAME_MAGIC.len()] != FRAME_MAGIC {
        return Err(FramingError::BadMagic);
    }
    Ok(bytes[FRAME_MAGIC.len()..].to_vec())
}

fn decode_manufacturer(bytes: &[u8], company_id: u16) -> Result<Vec<u8>, FramingError> {
    let (min, max) = RadioLayout::ManufacturerData { company_id }.raw_size_bounds();
    if bytes.len() < min || bytes.len() > max {
        return Err(FramingError::MalformedFrame {
            expected: if bytes.len() < min { min } else { max },
            actual: bytes.len(),
        });
    }
    if u16::from_le_bytes([bytes[0], bytes[1]]) != company_id {
        return Err(FramingError::BadMagic);
    }
    Ok(bytes[COMPANY_ID_SIZE..].to_vec())
}

fn encode_length_prefixed(payload: &[u8]) -> Result<RadioPacket, FramingError> {
    if payload.is_empty() {
        return Err(FramingError::EmptyPayload);
    }

    let mut frame = vec![0u8; LENGTH_PREFIXED_FRAME_SIZE];
    // Payload fits in 27 bytes, so the length byte cannot overflow
    frame[0] = (LENGTH_PREFIXED_HEADER_SIZE - 1 + payload.len()) as u8;
    frame[1] = LENGTH_PREFIXED_DEFAULT_TYPE;
    frame[2..LENGTH_PREFIXED_HEADER_SIZE].copy_from_slice(&FRAME_MAGIC);
    frame[LENGTH_PREFIXED_HEADER_SIZE..LENGTH_PREFIXED_HEADER_SIZE + payload.len()]
        .copy_from_slice(payload);

    Ok(RadioPacket::Frame(frame))
}

fn decode_length_prefixed(bytes: &[u8]) -> Result<Vec<u8>, FramingError> {
    if bytes.len() != LENGTH_PREFIXED_FRAME_SIZE {
        return Err(FramingError::MalformedFrame {
            expected: LENGTH_PREFIXED_FRAME_SIZE,
            actual: bytes.len(),
        });
    }
    if bytes[2..LENGTH_PREFIXED_HEADER_SIZE] != FRAME_MAGIC {
        return Err(FramingError::BadMagic);
    }

    // bytes[1] is the reserved type; it carries no rule yet
    let declared = bytes[0];
    if declared < LENGTH_PREFIXED_MIN_LENGTH || declared as usize + 1 > bytes.len() {
        return Err(FramingError::LengthMismatch {
            declared,
            available: bytes.len(),
        });
    }

    let end = declared as usize + 1;
    Ok(bytes[LENGTH_PREFIXED_HEADER_SIZE..end].to_vec())
}
