/// Mesh header inspection for debug logging
///
/// Application payloads start with a fixed big-endian header. The transport
/// never routes on it; it only renders it when a packet is decoded.
///
/// Layout (22 bytes):
/// [1] ttl (i8)
/// [2] receiver (u16)
/// [1] increment (u8)
/// [1] user id (u8)
/// [1] message type (u8)
/// [4] longitude (f32)
/// [4] latitude (f32)
/// [8] timestamp (i64)

use std::fmt;

/// Size of the fixed mesh header
pub const MESH_HEADER_SIZE: usize = 22;

/// Fixed header at the front of a mesh payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshHeader {
    pub ttl: i8,
    pub receiver: u16,
    pub increment: u8,
    pub user_id: u8,
    pub message_type: u8,
    pub longitude: f32,
    pub latitude: f32,
    pub timestamp: i64,
}

impl MeshHeader {
    /// Read the header from the front of `payload`, if there is room for one
    pub fn peek(payload: &[u8]) -> Option<Self> {
        if payload.len() < MESH_HEADER_SIZE {
            return None;
        }

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&payload[14..22]);

        Some(Self {
            ttl: payload[0] as i8,
            receiver: u16::from_be_bytes([payload[1], payload[2]]),
            increment: payload[3],
            user_id: payload[4],
            message_type: payload[5],
            longitude: f32::from_be_bytes([payload[6], payload[7], payload[8], payload[9]]),
            latitude: f32::from_be_bytes([payload[10], payload[11], payload[12], payload[13]]),
            timestamp: i64::from_be_bytes(ts),
        })
    }

    /// Serialize back to the 22-byte wire form
    pub fn to_bytes(&self) -> [u8; MESH_HEADER_SIZE] {
        let mut out = [0u8; MESH_HEADER_SIZE];
        out[0] = self.ttl as u8;
        out[1..3].copy_from_slice(&self.receiver.to_be_bytes());
        out[3] = self.increment;
        out[4] = self.user_id;
        out[5] = self.message_type;
        out[6..10].copy_from_slice(&self.longitude.to_be_bytes());
        out[10..14].copy_from_slice(&self.latitude.to_be_bytes());
        out[14..22].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }
}

impl fmt::Display for MeshHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ttl:{}, r:{}, i:{}, uid:{}, t:{}, lo: {}, la:{}, t:{}",
            self.ttl,
            self.receiver,
            self.increment,
            self.user_id,
            self.message_type,
            self.longitude,
            self.latitude,
            self.timestamp
        )
    }
}
