// Transport module: BLE advertisement broadcast

pub mod ble;

pub use ble::{
    BroadcastTransport, RadioBridge, RadioLayout, TransportConfig, TransportError, TransportEvent,
    TransportRole,
};
