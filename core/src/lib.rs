// EventMesh Core: BLE broadcast transport
#![allow(clippy::empty_line_after_doc_comments)]
//
// Moves short application payloads between nearby devices inside BLE
// advertisements. No connections, no acknowledgements, no routing.

pub mod transport;

pub use transport::ble::{
    decode, encode, AdvertiseFailure, BroadcastTransport, Capability, FramingError, MeshHeader,
    PermissionGate, PermissionProvider, RadioBridge, RadioFailure, RadioHandle, RadioLayout,
    RadioPacket, RoleState, ScanFailure, TransportConfig, TransportError, TransportEvent,
    TransportRole, TransportStats,
};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` applies.
/// Safe to call more than once.
pub fn init_logging(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .try_init();
}
