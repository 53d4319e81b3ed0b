/// BLE advertisement broadcast transport
///
/// Connectionless messaging over BLE advertisements. Payloads are framed into
/// a single advertisement (see `layout` and `frame`), broadcast through the
/// platform radio, and picked back up by scanners on nearby devices.
///
/// - **layout**: the three supported packet layouts and their size limits
/// - **frame**: encode/decode between payloads and advertisement packets
/// - **header**: mesh header inspection for debug logging
/// - **radio**: the `RadioBridge` trait platform code implements
/// - **permissions**: capability grants gating every radio operation
/// - **broadcast**: the transmit/receive lifecycle state machine
/// - **loopback**: in-process radio and permissions for tests and simulation
///
/// Platform code (Swift/Kotlin) owns the hardware. Everything here is
/// testable without it.

pub mod broadcast;
pub mod config;
pub mod frame;
pub mod header;
pub mod layout;
pub mod loopback;
pub mod permissions;
pub mod radio;

pub use broadcast::{
    BroadcastTransport, RoleState, TransportError, TransportEvent, TransportRole, TransportStats,
};
pub use config::{ConfigError, TransportConfig};
pub use frame::{decode, encode, FramingError, RadioPacket};
pub use header::{MeshHeader, MESH_HEADER_SIZE};
pub use layout::{RadioLayout, ADVERTISEMENT_MAX_BYTES, EVENTMESH_COMPANY_ID, FRAME_MAGIC};
pub use loopback::{LoopbackRadio, RadioCallCounts, StaticPermissions};
pub use permissions::{Capability, PermissionGate, PermissionProvider};
pub use radio::{
    AdvertiseFailure, AdvertiseMode, AdvertiseSettings, BroadcastRequest, PacketCallback,
    RadioBridge, RadioFailure, RadioHandle, RadioResult, ResultCallback, ScanFailure, ScanRequest,
};
