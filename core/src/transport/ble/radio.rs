/// Platform advertise and scan primitives
///
/// Platform code (Kotlin/Swift) implements `RadioBridge` on top of the OS
/// advertiser and scanner. The core only ever talks to the radio through
/// this trait, and only from `BroadcastTransport`.

use super::frame::RadioPacket;
use super::layout::RadioLayout;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token for one radio registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RadioHandle(pub u64);

impl fmt::Display for RadioHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "radio#{}", self.0)
    }
}

/// Advertising power/latency trade-off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

impl AdvertiseMode {
    /// Platform constant for this mode
    pub fn as_code(&self) -> i32 {
        match self {
            AdvertiseMode::LowPower => 0,
            AdvertiseMode::Balanced => 1,
            AdvertiseMode::LowLatency => 2,
        }
    }
}

/// Advertiser settings handed to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    /// Broadcasts are connectionless
    pub connectable: bool,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            mode: AdvertiseMode::LowLatency,
            connectable: false,
        }
    }
}

/// One broadcast registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRequest {
    pub packet: RadioPacket,
    pub settings: AdvertiseSettings,
}

/// One scan registration
///
/// The platform extracts the field `layout` lives in and delivers it as
/// contiguous bytes (see `RadioPacket::to_bytes`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub layout: RadioLayout,
    /// Restrict to legacy (31-byte) advertisements
    pub legacy_only: bool,
}

/// Advertiser start failures, with the platform's result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertiseFailure {
    DataTooLarge,
    TooManyAdvertisers,
    AlreadyStarted,
    InternalError,
    FeatureUnsupported,
    Unknown(i32),
}

impl AdvertiseFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AdvertiseFailure::DataTooLarge,
            2 => AdvertiseFailure::TooManyAdvertisers,
            3 => AdvertiseFailure::AlreadyStarted,
            4 => AdvertiseFailure::InternalError,
            5 => AdvertiseFailure::FeatureUnsupported,
            other => AdvertiseFailure::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AdvertiseFailure::DataTooLarge => 1,
            AdvertiseFailure::TooManyAdvertisers => 2,
            AdvertiseFailure::AlreadyStarted => 3,
            AdvertiseFailure::InternalError => 4,
            AdvertiseFailure::FeatureUnsupported => 5,
            AdvertiseFailure::Unknown(code) => *code,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            AdvertiseFailure::DataTooLarge => "Size of advertisement data packet is too large.",
            AdvertiseFailure::TooManyAdvertisers => "Too many advertisers.",
            AdvertiseFailure::AlreadyStarted => "Device was already advertising.",
            AdvertiseFailure::InternalError => "Internal error.",
            AdvertiseFailure::FeatureUnsupported => "Feature unsupported.",
            AdvertiseFailure::Unknown(_) => "Unknown error.",
        }
    }
}

/// Scanner start failures, with the platform's result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanFailure {
    AlreadyStarted,
    ApplicationRegistrationFailed,
    InternalError,
    FeatureUnsupported,
    OutOfHardwareResources,
    ScanningTooFrequently,
    Unknown(i32),
}

impl ScanFailure {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => ScanFailure::AlreadyStarted,
            2 => ScanFailure::ApplicationRegistrationFailed,
            3 => ScanFailure::InternalError,
            4 => ScanFailure::FeatureUnsupported,
            5 => ScanFailure::OutOfHardwareResources,
            6 => ScanFailure::ScanningTooFrequently,
            other => ScanFailure::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ScanFailure::AlreadyStarted => 1,
            ScanFailure::ApplicationRegistrationFailed => 2,
            ScanFailure::InternalError => 3,
            ScanFailure::FeatureUnsupported => 4,
            ScanFailure::OutOfHardwareResources => 5,
            ScanFailure::ScanningTooFrequently => 6,
            ScanFailure::Unknown(code) => *code,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ScanFailure::AlreadyStarted => "Scan already started.",
            ScanFailure::ApplicationRegistrationFailed => "Application registration failed.",
            ScanFailure::InternalError => "Internal error",
            ScanFailure::FeatureUnsupported => "Feature unsupported",
            ScanFailure::OutOfHardwareResources => "Out of Hardware resources.",
            ScanFailure::ScanningTooFrequently => "Scanning too frequently.",
            ScanFailure::Unknown(_) => "Unknown Error.",
        }
    }
}

/// Asynchronous radio failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadioFailure {
    Advertise(AdvertiseFailure),
    Scan(ScanFailure),
}

impl RadioFailure {
    pub fn code(&self) -> i32 {
        match self {
            RadioFailure::Advertise(f) => f.code(),
            RadioFailure::Scan(f) => f.code(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            RadioFailure::Advertise(f) => f.reason(),
            RadioFailure::Scan(f) => f.reason(),
        }
    }
}

impl fmt::Display for RadioFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.reason(), self.code())
    }
}

impl std::error::Error for RadioFailure {}

/// Outcome the radio reports once it has acted on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioResult {
    Started,
    Failed(RadioFailure),
}

/// Called once per raw packet, on the radio's delivery thread
pub type PacketCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Called with the asynchronous start result
pub type ResultCallback = Box<dyn Fn(RadioResult) + Send + Sync>;

/// Platform advertise/scan primitives
///
/// Callbacks may fire on any thread, including synchronously from inside the
/// request call. Implementations must not block on them.
#[cfg_attr(test, mockall::automock)]
pub trait RadioBridge: Send + Sync {
    /// Begin advertising `request.packet` until cancelled
    fn request_broadcast(&self, request: BroadcastRequest, on_result: ResultCallback)
        -> RadioHandle;

    /// Stop the broadcast registered under `handle`
    fn cancel_broadcast(&self, handle: RadioHandle);

    /// Begin scanning; each matching advertisement goes to `on_packet`
    fn request_receive(
        &self,
        request: ScanRequest,
        on_packet: PacketCallback,
        on_result: ResultCallback,
    ) -> RadioHandle;

    /// Stop the scan registered under `handle`
    fn cancel_receive(&self, handle: RadioHandle);
}
