//! In-process loopback radio
//!
//! A shared "air" for any number of transports in one process. Broadcasts
//! stay registered until cancelled; `tick()` plays one advertising interval,
//! delivering every active broadcast to every active scan that listens on the
//! same advertisement field. Used for integration tests and the CLI
//! simulation, never for real hardware.

use super::frame::RadioPacket;
use super::layout::RadioLayout;
use super::permissions::{Capability, PermissionProvider};
use super::radio::{
    AdvertiseFailure, BroadcastRequest, PacketCallback, RadioBridge, RadioFailure, RadioHandle,
    RadioResult, ResultCallback, ScanFailure, ScanRequest,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

type SharedPacketCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

struct Scan {
    request: ScanRequest,
    on_packet: SharedPacketCallback,
}

/// How many times each primitive was called
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioCallCounts {
    pub broadcast_requests: u64,
    pub broadcast_cancels: u64,
    pub receive_requests: u64,
    pub receive_cancels: u64,
}

/// Simulated radio medium
#[derive(Default)]
pub struct LoopbackRadio {
    next_handle: AtomicU64,
    broadcasts: Mutex<HashMap<RadioHandle, BroadcastRequest>>,
    scans: Mutex<HashMap<RadioHandle, Scan>>,
    counts: Mutex<RadioCallCounts>,
    next_advertise_failure: Mutex<Option<AdvertiseFailure>>,
    next_scan_failure: Mutex<Option<ScanFailure>>,
}

impl LoopbackRadio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Report `failure` for the next broadcast request
    pub fn fail_next_broadcast(&self, failure: AdvertiseFailure) {
        *self.next_advertise_failure.lock() = Some(failure);
    }

    /// Report `failure` for the next scan request
    pub fn fail_next_scan(&self, failure: ScanFailure) {
        *self.next_scan_failure.lock() = Some(failure);
    }

    pub fn call_counts(&self) -> RadioCallCounts {
        *self.counts.lock()
    }

    pub fn active_broadcasts(&self) -> usize {
        self.broadcasts.lock().len()
    }

    pub fn active_scans(&self) -> usize {
        self.scans.lock().len()
    }

    /// Packet currently advertised under `handle`
    pub fn broadcast_packet(&self, handle: RadioHandle) -> Option<RadioPacket> {
        self.broadcasts.lock().get(&handle).map(|b| b.packet.clone())
    }

    /// Deliver every active broadcast to every matching scan once.
    /// Returns the number of packets delivered.
    pub fn tick(&self) -> usize {
        let packets: Vec<RadioPacket> = self
            .broadcasts
            .lock()
            .values()
            .map(|b| b.packet.clone())
            .collect();

        packets.iter().map(|packet| self.deliver(packet)).sum()
    }

    /// Put a raw advertisement on air, as a foreign device would
    pub fn inject(&self, bytes: &[u8]) -> usize {
        let targets = self.scan_targets(|_| true);
        for on_packet in &targets {
            on_packet(bytes.to_vec());
        }
        targets.len()
    }

    fn deliver(&self, packet: &RadioPacket) -> usize {
        let targets = self.scan_targets(|layout| carries(packet, layout));
        let bytes = packet.to_bytes();
        trace!("Loopback delivering {} bytes to {} scans", bytes.len(), targets.len());
        for on_packet in &targets {
            on_packet(bytes.clone());
        }
        targets.len()
    }

    // Callbacks run outside the lock so they may call back into the radio
    fn scan_targets(&self, filter: impl Fn(&RadioLayout) -> bool) -> Vec<SharedPacketCallback> {
        self.scans
            .lock()
            .values()
            .filter(|scan| filter(&scan.request.layout))
            .map(|scan| Arc::clone(&scan.on_packet))
            .collect()
    }

    fn allocate(&self) -> RadioHandle {
        RadioHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Whether a scan for `layout` sees `packet` (same advertisement field)
fn carries(packet: &RadioPacket, layout: &RadioLayout) -> bool {
    matches!(
        (packet, layout),
        (RadioPacket::ServiceData { .. }, RadioLayout::UuidServiceData)
            | (RadioPacket::ManufacturerData { .. }, RadioLayout::ManufacturerData { .. })
            | (RadioPacket::Frame(_), RadioLayout::LengthPrefixed)
    )
}

impl RadioBridge for LoopbackRadio {
    fn request_broadcast(
        &self,
        request: BroadcastRequest,
        on_result: ResultCallback,
    ) -> RadioHandle {
        self.counts.lock().broadcast_requests += 1;
        let handle = self.allocate();

        match self.next_advertise_failure.lock().take() {
            Some(failure) => on_result(RadioResult::Failed(RadioFailure::Advertise(failure))),
            None => {
                self.broadcasts.lock().insert(handle, request);
                on_result(RadioResult::Started);
            }
        }
        handle
    }

    fn cancel_broadcast(&self, handle: RadioHandle) {
        self.counts.lock().broadcast_cancels += 1;
        self.broadcasts.lock().remove(&handle);
    }

    fn request_receive(
        &self,
        request: ScanRequest,
        on_packet: PacketCallback,
        on_result: ResultCallback,
    ) -> RadioHandle {
        self.counts.lock().receive_requests += 1;
        let handle = self.allocate();

        match self.next_scan_failure.lock().take() {
            Some(failure) => on_result(RadioResult::Failed(RadioFailure::Scan(failure))),
            None => {
                self.scans.lock().insert(
                    handle,
                    Scan {
                        request,
                        on_packet: Arc::from(on_packet),
                    },
                );
                on_result(RadioResult::Started);
            }
        }
        handle
    }

    fn cancel_receive(&self, handle: RadioHandle) {
        self.counts.lock().receive_cancels += 1;
        self.scans.lock().remove(&handle);
    }
}

/// Permission provider with grants set directly
#[derive(Default)]
pub struct StaticPermissions {
    granted: RwLock<BTreeSet<Capability>>,
    requests: Mutex<Vec<BTreeSet<Capability>>>,
}

impl StaticPermissions {
    /// Nothing granted
    pub fn none() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every capability granted
    pub fn all() -> Arc<Self> {
        Self::with(&[
            Capability::Advertise,
            Capability::Connect,
            Capability::Scan,
            Capability::Location,
        ])
    }

    pub fn with(capabilities: &[Capability]) -> Arc<Self> {
        let provider = Self::default();
        provider.granted.write().extend(capabilities.iter().copied());
        Arc::new(provider)
    }

    pub fn grant(&self, capability: Capability) {
        self.granted.write().insert(capability);
    }

    pub fn revoke(&self, capability: Capability) {
        self.granted.write().remove(&capability);
    }

    /// Every prompt the core asked the host for, oldest first
    pub fn requests(&self) -> Vec<BTreeSet<Capability>> {
        self.requests.lock().clone()
    }
}

impl PermissionProvider for StaticPermissions {
    fn has_capability(&self, capability: Capability) -> bool {
        self.granted.read().contains(&capability)
    }

    fn request_capabilities(&self, capabilities: &BTreeSet<Capability>) {
        self.requests.lock().push(capabilities.clone());
    }
}
