/// Broadcast transport: permission-gated transmit and receive lifecycle
///
/// Two independent roles, each `Idle` or `Active(handle)`. A role becomes
/// active only after its capability grants are present and the radio has
/// handed back a handle; a failed start registers nothing. Each role's lock
/// is held across the radio call, so concurrent starts and stops on the same
/// role serialize and a handle is never replaced.
///
/// Receive path: the radio's delivery thread decodes inline, then spawns the
/// application consumer on the runtime captured when receiving began. The
/// delivery thread never waits on the consumer, so delivered payloads are
/// unordered.

use super::config::TransportConfig;
use super::frame::{self, FramingError};
use super::header::MeshHeader;
use super::layout::RadioLayout;
use super::permissions::{
    Capability, PermissionGate, RECEIVE_START_CAPABILITIES, RECEIVE_STOP_CAPABILITIES,
    TRANSMIT_START_CAPABILITIES, TRANSMIT_STOP_CAPABILITIES,
};
use super::radio::{
    BroadcastRequest, PacketCallback, RadioBridge, RadioFailure, RadioHandle, RadioResult,
    ResultCallback, ScanRequest,
};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

// ============================================================================
// ERROR TYPES
// ============================================================================

fn join_capabilities(caps: &BTreeSet<Capability>) -> String {
    caps.iter()
        .map(|cap| cap.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced by the lifecycle operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Access denied, missing: {}", join_capabilities(.missing))]
    AccessDenied { missing: BTreeSet<Capability> },

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("{0} role already active")]
    AlreadyActive(TransportRole),

    #[error("Timed out waiting for: {}", join_capabilities(.missing))]
    GrantTimeout { missing: BTreeSet<Capability> },

    #[error("Receiving requires a tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    RadioFailure(#[from] RadioFailure),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// STATE
// ============================================================================

/// Transport direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportRole {
    Transmitting,
    Receiving,
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportRole::Transmitting => write!(f, "Transmitting"),
            TransportRole::Receiving => write!(f, "Receiving"),
        }
    }
}

/// Lifecycle state of one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleState {
    Idle,
    Active(RadioHandle),
}

impl RoleState {
    pub fn is_active(&self) -> bool {
        matches!(self, RoleState::Active(_))
    }

    pub fn handle(&self) -> Option<RadioHandle> {
        match self {
            RoleState::Idle => None,
            RoleState::Active(handle) => Some(*handle),
        }
    }
}

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Radio accepted or refused a broadcast
    Broadcast(RadioResult),
    /// Radio accepted or refused a scan
    Receive(RadioResult),
    /// A received packet failed to decode
    PacketDropped(FramingError),
    /// A role changed state
    RoleChanged { role: TransportRole, state: RoleState },
}

impl TransportEvent {
    /// Radio failure carried by a result event, if any
    pub fn failure(&self) -> Option<RadioFailure> {
        match self {
            TransportEvent::Broadcast(RadioResult::Failed(f))
            | TransportEvent::Receive(RadioResult::Failed(f)) => Some(*f),
            _ => None,
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    pub packets_received: u64,
    pub packets_delivered: u64,
    pub packets_dropped: u64,
    pub broadcasts_started: u64,
    pub broadcasts_failed: u64,
    pub scans_failed: u64,
}

#[derive(Default)]
struct Counters {
    packets_received: AtomicU64,
    packets_delivered: AtomicU64,
    packets_dropped: AtomicU64,
    broadcasts_started: AtomicU64,
    broadcasts_failed: AtomicU64,
    scans_failed: AtomicU64,
}

type PayloadConsumer = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// State reachable from radio callbacks
struct Shared {
    layout: RadioLayout,
    events: broadcast::Sender<TransportEvent>,
    counters: Counters,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn on_broadcast_result(&self, result: RadioResult) {
        match result {
            RadioResult::Started => {
                self.counters.broadcasts_started.fetch_add(1, Ordering::Relaxed);
                debug!("Started advertising");
            }
            RadioResult::Failed(failure) => {
                self.counters.broadcasts_failed.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to start advertising: {}", failure);
            }
        }
        self.emit(TransportEvent::Broadcast(result));
    }

    fn on_receive_result(&self, result: RadioResult) {
        match result {
            RadioResult::Started => debug!("Scanning for advertisements"),
            RadioResult::Failed(failure) => {
                self.counters.scans_failed.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to scan for advertisements: {}", failure);
            }
        }
        self.emit(TransportEvent::Receive(result));
    }

    fn on_packet(&self, bytes: Vec<u8>, consumer: &PayloadConsumer, runtime: &Handle) {
        self.counters.packets_received.fetch_add(1, Ordering::Relaxed);

        match frame::decode(&bytes, &self.layout) {
            Ok(payload) => {
                if let Some(header) = MeshHeader::peek(&payload) {
                    debug!("Parsed packet: {}", header);
                }
                self.counters.packets_delivered.fetch_add(1, Ordering::Relaxed);
                runtime.spawn(consumer(payload));
            }
            Err(e) => {
                // Foreign advertisements share the spectrum; expected noise
                self.counters.packets_dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Dropping {} byte packet: {}", bytes.len(), e);
                self.emit(TransportEvent::PacketDropped(e));
            }
        }
    }

    fn snapshot(&self) -> TransportStats {
        TransportStats {
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            packets_delivered: self.counters.packets_delivered.load(Ordering::Relaxed),
            packets_dropped: self.counters.packets_dropped.load(Ordering::Relaxed),
            broadcasts_started: self.counters.broadcasts_started.load(Ordering::Relaxed),
            broadcasts_failed: self.counters.broadcasts_failed.load(Ordering::Relaxed),
            scans_failed: self.counters.scans_failed.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

/// Connectionless BLE transport over one radio and one permission gate
pub struct BroadcastTransport {
    config: TransportConfig,
    radio: Arc<dyn RadioBridge>,
    permissions: Arc<PermissionGate>,
    transmit: Mutex<RoleState>,
    receive: Mutex<RoleState>,
    shared: Arc<Shared>,
}

impl BroadcastTransport {
    pub fn new(
        config: TransportConfig,
        radio: Arc<dyn RadioBridge>,
        permissions: Arc<PermissionGate>,
    ) -> Result<Self, TransportError> {
        config
            .validate()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let shared = Arc::new(Shared {
            layout: config.layout,
            events,
            counters: Counters::default(),
        });

        Ok(Self {
            config,
            radio,
            permissions,
            transmit: Mutex::new(RoleState::Idle),
            receive: Mutex::new(RoleState::Idle),
            shared,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn layout(&self) -> RadioLayout {
        self.config.layout
    }

    /// Gate the host signals grant changes through
    pub fn permissions(&self) -> &Arc<PermissionGate> {
        &self.permissions
    }

    pub fn role_state(&self, role: TransportRole) -> RoleState {
        match role {
            TransportRole::Transmitting => *self.transmit.lock(),
            TransportRole::Receiving => *self.receive.lock(),
        }
    }

    pub fn stats(&self) -> TransportStats {
        self.shared.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }

    /// Start broadcasting `payload`
    ///
    /// Fails without touching the radio when already transmitting, when a
    /// grant is missing, or when the payload does not fit the layout.
    pub fn begin_transmitting(&self, payload: &[u8]) -> Result<RadioHandle, TransportError> {
        let mut state = self.transmit.lock();
        if state.is_active() {
            warn!("Already transmitting, refusing to register a second broadcast");
            return Err(TransportError::AlreadyActive(TransportRole::Transmitting));
        }

        self.permissions
            .check(TRANSMIT_START_CAPABILITIES)
            .map_err(|missing| {
                debug!("Permissions needed to begin sending");
                TransportError::AccessDenied { missing }
            })?;

        let packet = frame::encode(payload, &self.config.layout)?;
        debug!("Attempting to send {} bytes", packet.len());

        let shared = Arc::clone(&self.shared);
        let on_result: ResultCallback = Box::new(move |result| shared.on_broadcast_result(result));
        let handle = self.radio.request_broadcast(
            BroadcastRequest {
                packet,
                settings: self.config.advertise,
            },
            on_result,
        );

        *state = RoleState::Active(handle);
        info!("Transmitting on {} ({})", handle, self.config.layout);
        self.shared.emit(TransportEvent::RoleChanged {
            role: TransportRole::Transmitting,
            state: *state,
        });
        Ok(handle)
    }

    /// Stop broadcasting; a no-op when idle
    pub fn stop_transmitting(&self) -> Result<(), TransportError> {
        let mut state = self.transmit.lock();
        let handle = match *state {
            RoleState::Idle => return Ok(()),
            RoleState::Active(handle) => handle,
        };

        self.permissions
            .check(TRANSMIT_STOP_CAPABILITIES)
            .map_err(|missing| TransportError::AccessDenied { missing })?;

        self.radio.cancel_broadcast(handle);
        *state = RoleState::Idle;
        debug!("Stopped sending message");
        self.shared.emit(TransportEvent::RoleChanged {
            role: TransportRole::Transmitting,
            state: RoleState::Idle,
        });
        Ok(())
    }

    /// Start scanning; every valid payload is handed to `on_payload` on its
    /// own task. Must be called from within a tokio runtime.
    pub fn begin_receiving<F, Fut>(&self, on_payload: F) -> Result<RadioHandle, TransportError>
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.receive.lock();
        if state.is_active() {
            warn!("Already receiving, refusing to register a second scan");
            return Err(TransportError::AlreadyActive(TransportRole::Receiving));
        }

        self.permissions
            .check(RECEIVE_START_CAPABILITIES)
            .map_err(|missing| {
                debug!("Permissions needed to begin receiving");
                TransportError::AccessDenied { missing }
            })?;

        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let consumer: PayloadConsumer = Arc::new(move |payload| on_payload(payload).boxed());

        let shared = Arc::clone(&self.shared);
        let on_packet: PacketCallback =
            Box::new(move |bytes| shared.on_packet(bytes, &consumer, &runtime));
        let shared = Arc::clone(&self.shared);
        let on_result: ResultCallback = Box::new(move |result| shared.on_receive_result(result));

        let handle = self.radio.request_receive(
            ScanRequest {
                layout: self.config.layout,
                legacy_only: self.config.scan_legacy_only,
            },
            on_packet,
            on_result,
        );

        *state = RoleState::Active(handle);
        info!("Receiving on {} ({})", handle, self.config.layout);
        self.shared.emit(TransportEvent::RoleChanged {
            role: TransportRole::Receiving,
            state: *state,
        });
        Ok(handle)
    }

    /// Stop scanning; a no-op when idle
    pub fn stop_receiving(&self) -> Result<(), TransportError> {
        let mut state = self.receive.lock();
        let handle = match *state {
            RoleState::Idle => return Ok(()),
            RoleState::Active(handle) => handle,
        };

        self.permissions
            .check(RECEIVE_STOP_CAPABILITIES)
            .map_err(|missing| TransportError::AccessDenied { missing })?;

        self.radio.cancel_receive(handle);
        *state = RoleState::Idle;
        debug!("Stopped receiving packets");
        self.shared.emit(TransportEvent::RoleChanged {
            role: TransportRole::Receiving,
            state: RoleState::Idle,
        });
        Ok(())
    }

    /// Like `begin_transmitting`, but waits up to the configured timeout for
    /// missing grants instead of failing immediately
    pub async fn begin_transmitting_when_granted(
        &self,
        payload: &[u8],
    ) -> Result<RadioHandle, TransportError> {
        if self.role_state(TransportRole::Transmitting).is_active() {
            return Err(TransportError::AlreadyActive(TransportRole::Transmitting));
        }
        frame::encode(payload, &self.config.layout)?;

        self.permissions
            .wait_for(TRANSMIT_START_CAPABILITIES, self.config.grant_wait_timeout())
            .await
            .map_err(|missing| TransportError::GrantTimeout { missing })?;

        self.begin_transmitting(payload)
    }

    /// Like `begin_receiving`, but waits for missing grants first
    pub async fn begin_receiving_when_granted<F, Fut>(
        &self,
        on_payload: F,
    ) -> Result<RadioHandle, TransportError>
    where
        F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.role_state(TransportRole::Receiving).is_active() {
            return Err(TransportError::AlreadyActive(TransportRole::Receiving));
        }

        self.permissions
            .wait_for(RECEIVE_START_CAPABILITIES, self.config.grant_wait_timeout())
            .await
            .map_err(|missing| TransportError::GrantTimeout { missing })?;

        self.begin_receiving(on_payload)
    }
}

impl Drop for BroadcastTransport {
    fn drop(&mut self) {
        if let Err(e) = self.stop_transmitting() {
            warn!("Broadcast left registered on drop: {}", e);
        }
        if let Err(e) = self.stop_receiving() {
            warn!("Scan left registered on drop: {}", e);
        }
    }
}
