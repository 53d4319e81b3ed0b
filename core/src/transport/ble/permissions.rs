/// Capability grants gating radio operations
///
/// Grant state belongs to the host platform. The core reads it through
/// `PermissionProvider` and never changes it; it can only ask the host to
/// prompt the user and then observe the outcome later.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Named OS access right
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Advertise,
    Connect,
    Scan,
    Location,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Advertise => "advertise",
            Capability::Connect => "connect",
            Capability::Scan => "scan",
            Capability::Location => "location",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Grants needed to start broadcasting
pub const TRANSMIT_START_CAPABILITIES: &[Capability] =
    &[Capability::Advertise, Capability::Connect];

/// Grants needed to stop broadcasting
pub const TRANSMIT_STOP_CAPABILITIES: &[Capability] = &[Capability::Advertise];

/// Grants needed to start scanning
pub const RECEIVE_START_CAPABILITIES: &[Capability] = &[Capability::Scan, Capability::Location];

/// Grants needed to stop scanning
pub const RECEIVE_STOP_CAPABILITIES: &[Capability] = &[Capability::Scan];

/// Host permission flow
pub trait PermissionProvider: Send + Sync {
    /// Current grant state
    fn has_capability(&self, capability: Capability) -> bool;

    /// Ask the host to prompt for `capabilities`; the outcome shows up later
    /// through `has_capability`
    fn request_capabilities(&self, capabilities: &BTreeSet<Capability>);
}

/// Read-only view over the provider plus a change signal for waiters
pub struct PermissionGate {
    provider: Arc<dyn PermissionProvider>,
    changes: watch::Sender<u64>,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        let (changes, _) = watch::channel(0);
        Self { provider, changes }
    }

    /// Subset of `required` that is not granted
    pub fn missing(&self, required: &[Capability]) -> BTreeSet<Capability> {
        required
            .iter()
            .copied()
            .filter(|cap| !self.provider.has_capability(*cap))
            .collect()
    }

    /// Fail-fast check; asks the host for anything missing
    pub fn check(&self, required: &[Capability]) -> Result<(), BTreeSet<Capability>> {
        let missing = self.missing(required);
        if missing.is_empty() {
            return Ok(());
        }
        for cap in &missing {
            warn!("Permission {} not granted", cap);
        }
        self.provider.request_capabilities(&missing);
        Err(missing)
    }

    /// Called by the host whenever a grant result arrives
    pub fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Request what is missing, then wait until all of `required` is granted
    /// or `timeout` elapses. Returns what is still missing on timeout.
    pub async fn wait_for(
        &self,
        required: &[Capability],
        timeout: Duration,
    ) -> Result<(), BTreeSet<Capability>> {
        let mut rx = self.changes.subscribe();
        if self.check(required).is_ok() {
            return Ok(());
        }
        debug!("Waiting for permissions: {:?}", required);

        let wait = async {
            loop {
                if rx.changed().await.is_err() {
                    return;
                }
                if self.missing(required).is_empty() {
                    return;
                }
            }
        };

        let _ = tokio::time::timeout(timeout, wait).await;
        let missing = self.missing(required);
        if missing.is_empty() {
            debug!("All permissions were granted");
            Ok(())
        } else {
            Err(missing)
        }
    }
}
