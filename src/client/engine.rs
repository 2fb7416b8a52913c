//! GATT client engine owning the profile table and the stack

use tracing::{error, info, warn};

use crate::{
    client::{
        dispatcher::RoutingTable,
        profile::{ProfileCallback, ProfileDbSnapshot, ProfileLink, ProfileSlot},
        scan_filter::ScanFilter,
    },
    core::{
        error::{ClientError, ClientResult},
        types::{ProfileId, ScanParams},
    },
    stack::GattStack,
};

/// Scan window length used when none is configured
pub const DEFAULT_SCAN_DURATION_SECS: u32 = 15;

/// Preferred MTU announced before any exchange
pub const DEFAULT_LOCAL_MTU: u16 = 500;

/// Tunables of the central role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub scan_params: ScanParams,
    pub scan_duration_secs: u32,
    pub local_mtu: u16,
    /// Profile that opens the link when the target is found
    pub connect_profile: ProfileId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_params: ScanParams::default(),
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            local_mtu: DEFAULT_LOCAL_MTU,
            connect_profile: 0,
        }
    }
}

/// Central-role engine
///
/// Drives every profile slot from registration through scanning, connection,
/// MTU exchange and discovery. All state lives here and is only touched from
/// [`handle_event`](Self::handle_event) and the façade calls, which the
/// runner serializes on one task.
pub struct DiscoveryEngine<S: GattStack> {
    pub(super) stack: S,
    pub(super) slots: Vec<ProfileSlot>,
    pub(super) routes: RoutingTable,
    pub(super) filter: ScanFilter,
    pub(super) config: EngineConfig,
    /// Set once scan parameters were issued for the current cycle
    pub(super) scan_params_set: bool,
    started: bool,
}

impl<S: GattStack> DiscoveryEngine<S> {
    /// Create an engine over `slots`; slot `i` must carry profile id `i`
    pub fn new(stack: S, slots: Vec<ProfileSlot>, config: EngineConfig) -> Self {
        let routes = RoutingTable::new(slots.len());
        Self {
            stack,
            slots,
            routes,
            filter: ScanFilter::new(),
            config,
            scan_params_set: false,
            started: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn slots(&self) -> &[ProfileSlot] {
        &self.slots
    }

    pub fn slot(&self, profile: ProfileId) -> Option<&ProfileSlot> {
        self.slots.get(profile)
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Name of the peripheral to connect to
    pub fn set_target_name(&mut self, name: &str) -> ClientResult<()> {
        self.filter.set_target(name)
    }

    /// Bring up the stack and register every profile
    ///
    /// Registration completes asynchronously; the first completion configures
    /// scanning. Individual registration failures are logged and leave that
    /// slot unregistered.
    pub fn start(&mut self) -> ClientResult<()> {
        if self.started {
            return Err(ClientError::AlreadyStarted);
        }
        if self.filter.target().is_none() {
            warn!("Starting without a target name; no device will match");
        }

        self.stack.enable()?;
        self.started = true;

        for slot in &self.slots {
            if let Err(e) = self.stack.register_app(slot.id) {
                error!(profile = slot.id, "Registration failed: {e}");
            }
        }

        if let Err(e) = self.stack.set_local_mtu(self.config.local_mtu) {
            error!(mtu = self.config.local_mtu, "Setting local MTU failed: {e}");
        }

        info!(profiles = self.slots.len(), "GATT client started");
        Ok(())
    }

    /// Serializable copy of the profile table
    pub fn snapshot(&self) -> ProfileDbSnapshot {
        ProfileDbSnapshot {
            profiles: self.slots.iter().map(ProfileSlot::snapshot).collect(),
        }
    }

    /// Run `f` with the callback and link view of slot `index`
    ///
    /// Returns `None` when the slot has no transport yet.
    pub(super) fn with_link<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut dyn ProfileCallback, &mut ProfileLink<'_>) -> R,
    ) -> Option<R> {
        let slot = self.slots.get_mut(index)?;
        let transport = slot.transport?;
        let mut link = ProfileLink {
            profile: slot.id,
            transport,
            connection: slot.connection,
            characteristics: &slot.characteristics,
            stack: &mut self.stack,
        };
        Some(f(&mut *slot.callback, &mut link))
    }
}
