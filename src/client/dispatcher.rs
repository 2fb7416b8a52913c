//! Routing of stack events to profile slots

use std::collections::HashMap;

use tracing::{debug, error, info, trace, warn};

use crate::{
    client::{engine::DiscoveryEngine, scan_filter::ScanDecision},
    core::types::{HandleRange, ProfileId, TransportId},
    stack::{GapEvent, GattStack, GattcEvent, StackEvent},
};

/// Maps transport ids assigned at registration back to slot indices
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    by_transport: HashMap<TransportId, usize>,
    profile_count: usize,
}

impl RoutingTable {
    pub fn new(profile_count: usize) -> Self {
        Self {
            by_transport: HashMap::new(),
            profile_count,
        }
    }

    /// Record the transport id the stack assigned to slot `index`
    pub fn bind(&mut self, transport: TransportId, index: usize) {
        self.by_transport.retain(|_, i| *i != index);
        self.by_transport.insert(transport, index);
    }

    pub fn slot_for_transport(&self, transport: TransportId) -> Option<usize> {
        self.by_transport.get(&transport).copied()
    }

    pub fn slot_for_profile(&self, profile: ProfileId) -> Option<usize> {
        (profile < self.profile_count).then_some(profile)
    }
}

/// Destination of one client event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Slot(usize),
    Drop,
}

/// Resolve the slot a client event belongs to
///
/// Registration completions carry the profile id they were requested for;
/// everything else is keyed by the transport id the registration assigned.
pub fn route(transport: TransportId, event: &GattcEvent, table: &RoutingTable) -> Route {
    let slot = match event {
        GattcEvent::Registered { app_id, .. } => table.slot_for_profile(*app_id),
        _ => table.slot_for_transport(transport),
    };
    slot.map_or(Route::Drop, Route::Slot)
}

impl<S: GattStack> DiscoveryEngine<S> {
    /// Entry point for every event the stack delivers
    pub fn handle_event(&mut self, event: StackEvent) {
        match event {
            StackEvent::Gap(event) => self.on_gap_event(event),
            StackEvent::Gattc { transport, event } => {
                match route(transport, &event, &self.routes) {
                    Route::Slot(index) => self.on_gattc_event(index, transport, event),
                    Route::Drop => {
                        debug!(%transport, event = event.name(), "No profile for transport, dropped")
                    }
                }
            }
        }
    }

    fn on_gap_event(&mut self, event: GapEvent) {
        match event {
            GapEvent::ScanParamsSet { status } => {
                if !status.is_ok() {
                    error!(%status, "Scan parameters rejected");
                    return;
                }
                self.filter.rearm();
                let duration = self.config.scan_duration_secs;
                match self.stack.start_scanning(duration) {
                    Ok(()) => info!(duration, "Scanning"),
                    Err(e) => error!("Starting scan failed: {e}"),
                }
            }
            GapEvent::ScanResult {
                addr,
                addr_type,
                rssi,
                adv_data,
            } => {
                trace!(%addr, rssi, adv = %hex::encode(&adv_data), "Scan result");
                if self.filter.evaluate(&adv_data) == ScanDecision::Connect {
                    if let Err(e) = self.stack.stop_scanning() {
                        error!("Stopping scan failed: {e}");
                    }
                    self.connect_target(addr, addr_type);
                }
            }
            GapEvent::ScanComplete => info!("Scan window elapsed"),
            GapEvent::ScanStopped { status } => {
                if status.is_ok() {
                    info!("Scan stopped");
                } else {
                    error!(%status, "Stopping scan failed");
                }
            }
        }
    }

    fn on_gattc_event(&mut self, index: usize, transport: TransportId, event: GattcEvent) {
        match event {
            GattcEvent::Registered { status, .. } => self.on_registered(index, transport, status),
            GattcEvent::Opened {
                status,
                conn_id,
                addr,
                mtu,
            } => self.on_opened(index, status, conn_id, addr, mtu),
            GattcEvent::Connected { conn_id, addr } => self.on_connected(index, conn_id, addr),
            GattcEvent::MtuConfigured {
                status,
                conn_id,
                mtu,
            } => self.on_mtu_configured(index, status, conn_id, mtu),
            GattcEvent::ServicesDiscovered { status, conn_id } => {
                self.on_services_discovered(index, status, conn_id)
            }
            GattcEvent::SearchResult {
                conn_id,
                uuid,
                start_handle,
                end_handle,
                inst_id,
                ..
            } => self.on_search_result(
                conn_id,
                uuid,
                HandleRange::new(start_handle, end_handle),
                inst_id,
            ),
            GattcEvent::SearchComplete { status, conn_id } => {
                self.on_search_complete(status, conn_id)
            }
            GattcEvent::Closed { conn_id, reason } => self.on_closed(index, conn_id, reason),
            GattcEvent::Disconnected {
                conn_id,
                addr,
                reason,
            } => self.on_disconnected(index, conn_id, addr, reason),
            GattcEvent::ReadChar {
                status,
                conn_id,
                handle,
                value,
            } => {
                if status.is_ok() {
                    debug!(conn_id, handle, value = %hex::encode(&value), "Read");
                } else {
                    warn!(conn_id, handle, %status, "Read failed");
                }
                self.with_link(index, |cb, link| cb.on_read(link, handle, status, &value));
            }
            GattcEvent::WriteChar {
                status,
                conn_id,
                handle,
            } => {
                if !status.is_ok() {
                    warn!(conn_id, handle, %status, "Write failed");
                }
                self.with_link(index, |cb, link| cb.on_write(link, handle, status));
            }
            GattcEvent::Notify {
                conn_id,
                handle,
                value,
                is_notify,
            } => {
                debug!(conn_id, handle, is_notify, value = %hex::encode(&value), "Notification");
                self.with_link(index, |cb, link| cb.on_notify(link, handle, &value));
            }
            GattcEvent::RegisteredForNotify { status, handle } => {
                if status.is_ok() {
                    info!(handle, "Registered for notifications");
                } else {
                    error!(handle, %status, "Notification registration failed");
                }
            }
        }
    }
}
