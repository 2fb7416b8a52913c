//! Registration, connection and MTU negotiation

use tracing::{debug, error, info, warn};

use crate::{
    client::engine::DiscoveryEngine,
    core::types::{
        AddressType, ConnId, Connection, GattStatus, PeerAddress, SlotState, TransportId,
    },
    stack::GattStack,
};

impl<S: GattStack> DiscoveryEngine<S> {
    /// Issue scan parameters once per cycle
    pub(super) fn configure_scanning(&mut self) {
        if self.scan_params_set {
            return;
        }
        match self.stack.set_scan_params(&self.config.scan_params) {
            Ok(()) => self.scan_params_set = true,
            Err(e) => error!("Setting scan parameters failed: {e}"),
        }
    }

    pub(super) fn on_registered(
        &mut self,
        index: usize,
        transport: TransportId,
        status: GattStatus,
    ) {
        let slot = &mut self.slots[index];
        if !status.is_ok() {
            error!(profile = slot.id, %status, "Registration failed");
            return;
        }
        info!(profile = slot.id, %transport, "Profile registered");

        slot.transport = Some(transport);
        slot.set_state(SlotState::Registered);
        self.routes.bind(transport, index);

        self.configure_scanning();
    }

    /// Open a link to `addr` from the profile designated for connecting
    pub(super) fn connect_target(&mut self, addr: PeerAddress, addr_type: AddressType) {
        let index = self.config.connect_profile;
        let Some(slot) = self.slots.get_mut(index) else {
            error!(profile = index, "Connect profile does not exist");
            return;
        };
        let Some(transport) = slot.transport else {
            warn!(profile = slot.id, "Connect profile not registered, not connecting");
            return;
        };
        if !slot.state.can_connect() {
            warn!(profile = slot.id, state = ?slot.state, "Profile busy, not connecting");
            return;
        }

        info!(%addr, "Connecting to target");
        match self.stack.open(transport, addr, addr_type, true) {
            Ok(()) => slot.set_state(SlotState::Connecting),
            Err(e) => error!(%addr, "Open failed: {e}"),
        }
    }

    pub(super) fn on_opened(
        &mut self,
        index: usize,
        status: GattStatus,
        conn_id: ConnId,
        addr: PeerAddress,
        mtu: u16,
    ) {
        let slot = &mut self.slots[index];
        if status.is_ok() {
            debug!(profile = slot.id, conn_id, %addr, mtu, "Open completed");
            return;
        }
        error!(profile = slot.id, %status, %addr, "Open failed");
        if slot.state == SlotState::Connecting {
            slot.set_state(SlotState::Disconnected);
        }
    }

    pub(super) fn on_connected(&mut self, index: usize, conn_id: ConnId, addr: PeerAddress) {
        let slot = &self.slots[index];
        if slot.state != SlotState::Connecting {
            warn!(profile = slot.id, state = ?slot.state, "Unexpected connect event, dropped");
            return;
        }
        info!(profile = slot.id, conn_id, %addr, "Connected");

        // profile sees the event before the slot records the link
        self.with_link(index, |cb, link| cb.on_connect(link, conn_id, addr));

        let slot = &mut self.slots[index];
        slot.connection = Some(Connection {
            conn_id,
            peer: addr,
        });
        slot.set_state(SlotState::AwaitingMtu);

        let Some(transport) = slot.transport else {
            return;
        };
        if let Err(e) = self.stack.request_mtu(transport, conn_id) {
            error!(conn_id, "MTU request failed: {e}");
        }
    }

    pub(super) fn on_mtu_configured(
        &mut self,
        index: usize,
        status: GattStatus,
        conn_id: ConnId,
        mtu: u16,
    ) {
        let slot = &mut self.slots[index];
        if slot.state != SlotState::AwaitingMtu || !slot.on_connection(conn_id) {
            warn!(profile = slot.id, state = ?slot.state, conn_id, "Unexpected MTU event, dropped");
            return;
        }
        if !status.is_ok() {
            error!(profile = slot.id, %status, "MTU exchange failed");
            return;
        }
        info!(profile = slot.id, mtu, "MTU configured");
        slot.set_state(SlotState::DiscoveringServices);
        self.share_link(index);
    }

    /// Put every other idle registered profile on the link `owner` brought up
    ///
    /// Each profile then takes part in the service search on that link.
    fn share_link(&mut self, owner: usize) {
        let Some(connection) = self.slots[owner].connection else {
            return;
        };
        let idle: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(i, s)| *i != owner && s.transport.is_some() && s.state.can_connect())
            .map(|(i, _)| i)
            .collect();

        for index in idle {
            self.with_link(index, |cb, link| {
                cb.on_connect(link, connection.conn_id, connection.peer)
            });
            let slot = &mut self.slots[index];
            debug!(profile = slot.id, conn_id = connection.conn_id, "Sharing link");
            slot.connection = Some(connection);
            slot.set_state(SlotState::DiscoveringServices);
        }
    }

    /// Virtual connection closed; the next cycle reconfigures scanning
    pub(super) fn on_closed(&mut self, index: usize, conn_id: ConnId, reason: u16) {
        debug!(profile = self.slots[index].id, conn_id, reason, "Connection closed");
        self.scan_params_set = false;
    }

    pub(super) fn on_disconnected(
        &mut self,
        index: usize,
        conn_id: ConnId,
        addr: PeerAddress,
        reason: u16,
    ) {
        info!(profile = self.slots[index].id, conn_id, %addr, reason, "Disconnected");

        // every profile sharing the link loses it
        let linked: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(i, s)| *i == index || s.on_connection(conn_id))
            .map(|(i, _)| i)
            .collect();

        // a cycle that already reconfigured scanning owns this disconnect
        if !self.scan_params_set {
            for &i in &linked {
                self.with_link(i, |cb, link| cb.on_disconnect(link, reason));
            }
            self.configure_scanning();
        }

        for i in linked {
            let slot = &mut self.slots[i];
            slot.clear_link();
            if slot.state != SlotState::Unregistered {
                slot.set_state(SlotState::Disconnected);
            }
        }
    }
}
