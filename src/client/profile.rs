//! Profile slots and the callback interface profiles implement

use serde::Serialize;
use tracing::debug;

use crate::{
    core::{
        error::{StackError, StackResult},
        types::{
            BtUuid, CharacteristicRecord, ConnId, Connection, GattStatus, Handle, HandleRange,
            PeerAddress, ProfileId, ServiceTarget, SlotState, TransportId, WriteType,
        },
    },
    stack::GattStack,
};

/// Handler for the events routed to one profile
///
/// Every method is required so each profile states explicitly what it does
/// with each event kind.
pub trait ProfileCallback: Send {
    /// Link established; runs before the slot records the connection
    fn on_connect(&mut self, link: &mut ProfileLink<'_>, conn_id: ConnId, peer: PeerAddress);

    /// Link lost
    fn on_disconnect(&mut self, link: &mut ProfileLink<'_>, reason: u16);

    /// Discovery finished and the characteristic table is complete
    fn on_search_complete(&mut self, link: &mut ProfileLink<'_>);

    /// Result of a read issued through the façade or the link
    fn on_read(&mut self, link: &mut ProfileLink<'_>, handle: Handle, status: GattStatus, value: &[u8]);

    /// Result of a write
    fn on_write(&mut self, link: &mut ProfileLink<'_>, handle: Handle, status: GattStatus);

    /// Notification or indication from the peer
    fn on_notify(&mut self, link: &mut ProfileLink<'_>, handle: Handle, value: &[u8]);
}

/// View of a slot plus access to the stack, handed to callbacks
pub struct ProfileLink<'a> {
    pub(crate) profile: ProfileId,
    pub(crate) transport: TransportId,
    pub(crate) connection: Option<Connection>,
    pub(crate) characteristics: &'a [CharacteristicRecord],
    pub(crate) stack: &'a mut dyn GattStack,
}

impl ProfileLink<'_> {
    pub fn profile(&self) -> ProfileId {
        self.profile
    }

    pub fn transport(&self) -> TransportId {
        self.transport
    }

    pub fn connection(&self) -> Option<Connection> {
        self.connection
    }

    pub fn characteristics(&self) -> &[CharacteristicRecord] {
        self.characteristics
    }

    /// Characteristic whose value handle is `handle`
    pub fn characteristic(&self, handle: Handle) -> Option<&CharacteristicRecord> {
        self.characteristics.iter().find(|c| c.handle == handle)
    }

    fn conn(&self) -> StackResult<Connection> {
        self.connection.ok_or(StackError::Rejected {
            op: "profile_link",
            status: GattStatus::ERROR,
        })
    }

    /// Subscribe to notifications of `handle`
    pub fn register_for_notify(&mut self, handle: Handle) -> StackResult<()> {
        let conn = self.conn()?;
        self.stack
            .register_for_notify(self.transport, conn.peer, handle)
    }

    pub fn read(&mut self, handle: Handle) -> StackResult<()> {
        let conn = self.conn()?;
        self.stack.read_char(self.transport, conn.conn_id, handle)
    }

    pub fn write(&mut self, handle: Handle, value: &[u8], write_type: WriteType) -> StackResult<()> {
        let conn = self.conn()?;
        self.stack
            .write_char(self.transport, conn.conn_id, handle, value, write_type)
    }
}

/// One registered logical profile and everything discovered for it
pub struct ProfileSlot {
    pub(crate) id: ProfileId,
    pub(crate) transport: Option<TransportId>,
    pub(crate) state: SlotState,
    pub(crate) connection: Option<Connection>,
    pub(crate) service: ServiceTarget,
    pub(crate) range: Option<HandleRange>,
    pub(crate) characteristics: Vec<CharacteristicRecord>,
    pub(crate) callback: Box<dyn ProfileCallback>,
}

impl ProfileSlot {
    /// Create an unregistered slot targeting `uuid`
    pub fn new(
        id: ProfileId,
        uuid: BtUuid,
        primary: bool,
        callback: Box<dyn ProfileCallback>,
    ) -> Self {
        Self {
            id,
            transport: None,
            state: SlotState::Unregistered,
            connection: None,
            service: ServiceTarget {
                uuid,
                primary,
                inst_id: 0,
            },
            range: None,
            characteristics: Vec::new(),
            callback,
        }
    }

    pub fn id(&self) -> ProfileId {
        self.id
    }

    pub fn transport(&self) -> Option<TransportId> {
        self.transport
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn connection(&self) -> Option<Connection> {
        self.connection
    }

    pub fn service(&self) -> &ServiceTarget {
        &self.service
    }

    pub fn range(&self) -> Option<HandleRange> {
        self.range
    }

    pub fn characteristics(&self) -> &[CharacteristicRecord] {
        &self.characteristics
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        if self.state != state {
            debug!(profile = self.id, from = ?self.state, to = ?state, "Slot state change");
            self.state = state;
        }
    }

    /// Whether this slot is linked on connection `conn_id`
    pub(crate) fn on_connection(&self, conn_id: ConnId) -> bool {
        self.connection.is_some_and(|c| c.conn_id == conn_id)
    }

    /// Drop connection state and discovered topology
    pub(crate) fn clear_link(&mut self) {
        self.connection = None;
        self.range = None;
        self.characteristics.clear();
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            id: self.id,
            transport: self.transport,
            state: self.state,
            connection: self.connection,
            service: self.service,
            range: self.range,
            characteristics: self.characteristics.clone(),
        }
    }
}

impl std::fmt::Debug for ProfileSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileSlot")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("connection", &self.connection)
            .field("service", &self.service)
            .field("range", &self.range)
            .field("characteristics", &self.characteristics.len())
            .finish_non_exhaustive()
    }
}

/// Serializable view of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSnapshot {
    pub id: ProfileId,
    pub transport: Option<TransportId>,
    pub state: SlotState,
    pub connection: Option<Connection>,
    pub service: ServiceTarget,
    pub range: Option<HandleRange>,
    pub characteristics: Vec<CharacteristicRecord>,
}

/// Serializable view of the whole profile table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileDbSnapshot {
    pub profiles: Vec<ProfileSnapshot>,
}
