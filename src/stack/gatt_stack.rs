//! Bluetooth stack trait definition

use crate::core::error::StackResult;
use crate::core::types::{
    AddressType, BtUuid, CharProperties, ConnId, Handle, HandleRange, PeerAddress, ProfileId,
    ScanParams, TransportId, WriteType,
};

/// Characteristic element as returned from the stack's attribute cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharElement {
    pub handle: Handle,
    pub properties: CharProperties,
    pub uuid: BtUuid,
}

/// Descriptor element as returned from the stack's attribute cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescrElement {
    pub handle: Handle,
    pub uuid: BtUuid,
}

/// Attribute kinds the cache can count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrQuery {
    /// Characteristics within a service range
    Characteristics(HandleRange),
    /// Descriptors of `char_handle` within a sub-range
    Descriptors {
        range: HandleRange,
        char_handle: Handle,
    },
}

/// Abstraction over the host Bluetooth stack in the central role
///
/// Requests never block: they either fail immediately with a status or are
/// accepted, in which case their outcome arrives later as a
/// [`StackEvent`](crate::stack::StackEvent). The attribute cache queries
/// (`attr_count`, `all_characteristics`, `all_descriptors`) are the
/// exception and answer synchronously from what the last service search
/// populated.
pub trait GattStack: Send + 'static {
    /// Bring up the controller and host
    fn enable(&mut self) -> StackResult<()>;

    /// Register a client application; completes with `GattcEvent::Registered`
    fn register_app(&mut self, app_id: ProfileId) -> StackResult<()>;

    /// Preferred MTU used by subsequent MTU exchanges
    fn set_local_mtu(&mut self, mtu: u16) -> StackResult<()>;

    /// Configure scanning; completes with `GapEvent::ScanParamsSet`
    fn set_scan_params(&mut self, params: &ScanParams) -> StackResult<()>;

    /// Scan for `duration_secs` seconds, reporting `GapEvent::ScanResult`s
    fn start_scanning(&mut self, duration_secs: u32) -> StackResult<()>;

    /// Stop an ongoing scan
    fn stop_scanning(&mut self) -> StackResult<()>;

    /// Open a link to `addr` on behalf of the profile registered as `transport`
    fn open(
        &mut self,
        transport: TransportId,
        addr: PeerAddress,
        addr_type: AddressType,
        direct: bool,
    ) -> StackResult<()>;

    /// Start an MTU exchange on an open link
    fn request_mtu(&mut self, transport: TransportId, conn_id: ConnId) -> StackResult<()>;

    /// Search services, optionally filtered by UUID
    fn search_service(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        filter: Option<BtUuid>,
    ) -> StackResult<()>;

    /// Number of cached attributes matching `query`
    fn attr_count(
        &self,
        transport: TransportId,
        conn_id: ConnId,
        query: AttrQuery,
    ) -> StackResult<u16>;

    /// All cached characteristics within `range`, in cache order
    fn all_characteristics(
        &self,
        transport: TransportId,
        conn_id: ConnId,
        range: HandleRange,
    ) -> StackResult<Vec<CharElement>>;

    /// All cached descriptors of the characteristic at `char_handle`
    fn all_descriptors(
        &self,
        transport: TransportId,
        conn_id: ConnId,
        char_handle: Handle,
    ) -> StackResult<Vec<DescrElement>>;

    /// Read a characteristic value; completes with `GattcEvent::ReadChar`
    fn read_char(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
    ) -> StackResult<()>;

    /// Write a characteristic value; completes with `GattcEvent::WriteChar`
    fn write_char(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
        value: &[u8],
        write_type: WriteType,
    ) -> StackResult<()>;

    /// Subscribe to notifications; completes with `GattcEvent::RegisteredForNotify`
    fn register_for_notify(
        &mut self,
        transport: TransportId,
        addr: PeerAddress,
        handle: Handle,
    ) -> StackResult<()>;
}
