//! Events delivered by the Bluetooth stack

use crate::core::types::{
    AddressType, BtUuid, ConnId, GattStatus, Handle, PeerAddress, ProfileId, TransportId,
};

/// Every asynchronous completion the stack reports, tagged by origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    Gap(GapEvent),
    Gattc {
        transport: TransportId,
        event: GattcEvent,
    },
}

/// Scan-side events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapEvent {
    /// Scan parameters were applied
    ScanParamsSet { status: GattStatus },
    /// One advertising report
    ScanResult {
        addr: PeerAddress,
        addr_type: AddressType,
        rssi: i16,
        adv_data: Vec<u8>,
    },
    /// The scan window elapsed
    ScanComplete,
    /// A stop-scan request took effect
    ScanStopped { status: GattStatus },
}

/// GATT client events, keyed by the transport id of the profile they belong to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattcEvent {
    /// Registration completed; the only event keyed by profile id
    Registered { status: GattStatus, app_id: ProfileId },
    /// Result of an open request
    Opened {
        status: GattStatus,
        conn_id: ConnId,
        addr: PeerAddress,
        mtu: u16,
    },
    /// Link established
    Connected { conn_id: ConnId, addr: PeerAddress },
    /// MTU exchange finished
    MtuConfigured {
        status: GattStatus,
        conn_id: ConnId,
        mtu: u16,
    },
    /// Primary service discovery finished at the stack level
    ServicesDiscovered { status: GattStatus, conn_id: ConnId },
    /// One service found by a service search
    SearchResult {
        conn_id: ConnId,
        uuid: BtUuid,
        start_handle: Handle,
        end_handle: Handle,
        inst_id: u8,
        primary: bool,
    },
    /// Service search finished
    SearchComplete { status: GattStatus, conn_id: ConnId },
    /// Virtual connection closed
    Closed { conn_id: ConnId, reason: u16 },
    /// Physical link lost
    Disconnected {
        conn_id: ConnId,
        addr: PeerAddress,
        reason: u16,
    },
    /// Result of a characteristic read
    ReadChar {
        status: GattStatus,
        conn_id: ConnId,
        handle: Handle,
        value: Vec<u8>,
    },
    /// Result of a characteristic write
    WriteChar {
        status: GattStatus,
        conn_id: ConnId,
        handle: Handle,
    },
    /// Notification or indication from the peer
    Notify {
        conn_id: ConnId,
        handle: Handle,
        value: Vec<u8>,
        is_notify: bool,
    },
    /// Result of a notification registration
    RegisteredForNotify { status: GattStatus, handle: Handle },
}

impl GattcEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            GattcEvent::Registered { .. } => "registered",
            GattcEvent::Opened { .. } => "opened",
            GattcEvent::Connected { .. } => "connected",
            GattcEvent::MtuConfigured { .. } => "mtu_configured",
            GattcEvent::ServicesDiscovered { .. } => "services_discovered",
            GattcEvent::SearchResult { .. } => "search_result",
            GattcEvent::SearchComplete { .. } => "search_complete",
            GattcEvent::Closed { .. } => "closed",
            GattcEvent::Disconnected { .. } => "disconnected",
            GattcEvent::ReadChar { .. } => "read_char",
            GattcEvent::WriteChar { .. } => "write_char",
            GattcEvent::Notify { .. } => "notify",
            GattcEvent::RegisteredForNotify { .. } => "registered_for_notify",
        }
    }
}
