//! Domain types shared by the central engine, the stack seam and the peripheral

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 16-bit attribute handle
pub type Handle = u16;

/// Connection identifier assigned by the stack when a link opens
pub type ConnId = u16;

/// Logical profile identifier, equal to the slot index in the registry
pub type ProfileId = usize;

/// Identifier the stack assigns to a profile when its registration completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportId(pub u8);

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// Bluetooth device address (most significant byte first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PeerAddress(pub [u8; 6]);

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Address type reported with an advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Public,
    Random,
}

/// Status code carried by stack completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattStatus(pub u8);

impl GattStatus {
    pub const OK: GattStatus = GattStatus(0x00);
    pub const INVALID_HANDLE: GattStatus = GattStatus(0x01);
    pub const READ_NOT_PERMIT: GattStatus = GattStatus(0x02);
    pub const WRITE_NOT_PERMIT: GattStatus = GattStatus(0x03);
    pub const NO_RESOURCES: GattStatus = GattStatus(0x80);
    pub const ERROR: GattStatus = GattStatus(0x85);
    pub const ILLEGAL_PARAMETER: GattStatus = GattStatus(0x87);
    pub const NOT_FOUND: GattStatus = GattStatus(0x8a);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }
}

impl std::fmt::Display for GattStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Bluetooth base UUID, used to expand 16/32-bit UUIDs
const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Attribute UUID in the width the peer advertised it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "len", content = "value", rename_all = "snake_case")]
pub enum BtUuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(Uuid),
}

impl BtUuid {
    /// Expand to the 128-bit form
    pub fn to_uuid128(self) -> Uuid {
        match self {
            BtUuid::Uuid16(v) => Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(v) << 96)),
            BtUuid::Uuid32(v) => Uuid::from_u128(BLUETOOTH_BASE_UUID | (u128::from(v) << 96)),
            BtUuid::Uuid128(u) => u,
        }
    }

    /// Narrowest representation of a 128-bit UUID
    pub fn from_uuid128(uuid: Uuid) -> Self {
        let raw = uuid.as_u128();
        let short = raw >> 96;
        if raw & ((1u128 << 96) - 1) == BLUETOOTH_BASE_UUID & ((1u128 << 96) - 1) {
            match u16::try_from(short) {
                Ok(v) => BtUuid::Uuid16(v),
                Err(_) => BtUuid::Uuid32(short as u32),
            }
        } else {
            BtUuid::Uuid128(uuid)
        }
    }

    /// Equality over the expanded 128-bit form
    pub fn matches(&self, other: &BtUuid) -> bool {
        self.to_uuid128() == other.to_uuid128()
    }
}

impl From<Uuid> for BtUuid {
    fn from(uuid: Uuid) -> Self {
        BtUuid::Uuid128(uuid)
    }
}

impl std::fmt::Display for BtUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtUuid::Uuid16(v) => write!(f, "0x{v:04x}"),
            BtUuid::Uuid32(v) => write!(f, "0x{v:08x}"),
            BtUuid::Uuid128(u) => write!(f, "{u}"),
        }
    }
}

/// Characteristic property bits of a characteristic declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CharProperties(pub u8);

impl CharProperties {
    pub const BROADCAST: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const WRITE_NO_RSP: u8 = 0x04;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const INDICATE: u8 = 0x20;
    pub const AUTH: u8 = 0x40;
    pub const EXT_PROP: u8 = 0x80;

    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn can_read(self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(self) -> bool {
        self.contains(Self::WRITE) || self.contains(Self::WRITE_NO_RSP)
    }

    pub fn can_notify(self) -> bool {
        self.contains(Self::NOTIFY) || self.contains(Self::INDICATE)
    }
}

/// Inclusive attribute handle range
///
/// A range whose `start` is greater than its `end` is empty, which is what
/// the descriptor range of a characteristic immediately followed by another
/// characteristic looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleRange {
    pub start: Handle,
    pub end: Handle,
}

impl HandleRange {
    pub fn new(start: Handle, end: Handle) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.start <= handle && handle <= self.end
    }
}

impl std::fmt::Display for HandleRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Identity of the service a profile targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub uuid: BtUuid,
    pub primary: bool,
    pub inst_id: u8,
}

/// Live link state of a profile slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub conn_id: ConnId,
    pub peer: PeerAddress,
}

/// Descriptor discovered under a characteristic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub handle: Handle,
    pub uuid: BtUuid,
}

/// Characteristic discovered within a profile's service range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicRecord {
    pub handle: Handle,
    pub properties: CharProperties,
    pub uuid: BtUuid,
    pub descriptors: Vec<DescriptorRecord>,
}

/// Per-slot discovery and connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Unregistered,
    Registered,
    Connecting,
    AwaitingMtu,
    DiscoveringServices,
    DiscoveringCharacteristics,
    DiscoveringDescriptors,
    Ready,
    Disconnected,
}

impl SlotState {
    /// States from which a connect request may be issued
    pub fn can_connect(self) -> bool {
        matches!(self, SlotState::Registered | SlotState::Disconnected)
    }

    /// States in which a link to the peer exists
    pub fn is_linked(self) -> bool {
        matches!(
            self,
            SlotState::AwaitingMtu
                | SlotState::DiscoveringServices
                | SlotState::DiscoveringCharacteristics
                | SlotState::DiscoveringDescriptors
                | SlotState::Ready
        )
    }
}

/// GAP scan parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    pub active: bool,
    pub own_address: AddressType,
    pub filter_duplicates: bool,
    /// Scan interval in 0.625 ms units
    pub interval: u16,
    /// Scan window in 0.625 ms units
    pub window: u16,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            active: true,
            own_address: AddressType::Public,
            filter_duplicates: false,
            interval: 0x50,
            window: 0x30,
        }
    }
}

/// How a characteristic write is acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    NoResponse,
    WithResponse,
}
