//! Error types for the GATT client engine and the companion peripheral

use thiserror::Error;

use super::types::{GattStatus, Handle, HandleRange, ProfileId, SlotState};

/// Result type for stack requests
pub type StackResult<T> = Result<T, StackError>;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Immediate failures reported by the Bluetooth stack when a request is issued
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("{op} rejected by stack (status {status})")]
    Rejected {
        op: &'static str,
        status: GattStatus,
    },

    #[error("Stack not enabled")]
    NotEnabled,

    #[error("Unknown connection id {0}")]
    UnknownConnection(u16),

    #[error("Stack unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned to callers of the client engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Invalid profile id {0}")]
    InvalidProfile(ProfileId),

    #[error("Invalid characteristic index {index} for profile {profile} ({available} available)")]
    InvalidCharacteristic {
        profile: ProfileId,
        index: usize,
        available: usize,
    },

    #[error("Profile {profile} not ready (state {state:?})")]
    NotReady { profile: ProfileId, state: SlotState },

    #[error("Invalid target name: {0}")]
    InvalidTargetName(String),

    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Engine stopped")]
    EngineStopped,

    #[error("Stack error: {0}")]
    Stack(#[from] StackError),
}

impl ClientError {
    /// Whether the error stems from caller-supplied arguments
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidProfile(_)
                | ClientError::InvalidCharacteristic { .. }
                | ClientError::InvalidTargetName(_)
        )
    }
}

/// Failures of a single discovery step; logged, never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("Characteristic count in {range} failed: {source}")]
    CharacteristicCount {
        range: HandleRange,
        #[source]
        source: StackError,
    },

    #[error("Fetching characteristics in {range} failed: {source}")]
    CharacteristicFetch {
        range: HandleRange,
        #[source]
        source: StackError,
    },

    #[error("Descriptor count for characteristic {handle} in {range} failed: {source}")]
    DescriptorCount {
        handle: Handle,
        range: HandleRange,
        #[source]
        source: StackError,
    },

    #[error("Fetching descriptors for characteristic {handle} failed: {source}")]
    DescriptorFetch {
        handle: Handle,
        #[source]
        source: StackError,
    },
}

/// Errors related to the BlueZ transport and the peripheral server
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("BLE error: {0}")]
    Ble(#[from] bluer::Error),

    #[error("Value too long: {len} bytes exceeds capacity {capacity}")]
    ValueTooLong { len: usize, capacity: usize },

    #[error("Offset {offset} beyond value of {len} bytes")]
    InvalidOffset { offset: usize, len: usize },
}
