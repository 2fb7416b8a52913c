//! BLE GATT link
//!
//! A central-role GATT client that scans for a named peripheral, connects,
//! discovers its attribute database and exposes handle-indexed reads, writes
//! and notifications to profile code:
//! - Client engine driven by stack events ([`client`])
//! - Abstract stack seam with a BlueZ implementation ([`stack`], [`transport`])
//! - Companion peripheral serving the example service ([`server`])

pub mod client;
pub mod config;
pub mod core;
pub mod server;
pub mod stack;
pub mod transport;

pub use core::{
    error::{ClientError, StackError, TransportError},
    types::{BtUuid, GattStatus, HandleRange, PeerAddress, SlotState},
};
