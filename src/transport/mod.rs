//! Bluetooth host transports

pub mod ble;
