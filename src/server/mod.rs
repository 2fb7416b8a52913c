//! Companion GATT peripheral serving the example service

pub mod adapter;
pub mod characteristics;
pub mod gatt;
pub mod value_store;

pub use {
    adapter::PeripheralAdapter,
    characteristics::CharacteristicHandler,
    gatt::GattServer,
    value_store::{MemoryValueStore, ValueStore},
};
