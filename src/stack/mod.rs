//! Bluetooth stack abstraction layer

pub mod adv;
pub mod event;
pub mod gatt_stack;
#[cfg(test)]
pub mod mock_stack;

pub use event::{GapEvent, GattcEvent, StackEvent};
pub use gatt_stack::{AttrQuery, CharElement, DescrElement, GattStack};

#[cfg(test)]
pub use mock_stack::{MockCharacteristic, MockService, MockStack, StackCall};
