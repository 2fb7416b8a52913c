//! GATT client (central role)
//!
//! The [`DiscoveryEngine`] owns a fixed table of profile slots and walks each
//! of them through registration, scanning, connection, MTU exchange and
//! attribute discovery as stack events arrive. [`ClientRunner`] hosts the
//! engine on a tokio task; [`ClientHandle`] is how the rest of the program
//! talks to it.

pub mod connection;
pub mod console;
pub mod discovery;
pub mod dispatcher;
pub mod engine;
pub mod example_profile;
pub mod facade;
pub mod profile;
pub mod runner;
pub mod scan_filter;

pub use engine::{DiscoveryEngine, EngineConfig};
pub use example_profile::{ExampleProfile, registry};
pub use profile::{ProfileCallback, ProfileDbSnapshot, ProfileLink, ProfileSlot, ProfileSnapshot};
pub use runner::{ClientHandle, ClientRunner};
pub use scan_filter::{ScanDecision, ScanFilter};
