//! Domain types, errors and well-known UUIDs

pub mod error;
pub mod types;
pub mod uuids;
