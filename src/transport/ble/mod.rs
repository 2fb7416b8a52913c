//! BlueZ-backed stack for the central role

pub mod central;

pub use central::BluezStack;
