//! Configuration module

pub mod cli;
pub mod settings;

pub use cli::{CliArgs, Mode};
pub use settings::{ClientSettings, ServerSettings, Settings};
