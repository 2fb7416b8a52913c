//! Runtime settings

use crate::{
    client::EngineConfig,
    config::{CliArgs, Mode},
    core::types::ScanParams,
};

/// Settings of the central role
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub target_name: Option<String>,
    pub start: bool,
    pub engine: EngineConfig,
}

/// Settings of the companion peripheral
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    pub name: Option<String>,
}

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub enum Settings {
    Client(ClientSettings),
    Server(ServerSettings),
}

impl From<Mode> for Settings {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Client {
                name,
                start,
                scan_duration,
                local_mtu,
                profile,
            } => Settings::Client(ClientSettings {
                target_name: name,
                start,
                engine: EngineConfig {
                    scan_params: ScanParams::default(),
                    scan_duration_secs: scan_duration,
                    local_mtu,
                    connect_profile: profile,
                },
            }),
            Mode::Server { name } => Settings::Server(ServerSettings { name }),
        }
    }
}

impl From<CliArgs> for Settings {
    fn from(args: CliArgs) -> Self {
        args.mode.into()
    }
}
