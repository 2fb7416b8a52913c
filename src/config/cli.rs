//! Command-line argument parsing

use clap::{Parser, Subcommand};

use crate::client::engine::{DEFAULT_LOCAL_MTU, DEFAULT_SCAN_DURATION_SECS};

#[derive(Parser, Debug, Clone)]
#[clap(name = "ble-gatt-link", version, author)]
#[clap(about = "BLE GATT central client with a companion peripheral")]
pub struct CliArgs {
    #[clap(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Scan for a named peripheral, connect and discover its services
    Client {
        /// Complete local name of the peripheral to connect to
        #[clap(short, long)]
        name: Option<String>,

        /// Start the engine right away instead of waiting for `ble --start`
        #[clap(long)]
        start: bool,

        /// Scan window in seconds
        #[clap(long, default_value_t = DEFAULT_SCAN_DURATION_SECS)]
        scan_duration: u32,

        /// Preferred ATT MTU
        #[clap(long, default_value_t = DEFAULT_LOCAL_MTU)]
        local_mtu: u16,

        /// Profile that opens the link when the target is found
        #[clap(long, default_value_t = 0)]
        profile: usize,
    },

    /// Advertise and serve the example service
    Server {
        /// Advertised name, defaults to one derived from the adapter address
        #[clap(short, long)]
        name: Option<String>,
    },
}
