//! Line-oriented command console for the client

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::{
    client::runner::ClientHandle,
    core::{error::ClientResult, types::ProfileId},
};

#[derive(Parser, Debug)]
#[clap(no_binary_name = true)]
struct ConsoleLine {
    #[clap(subcommand)]
    command: ConsoleCommand,
}

/// Commands accepted on the console
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Set the target device name and start the client
    Ble {
        /// Start scanning and connecting
        #[clap(long)]
        start: bool,

        /// Complete local name of the device to connect to
        #[clap(long)]
        name: Option<String>,
    },

    /// Read or write a discovered characteristic
    Char {
        /// Profile id
        #[clap(long)]
        svcid: ProfileId,

        /// Characteristic index within the profile
        #[clap(long)]
        chrid: usize,

        /// Value to write; reads when absent or empty
        #[clap(long, alias = "chrval")]
        val: Option<String>,
    },

    /// Print the discovered profile database
    Db,
}

/// Parse one console line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    ConsoleLine::try_parse_from(words).map(|l| Some(l.command))
}

/// Run a command against the engine, returning the text to show
pub async fn execute(handle: &ClientHandle, command: ConsoleCommand) -> ClientResult<String> {
    match command {
        ConsoleCommand::Ble { start, name } => {
            if let Some(name) = name {
                handle.set_target_name(name).await?;
            }
            if start {
                handle.start().await?;
                Ok("client started".into())
            } else {
                Ok("target name set".into())
            }
        }
        ConsoleCommand::Char { svcid, chrid, val } => match val.filter(|v| !v.is_empty()) {
            Some(value) => {
                handle.write(svcid, chrid, value.into_bytes()).await?;
                Ok(format!("write to {svcid}/{chrid} issued"))
            }
            None => {
                handle.read(svcid, chrid).await?;
                Ok(format!("read of {svcid}/{chrid} issued"))
            }
        },
        ConsoleCommand::Db => {
            let snapshot = handle.snapshot().await?;
            Ok(serde_json::to_string_pretty(&snapshot).unwrap_or_else(|e| e.to_string()))
        }
    }
}

/// Read commands from `input` until it ends, writing replies to `output`
pub async fn run_console<R, W>(handle: ClientHandle, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(command)) => {
                debug!(?command, "Console command");
                match execute(&handle, command).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Console command failed: {e}");
                        format!("error: {e}")
                    }
                }
            }
            Err(e) => e.render().to_string(),
        };
        output.write_all(reply.trim_end().as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}
