//! BLE GATT link - Main Entry Point

use std::sync::Arc;

use ble_gatt_link::{
    client::{ClientRunner, DiscoveryEngine, console::run_console, registry},
    config::{CliArgs, ClientSettings, ServerSettings, Settings},
    server::{GattServer, MemoryValueStore, PeripheralAdapter},
    transport::ble::BluezStack,
};
use clap::Parser;
use tokio::{io::BufReader, sync::mpsc, task::JoinHandle};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ble_gatt_link=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();
    info!(?args, "Starting BLE GATT link");

    let tasks = match Settings::from(args) {
        Settings::Client(settings) => start_client(settings).await?,
        Settings::Server(settings) => start_server(settings).await?,
    };

    #[cfg(feature = "systemd")]
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        error!("Failed to notify systemd: {}", e);
    }

    info!("Service started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
        _ = shutdown_signal() => {
            info!("Received SIGTERM, shutting down gracefully");
        }
        _ = async {
            for task in tasks {
                let _ = task.await;
            }
        } => {
            info!("All tasks completed");
        }
    }

    info!("Shutting down...");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");

    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await
}

async fn start_client(
    settings: ClientSettings,
) -> Result<Vec<JoinHandle<()>>, Box<dyn std::error::Error>> {
    info!("Starting GATT client");

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let stack = BluezStack::new(event_tx).await?;

    let (slots, _last_read) = registry();
    let engine = DiscoveryEngine::new(stack, slots, settings.engine);
    let (runner, handle) = ClientRunner::new(engine, event_rx);

    let mut tasks = vec![tokio::spawn(async move {
        let engine = runner.run().await;
        info!(profiles = engine.slots().len(), "Client runner stopped");
    })];

    if let Some(name) = settings.target_name {
        handle.set_target_name(name).await?;
    }
    if settings.start {
        handle.start().await?;
    }

    tasks.push(tokio::spawn(async move {
        let input = BufReader::new(tokio::io::stdin());
        if let Err(e) = run_console(handle, input, tokio::io::stdout()).await {
            error!("Console error: {}", e);
        }
    }));

    Ok(tasks)
}

async fn start_server(
    settings: ServerSettings,
) -> Result<Vec<JoinHandle<()>>, Box<dyn std::error::Error>> {
    info!("Starting GATT server");

    let store = Arc::new(MemoryValueStore::new());
    let server = GattServer::new(store);

    let mut adapter = PeripheralAdapter::new(settings.name).await?;
    adapter.start(&server).await?;

    let task = tokio::spawn(async move {
        if let Err(e) = adapter.run_event_loop().await {
            error!("BLE adapter error: {}", e);
        }
        adapter.stop();
    });

    Ok(vec![task])
}
