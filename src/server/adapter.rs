//! Adapter bring-up and advertising for the companion peripheral

use bluer::{
    Adapter, AdapterEvent,
    adv::{Advertisement, AdvertisementHandle, Type},
    gatt::local::ApplicationHandle,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    core::{error::TransportResult, uuids::EXAMPLE_SERVICE_UUID},
    server::{gatt::GattServer, value_store::ValueStore},
};

/// Advertised name derived from the last three bytes of the adapter address
pub fn device_name(addr: [u8; 6]) -> String {
    format!("BLE_device_{:x}_{:x}_{:x}", addr[3], addr[4], addr[5])
}

/// Adapter serving the example service
pub struct PeripheralAdapter {
    adapter: Adapter,
    name_override: Option<String>,
    app_handle: Option<ApplicationHandle>,
    adv_handle: Option<AdvertisementHandle>,
}

impl PeripheralAdapter {
    /// Open the default adapter
    pub async fn new(name_override: Option<String>) -> TransportResult<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;

        info!("Using BLE adapter: {}", adapter.name());

        Ok(Self {
            adapter,
            name_override,
            app_handle: None,
            adv_handle: None,
        })
    }

    /// Power on, publish the GATT application and advertise
    ///
    /// Returns the advertised name.
    pub async fn start<V: ValueStore>(&mut self, server: &GattServer<V>) -> TransportResult<String> {
        info!("Starting BLE peripheral");

        self.adapter.set_powered(true).await?;

        let name = match &self.name_override {
            Some(name) => name.clone(),
            None => device_name(self.adapter.address().await?.0),
        };
        self.adapter.set_alias(name.clone()).await?;

        self.app_handle = Some(server.register(&self.adapter).await?);

        let adv = Advertisement {
            advertisement_type: Type::Peripheral,
            service_uuids: [EXAMPLE_SERVICE_UUID].into_iter().collect(),
            discoverable: Some(true),
            local_name: Some(name.clone()),
            ..Default::default()
        };
        self.adv_handle = Some(self.adapter.advertise(adv).await?);

        info!("Advertising as '{name}'");
        Ok(name)
    }

    /// Stop advertising and withdraw the GATT application
    pub fn stop(&mut self) {
        info!("Stopping BLE peripheral");
        self.adv_handle = None;
        self.app_handle = None;
    }

    /// Log adapter events until the adapter goes away
    pub async fn run_event_loop(&self) -> TransportResult<()> {
        let mut events = self.adapter.events().await?;

        info!("BLE event loop started");

        while let Some(event) = events.next().await {
            match event {
                AdapterEvent::DeviceAdded(addr) => {
                    debug!("Device added: {}", addr);
                }
                AdapterEvent::DeviceRemoved(addr) => {
                    debug!("Device removed: {}", addr);
                }
                AdapterEvent::PropertyChanged(prop) => {
                    debug!(?prop, "Adapter property changed");
                }
            }
        }

        warn!("BLE event loop ended");
        Ok(())
    }
}
