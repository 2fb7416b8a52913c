//! BlueZ implementation of the central-role stack

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bluer::{
    Adapter, AdapterEvent, Address, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport,
    gatt::{
        CharacteristicFlags, WriteOp,
        remote::{Characteristic, CharacteristicWriteRequest},
    },
};
use futures::{StreamExt, pin_mut};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    core::{
        error::{StackError, StackResult, TransportResult},
        types::{
            AddressType, BtUuid, CharProperties, ConnId, GattStatus, Handle, HandleRange,
            PeerAddress, ProfileId, ScanParams, TransportId, WriteType,
        },
    },
    stack::{
        AttrQuery, CharElement, DescrElement, GapEvent, GattStack, GattcEvent, StackEvent, adv,
    },
};

/// First transport id handed out at registration
const FIRST_TRANSPORT_ID: u8 = 3;

/// ATT default MTU, reported until an exchange happened
const DEFAULT_ATT_MTU: u16 = 23;

/// BlueZ does not expose HCI disconnect reasons; report remote user terminated
const DISCONNECT_REASON: u16 = 0x13;

/// How long to wait for BlueZ to resolve services after connecting
const SERVICES_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

const SERVICES_RESOLVE_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
struct CachedService {
    uuid: BtUuid,
    primary: bool,
    range: HandleRange,
}

#[derive(Clone)]
struct CachedCharacteristic {
    element: CharElement,
    descriptors: Vec<DescrElement>,
    remote: Characteristic,
}

/// Attributes found by the last service search on one connection
#[derive(Default)]
struct AttributeCache {
    services: Vec<CachedService>,
    characteristics: BTreeMap<Handle, CachedCharacteristic>,
}

#[derive(Clone)]
struct Link {
    addr: PeerAddress,
    device: Device,
}

#[derive(Default)]
struct Shared {
    links: HashMap<ConnId, Link>,
    caches: HashMap<ConnId, AttributeCache>,
    next_conn_id: ConnId,
}

impl Shared {
    fn link(&self, conn_id: ConnId) -> StackResult<&Link> {
        self.links
            .get(&conn_id)
            .ok_or(StackError::UnknownConnection(conn_id))
    }

    fn cache(&self, conn_id: ConnId) -> StackResult<&AttributeCache> {
        self.caches
            .get(&conn_id)
            .ok_or(StackError::UnknownConnection(conn_id))
    }

    fn characteristic(&self, conn_id: ConnId, handle: Handle) -> StackResult<Characteristic> {
        self.cache(conn_id)?
            .characteristics
            .get(&handle)
            .map(|c| c.remote.clone())
            .ok_or(StackError::Rejected {
                op: "characteristic_lookup",
                status: GattStatus::INVALID_HANDLE,
            })
    }
}

/// Central-role stack on top of BlueZ
///
/// Requests spawn tokio tasks and return at once; completions are posted to
/// the event channel handed to [`BluezStack::new`]. Must be driven from
/// within a tokio runtime.
pub struct BluezStack {
    adapter: Adapter,
    events: mpsc::UnboundedSender<StackEvent>,
    shared: Arc<Mutex<Shared>>,
    local_mtu: u16,
    scan_stop: Option<oneshot::Sender<()>>,
    enabled: bool,
}

impl BluezStack {
    /// Open the default adapter, posting completions to `events`
    pub async fn new(events: mpsc::UnboundedSender<StackEvent>) -> TransportResult<Self> {
        let session = bluer::Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!("Using BLE adapter: {}", adapter.name());

        Ok(Self {
            adapter,
            events,
            shared: Arc::new(Mutex::new(Shared::default())),
            local_mtu: DEFAULT_ATT_MTU,
            scan_stop: None,
            enabled: false,
        })
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_enabled(&self) -> StackResult<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(StackError::NotEnabled)
        }
    }

    fn link(&self, conn_id: ConnId) -> StackResult<Link> {
        self.shared().link(conn_id).cloned()
    }

    fn sender(&self) -> EventSender {
        EventSender(self.events.clone())
    }
}

/// Posts events to the engine, ignoring a runner that already stopped
#[derive(Clone)]
struct EventSender(mpsc::UnboundedSender<StackEvent>);

impl EventSender {
    fn gap(&self, event: GapEvent) {
        if self.0.send(StackEvent::Gap(event)).is_err() {
            debug!("Event receiver gone");
        }
    }

    fn gattc(&self, transport: TransportId, event: GattcEvent) {
        if self.0.send(StackEvent::Gattc { transport, event }).is_err() {
            debug!("Event receiver gone");
        }
    }
}

fn status_of<T>(result: &bluer::Result<T>) -> GattStatus {
    match result {
        Ok(_) => GattStatus::OK,
        Err(_) => GattStatus::ERROR,
    }
}

fn char_properties(flags: &CharacteristicFlags) -> CharProperties {
    let mut bits = 0;
    for (set, bit) in [
        (flags.broadcast, CharProperties::BROADCAST),
        (flags.read, CharProperties::READ),
        (flags.write_without_response, CharProperties::WRITE_NO_RSP),
        (flags.write, CharProperties::WRITE),
        (flags.notify, CharProperties::NOTIFY),
        (flags.indicate, CharProperties::INDICATE),
        (flags.authenticated_signed_writes, CharProperties::AUTH),
        (flags.extended_properties, CharProperties::EXT_PROP),
    ] {
        if set {
            bits |= bit;
        }
    }
    CharProperties(bits)
}

/// Advertising data rebuilt from what BlueZ reports for a device
async fn advertising_data(device: &Device) -> bluer::Result<Vec<u8>> {
    let mut data = Vec::new();
    if let Some(name) = device.name().await? {
        match adv::encode(adv::AD_TYPE_NAME_COMPLETE, name.as_bytes()) {
            Some(field) => data.extend(field),
            None => debug!(len = name.len(), "Name too long for an AD structure, skipped"),
        }
    }
    Ok(data)
}

async fn scan_result(adapter: &Adapter, addr: Address) -> bluer::Result<GapEvent> {
    let device = adapter.device(addr)?;
    let addr_type = match device.address_type().await? {
        bluer::AddressType::LeRandom => AddressType::Random,
        _ => AddressType::Public,
    };
    Ok(GapEvent::ScanResult {
        addr: PeerAddress(addr.0),
        addr_type,
        rssi: device.rssi().await?.unwrap_or_default(),
        adv_data: advertising_data(&device).await?,
    })
}

/// Walk the remote database into an attribute cache
///
/// BlueZ object ids are the attribute handles; a service ends at the highest
/// handle found beneath it.
async fn build_cache(device: &Device) -> bluer::Result<AttributeCache> {
    let mut cache = AttributeCache::default();
    for service in device.services().await? {
        let start = service.id();
        let mut end = start;

        for characteristic in service.characteristics().await? {
            let handle = characteristic.id();
            end = end.max(handle);

            let mut descriptors = Vec::new();
            for descriptor in characteristic.descriptors().await? {
                end = end.max(descriptor.id());
                descriptors.push(DescrElement {
                    handle: descriptor.id(),
                    uuid: BtUuid::from_uuid128(descriptor.uuid().await?),
                });
            }

            let element = CharElement {
                handle,
                properties: char_properties(&characteristic.flags().await?),
                uuid: BtUuid::from_uuid128(characteristic.uuid().await?),
            };
            cache.characteristics.insert(
                handle,
                CachedCharacteristic {
                    element,
                    descriptors,
                    remote: characteristic,
                },
            );
        }

        cache.services.push(CachedService {
            uuid: BtUuid::from_uuid128(service.uuid().await?),
            primary: service.primary().await?,
            range: HandleRange::new(start, end),
        });
    }
    Ok(cache)
}

/// Report link loss once BlueZ says the device disconnected
async fn watch_link(
    device: Device,
    shared: Arc<Mutex<Shared>>,
    events: EventSender,
    transport: TransportId,
    conn_id: ConnId,
    addr: PeerAddress,
) {
    let stream = match device.events().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%addr, "Cannot watch device: {e}");
            return;
        }
    };
    pin_mut!(stream);

    while let Some(event) = stream.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) = event {
            break;
        }
    }

    {
        let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
        shared.links.remove(&conn_id);
        shared.caches.remove(&conn_id);
    }
    info!(%addr, conn_id, "Link lost");
    events.gattc(
        transport,
        GattcEvent::Closed {
            conn_id,
            reason: DISCONNECT_REASON,
        },
    );
    events.gattc(
        transport,
        GattcEvent::Disconnected {
            conn_id,
            addr,
            reason: DISCONNECT_REASON,
        },
    );
}

async fn wait_services_resolved(device: &Device) -> bluer::Result<bool> {
    let deadline = tokio::time::Instant::now() + SERVICES_RESOLVE_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if device.is_services_resolved().await? {
            return Ok(true);
        }
        tokio::time::sleep(SERVICES_RESOLVE_POLL).await;
    }
    Ok(false)
}

impl GattStack for BluezStack {
    fn enable(&mut self) -> StackResult<()> {
        if self.enabled {
            return Ok(());
        }
        self.enabled = true;
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            match adapter.set_powered(true).await {
                Ok(()) => info!("Adapter powered on"),
                Err(e) => error!("Powering adapter failed: {e}"),
            }
        });
        Ok(())
    }

    fn register_app(&mut self, app_id: ProfileId) -> StackResult<()> {
        self.ensure_enabled()?;
        let id = u8::try_from(app_id)
            .ok()
            .and_then(|id| id.checked_add(FIRST_TRANSPORT_ID))
            .ok_or(StackError::Rejected {
                op: "register_app",
                status: GattStatus::NO_RESOURCES,
            })?;
        // nothing to register with BlueZ for a client; complete right away
        self.sender().gattc(
            TransportId(id),
            GattcEvent::Registered {
                status: GattStatus::OK,
                app_id,
            },
        );
        Ok(())
    }

    fn set_local_mtu(&mut self, mtu: u16) -> StackResult<()> {
        if mtu < DEFAULT_ATT_MTU {
            return Err(StackError::Rejected {
                op: "set_local_mtu",
                status: GattStatus::ILLEGAL_PARAMETER,
            });
        }
        self.local_mtu = mtu;
        Ok(())
    }

    fn set_scan_params(&mut self, params: &ScanParams) -> StackResult<()> {
        self.ensure_enabled()?;
        // BlueZ picks interval and window itself and always scans actively
        debug!(?params, "Applying scan parameters");
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: !params.filter_duplicates,
            ..Default::default()
        };
        let adapter = self.adapter.clone();
        let events = self.sender();
        tokio::spawn(async move {
            let result = adapter.set_discovery_filter(filter).await;
            if let Err(e) = &result {
                error!("Setting discovery filter failed: {e}");
            }
            events.gap(GapEvent::ScanParamsSet {
                status: status_of(&result),
            });
        });
        Ok(())
    }

    fn start_scanning(&mut self, duration_secs: u32) -> StackResult<()> {
        self.ensure_enabled()?;
        let (stop_tx, mut stop_rx) = oneshot::channel();
        self.scan_stop = Some(stop_tx);

        let adapter = self.adapter.clone();
        let events = self.sender();
        tokio::spawn(async move {
            let discovery = match adapter.discover_devices().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Starting discovery failed: {e}");
                    events.gap(GapEvent::ScanComplete);
                    return;
                }
            };
            pin_mut!(discovery);
            let window = tokio::time::sleep(Duration::from_secs(u64::from(duration_secs)));
            pin_mut!(window);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        events.gap(GapEvent::ScanStopped { status: GattStatus::OK });
                        break;
                    }
                    _ = &mut window => {
                        events.gap(GapEvent::ScanComplete);
                        break;
                    }
                    event = discovery.next() => match event {
                        Some(AdapterEvent::DeviceAdded(addr)) => {
                            match scan_result(&adapter, addr).await {
                                Ok(result) => events.gap(result),
                                Err(e) => debug!(%addr, "Skipping device: {e}"),
                            }
                        }
                        Some(_) => {}
                        None => {
                            events.gap(GapEvent::ScanComplete);
                            break;
                        }
                    }
                }
            }
            // dropping the stream ends BlueZ discovery
        });
        Ok(())
    }

    fn stop_scanning(&mut self) -> StackResult<()> {
        match self.scan_stop.take() {
            Some(stop) => {
                if stop.send(()).is_err() {
                    debug!("Scan already finished");
                }
            }
            None => debug!("No scan running"),
        }
        Ok(())
    }

    fn open(
        &mut self,
        transport: TransportId,
        addr: PeerAddress,
        _addr_type: AddressType,
        _direct: bool,
    ) -> StackResult<()> {
        self.ensure_enabled()?;
        let device = self
            .adapter
            .device(Address(addr.0))
            .map_err(|e| StackError::Unavailable(e.to_string()))?;
        let shared = Arc::clone(&self.shared);
        let events = self.sender();

        tokio::spawn(async move {
            if let Err(e) = device.connect().await {
                error!(%addr, "Connect failed: {e}");
                events.gattc(
                    transport,
                    GattcEvent::Opened {
                        status: GattStatus::ERROR,
                        conn_id: 0,
                        addr,
                        mtu: DEFAULT_ATT_MTU,
                    },
                );
                return;
            }

            let conn_id = {
                let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
                let conn_id = shared.next_conn_id;
                shared.next_conn_id = conn_id.wrapping_add(1);
                shared.links.insert(
                    conn_id,
                    Link {
                        addr,
                        device: device.clone(),
                    },
                );
                conn_id
            };

            events.gattc(
                transport,
                GattcEvent::Opened {
                    status: GattStatus::OK,
                    conn_id,
                    addr,
                    mtu: DEFAULT_ATT_MTU,
                },
            );
            events.gattc(transport, GattcEvent::Connected { conn_id, addr });

            watch_link(device, shared, events, transport, conn_id, addr).await;
        });
        Ok(())
    }

    fn request_mtu(&mut self, transport: TransportId, conn_id: ConnId) -> StackResult<()> {
        let link = self.link(conn_id)?;
        let mtu = self.local_mtu;
        let events = self.sender();

        // BlueZ runs the exchange on its own; report the preferred MTU and
        // follow with discovery once services are resolved
        tokio::spawn(async move {
            events.gattc(
                transport,
                GattcEvent::MtuConfigured {
                    status: GattStatus::OK,
                    conn_id,
                    mtu,
                },
            );
            let status = match wait_services_resolved(&link.device).await {
                Ok(true) => GattStatus::OK,
                Ok(false) => {
                    warn!(conn_id, "Services not resolved in time");
                    GattStatus::ERROR
                }
                Err(e) => {
                    error!(conn_id, "Checking services failed: {e}");
                    GattStatus::ERROR
                }
            };
            events.gattc(transport, GattcEvent::ServicesDiscovered { status, conn_id });
        });
        Ok(())
    }

    fn search_service(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        filter: Option<BtUuid>,
    ) -> StackResult<()> {
        let link = self.link(conn_id)?;
        let shared = Arc::clone(&self.shared);
        let events = self.sender();

        tokio::spawn(async move {
            let cache = match build_cache(&link.device).await {
                Ok(cache) => cache,
                Err(e) => {
                    error!(conn_id, "Reading remote database failed: {e}");
                    events.gattc(
                        transport,
                        GattcEvent::SearchComplete {
                            status: GattStatus::ERROR,
                            conn_id,
                        },
                    );
                    return;
                }
            };

            let services = cache.services.clone();
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .caches
                .insert(conn_id, cache);

            for (inst_id, service) in services.iter().enumerate() {
                if filter.is_some_and(|f| !f.matches(&service.uuid)) {
                    continue;
                }
                events.gattc(
                    transport,
                    GattcEvent::SearchResult {
                        conn_id,
                        uuid: service.uuid,
                        start_handle: service.range.start,
                        end_handle: service.range.end,
                        inst_id: u8::try_from(inst_id).unwrap_or(u8::MAX),
                        primary: service.primary,
                    },
                );
            }
            events.gattc(
                transport,
                GattcEvent::SearchComplete {
                    status: GattStatus::OK,
                    conn_id,
                },
            );
        });
        Ok(())
    }

    fn attr_count(
        &self,
        _transport: TransportId,
        conn_id: ConnId,
        query: AttrQuery,
    ) -> StackResult<u16> {
        let shared = self.shared();
        let cache = shared.cache(conn_id)?;
        let count = match query {
            AttrQuery::Characteristics(range) => cache
                .characteristics
                .keys()
                .filter(|h| range.contains(**h))
                .count(),
            AttrQuery::Descriptors { range, char_handle } => cache
                .characteristics
                .get(&char_handle)
                .map(|c| {
                    c.descriptors
                        .iter()
                        .filter(|d| range.contains(d.handle))
                        .count()
                })
                .unwrap_or(0),
        };
        Ok(u16::try_from(count).unwrap_or(u16::MAX))
    }

    fn all_characteristics(
        &self,
        _transport: TransportId,
        conn_id: ConnId,
        range: HandleRange,
    ) -> StackResult<Vec<CharElement>> {
        let shared = self.shared();
        Ok(shared
            .cache(conn_id)?
            .characteristics
            .values()
            .filter(|c| range.contains(c.element.handle))
            .map(|c| c.element.clone())
            .collect())
    }

    fn all_descriptors(
        &self,
        _transport: TransportId,
        conn_id: ConnId,
        char_handle: Handle,
    ) -> StackResult<Vec<DescrElement>> {
        let shared = self.shared();
        Ok(shared
            .cache(conn_id)?
            .characteristics
            .get(&char_handle)
            .map(|c| c.descriptors.clone())
            .unwrap_or_default())
    }

    fn read_char(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
    ) -> StackResult<()> {
        let characteristic = self.shared().characteristic(conn_id, handle)?;
        let events = self.sender();
        tokio::spawn(async move {
            let (status, value) = match characteristic.read().await {
                Ok(value) => (GattStatus::OK, value),
                Err(e) => {
                    warn!(handle, "Read failed: {e}");
                    (GattStatus::READ_NOT_PERMIT, Vec::new())
                }
            };
            events.gattc(
                transport,
                GattcEvent::ReadChar {
                    status,
                    conn_id,
                    handle,
                    value,
                },
            );
        });
        Ok(())
    }

    fn write_char(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
        value: &[u8],
        write_type: WriteType,
    ) -> StackResult<()> {
        let characteristic = self.shared().characteristic(conn_id, handle)?;
        let events = self.sender();
        let value = value.to_vec();
        let request = CharacteristicWriteRequest {
            op_type: match write_type {
                WriteType::NoResponse => WriteOp::Command,
                WriteType::WithResponse => WriteOp::Request,
            },
            ..Default::default()
        };
        tokio::spawn(async move {
            let status = match characteristic.write_ext(&value, &request).await {
                Ok(()) => GattStatus::OK,
                Err(e) => {
                    warn!(handle, "Write failed: {e}");
                    GattStatus::WRITE_NOT_PERMIT
                }
            };
            events.gattc(
                transport,
                GattcEvent::WriteChar {
                    status,
                    conn_id,
                    handle,
                },
            );
        });
        Ok(())
    }

    fn register_for_notify(
        &mut self,
        transport: TransportId,
        addr: PeerAddress,
        handle: Handle,
    ) -> StackResult<()> {
        let (conn_id, characteristic) = {
            let shared = self.shared();
            let conn_id = shared
                .links
                .iter()
                .find(|(_, l)| l.addr == addr)
                .map(|(id, _)| *id)
                .ok_or(StackError::Rejected {
                    op: "register_for_notify",
                    status: GattStatus::NOT_FOUND,
                })?;
            (conn_id, shared.characteristic(conn_id, handle)?)
        };
        let events = self.sender();

        tokio::spawn(async move {
            let stream = match characteristic.notify().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(handle, "Subscribing failed: {e}");
                    events.gattc(
                        transport,
                        GattcEvent::RegisteredForNotify {
                            status: GattStatus::ERROR,
                            handle,
                        },
                    );
                    return;
                }
            };
            events.gattc(
                transport,
                GattcEvent::RegisteredForNotify {
                    status: GattStatus::OK,
                    handle,
                },
            );

            pin_mut!(stream);
            while let Some(value) = stream.next().await {
                events.gattc(
                    transport,
                    GattcEvent::Notify {
                        conn_id,
                        handle,
                        value,
                        is_notify: true,
                    },
                );
            }
            debug!(handle, "Notification stream ended");
        });
        Ok(())
    }
}
