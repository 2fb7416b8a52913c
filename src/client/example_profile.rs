//! Profile for the example service served by the companion peripheral

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::{
    client::profile::{ProfileCallback, ProfileLink, ProfileSlot},
    core::{
        types::{BtUuid, ConnId, GattStatus, Handle, PeerAddress, ProfileId},
        uuids::EXAMPLE_SERVICE_UUID,
    },
};

/// Profile id of the example profile
pub const EXAMPLE_PROFILE_ID: ProfileId = 0;

/// Last value read through a profile, shared with whoever wants to look at it
pub type LastRead = Arc<Mutex<Option<Vec<u8>>>>;

/// Logs everything and remembers the last value read
#[derive(Debug, Default)]
pub struct ExampleProfile {
    last_read: LastRead,
}

impl ExampleProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle observing the last successfully read value
    pub fn last_read(&self) -> LastRead {
        Arc::clone(&self.last_read)
    }
}

impl ProfileCallback for ExampleProfile {
    fn on_connect(&mut self, link: &mut ProfileLink<'_>, conn_id: ConnId, peer: PeerAddress) {
        info!(profile = link.profile(), conn_id, %peer, "Example profile connected");
    }

    fn on_disconnect(&mut self, link: &mut ProfileLink<'_>, reason: u16) {
        info!(profile = link.profile(), reason, "Example profile disconnected");
    }

    fn on_search_complete(&mut self, link: &mut ProfileLink<'_>) {
        let notifying: Vec<Handle> = link
            .characteristics()
            .iter()
            .filter(|c| c.properties.can_notify())
            .map(|c| c.handle)
            .collect();
        info!(
            profile = link.profile(),
            characteristics = link.characteristics().len(),
            "Example service ready"
        );
        for handle in notifying {
            if let Err(e) = link.register_for_notify(handle) {
                warn!(handle, "Notification registration failed: {e}");
            }
        }
    }

    fn on_read(&mut self, _link: &mut ProfileLink<'_>, handle: Handle, status: GattStatus, value: &[u8]) {
        if !status.is_ok() {
            warn!(handle, %status, "Read failed");
            return;
        }
        info!(
            handle,
            value = %hex::encode(value),
            text = %String::from_utf8_lossy(value),
            "Read value"
        );
        if let Ok(mut last) = self.last_read.lock() {
            *last = Some(value.to_vec());
        }
    }

    fn on_write(&mut self, _link: &mut ProfileLink<'_>, handle: Handle, status: GattStatus) {
        if status.is_ok() {
            debug!(handle, "Write done");
        } else {
            warn!(handle, %status, "Write failed");
        }
    }

    fn on_notify(&mut self, _link: &mut ProfileLink<'_>, handle: Handle, value: &[u8]) {
        info!(handle, value = %hex::encode(value), "Notification");
    }
}

/// Profile table the client runs with
pub fn registry() -> (Vec<ProfileSlot>, LastRead) {
    let profile = ExampleProfile::new();
    let last_read = profile.last_read();
    let slot = ProfileSlot::new(
        EXAMPLE_PROFILE_ID,
        BtUuid::Uuid128(EXAMPLE_SERVICE_UUID),
        true,
        Box::new(profile),
    );
    (vec![slot], last_read)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::engine::{DiscoveryEngine, EngineConfig, test_support},
        core::types::{CharProperties, HandleRange, SlotState, TransportId},
        stack::{GattcEvent, MockCharacteristic, MockService, MockStack, StackCall, StackEvent},
    };

    #[test]
    fn test_registry_targets_example_service() {
        let (slots, _) = registry();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id(), EXAMPLE_PROFILE_ID);
        assert_eq!(
            slots[0].service().uuid,
            BtUuid::Uuid128(EXAMPLE_SERVICE_UUID)
        );
        assert!(slots[0].service().primary);
        assert_eq!(slots[0].state(), SlotState::Unregistered);
    }

    #[test]
    fn test_remembers_last_read_and_subscribes() {
        let stack = MockStack::new();
        let mut notify_char = MockCharacteristic::new(14, BtUuid::Uuid16(0xff03));
        notify_char.properties = CharProperties(CharProperties::READ | CharProperties::NOTIFY);
        stack.add_service(MockService {
            uuid: BtUuid::Uuid128(EXAMPLE_SERVICE_UUID),
            range: HandleRange::new(10, 20),
            characteristics: vec![MockCharacteristic::new(12, BtUuid::Uuid16(0xff01)), notify_char],
        });

        let (slots, last_read) = registry();
        let mut engine = DiscoveryEngine::new(stack.clone(), slots, EngineConfig::default());
        engine.set_target_name("peer").unwrap();
        test_support::connect(&mut engine, "peer");

        let transport = test_support::TRANSPORT;
        let conn_id = test_support::CONN;
        let gattc = |event| StackEvent::Gattc { transport, event };
        engine.handle_event(gattc(GattcEvent::SearchResult {
            conn_id,
            uuid: BtUuid::Uuid128(EXAMPLE_SERVICE_UUID),
            start_handle: 10,
            end_handle: 20,
            inst_id: 0,
            primary: true,
        }));
        engine.handle_event(gattc(GattcEvent::SearchComplete {
            status: GattStatus::OK,
            conn_id,
        }));
        assert_eq!(
            stack.count(|c| *c
                == StackCall::RegisterForNotify {
                    transport: TransportId(3),
                    handle: 14
                }),
            1
        );

        engine.handle_event(gattc(GattcEvent::ReadChar {
            status: GattStatus::OK,
            conn_id,
            handle: 12,
            value: b"hello".to_vec(),
        }));
        assert_eq!(last_read.lock().unwrap().as_deref(), Some(&b"hello"[..]));

        engine.handle_event(gattc(GattcEvent::ReadChar {
            status: GattStatus::READ_NOT_PERMIT,
            conn_id,
            handle: 12,
            value: Vec::new(),
        }));
        assert_eq!(last_read.lock().unwrap().as_deref(), Some(&b"hello"[..]));
    }
}
