//! Service, characteristic and descriptor discovery

use tracing::{debug, error, info, warn};

use crate::{
    client::{engine::DiscoveryEngine, profile::ProfileSlot},
    core::{
        error::DiscoveryError,
        types::{
            BtUuid, CharacteristicRecord, ConnId, DescriptorRecord, GattStatus, Handle,
            HandleRange, SlotState, TransportId,
        },
    },
    stack::{AttrQuery, GattStack},
};

/// Handle range that can hold the descriptors of `chars[index]`
///
/// Runs from the handle after the characteristic up to the handle before the
/// next one, or up to the service end for the last characteristic. `chars`
/// must be sorted by handle. Returns `None` when the range is empty.
pub fn descriptor_range(
    chars: &[CharacteristicRecord],
    index: usize,
    service_end: Handle,
) -> Option<HandleRange> {
    let start = chars.get(index)?.handle.checked_add(1)?;
    let end = match chars.get(index + 1) {
        Some(next) => next.handle.checked_sub(1)?,
        None => service_end,
    };
    let range = HandleRange::new(start, end);
    (!range.is_empty()).then_some(range)
}

/// Fetch the characteristics within `range`, sorted by handle
pub fn populate_characteristics<S: GattStack + ?Sized>(
    stack: &S,
    transport: TransportId,
    conn_id: ConnId,
    range: HandleRange,
) -> Result<Vec<CharacteristicRecord>, DiscoveryError> {
    let count = stack
        .attr_count(transport, conn_id, AttrQuery::Characteristics(range))
        .map_err(|source| DiscoveryError::CharacteristicCount { range, source })?;
    if count == 0 {
        warn!(%range, "No characteristics in service");
        return Ok(Vec::new());
    }

    let mut elements = stack
        .all_characteristics(transport, conn_id, range)
        .map_err(|source| DiscoveryError::CharacteristicFetch { range, source })?;
    elements.truncate(usize::from(count));

    // the cache may hand them out of order
    let mut chars: Vec<_> = elements
        .into_iter()
        .map(|e| CharacteristicRecord {
            handle: e.handle,
            properties: e.properties,
            uuid: e.uuid,
            descriptors: Vec::new(),
        })
        .collect();
    chars.sort_by_key(|c| c.handle);
    Ok(chars)
}

/// Fill in the descriptors of every characteristic
///
/// Characteristics with an empty descriptor range are skipped without asking
/// the stack. On error, descriptors already attached to earlier
/// characteristics are kept.
pub fn populate_descriptors<S: GattStack + ?Sized>(
    stack: &S,
    transport: TransportId,
    conn_id: ConnId,
    chars: &mut [CharacteristicRecord],
    service_end: Handle,
) -> Result<(), DiscoveryError> {
    for index in 0..chars.len() {
        let handle = chars[index].handle;
        let Some(range) = descriptor_range(chars, index, service_end) else {
            debug!(handle, "No room for descriptors");
            continue;
        };

        let count = stack
            .attr_count(
                transport,
                conn_id,
                AttrQuery::Descriptors {
                    range,
                    char_handle: handle,
                },
            )
            .map_err(|source| DiscoveryError::DescriptorCount {
                handle,
                range,
                source,
            })?;
        if count == 0 {
            continue;
        }

        let mut elements = stack
            .all_descriptors(transport, conn_id, handle)
            .map_err(|source| DiscoveryError::DescriptorFetch { handle, source })?;
        elements.truncate(usize::from(count));
        chars[index].descriptors = elements
            .into_iter()
            .map(|d| DescriptorRecord {
                handle: d.handle,
                uuid: d.uuid,
            })
            .collect();
    }
    Ok(())
}

/// Log the discovered attribute table of a slot
pub fn log_profile_db(slot: &ProfileSlot) {
    let Some(range) = slot.range() else {
        return;
    };
    info!(
        profile = slot.id(),
        uuid = %slot.service().uuid,
        %range,
        "Service"
    );
    for c in slot.characteristics() {
        info!(
            handle = c.handle,
            uuid = %c.uuid,
            properties = c.properties.0,
            "  Characteristic"
        );
        for d in &c.descriptors {
            info!(handle = d.handle, uuid = %d.uuid, "    Descriptor");
        }
    }
}

impl<S: GattStack> DiscoveryEngine<S> {
    /// Stack finished its own discovery; search for every service
    pub(super) fn on_services_discovered(
        &mut self,
        index: usize,
        status: GattStatus,
        conn_id: ConnId,
    ) {
        let slot = &mut self.slots[index];
        if slot.state != SlotState::DiscoveringServices || !slot.on_connection(conn_id) {
            warn!(profile = slot.id, state = ?slot.state, "Unexpected discovery event, dropped");
            return;
        }
        if !status.is_ok() {
            error!(profile = slot.id, %status, "Service discovery failed");
            return;
        }
        let Some(transport) = slot.transport else {
            return;
        };
        slot.range = None;
        if let Err(e) = self.stack.search_service(transport, conn_id, None) {
            error!(conn_id, "Service search failed: {e}");
        }
    }

    /// Record the handle range of a matching service for every searching slot
    pub(super) fn on_search_result(
        &mut self,
        conn_id: ConnId,
        uuid: BtUuid,
        range: HandleRange,
        inst_id: u8,
    ) {
        for slot in self.searching(conn_id) {
            if !slot.service.uuid.matches(&uuid) {
                debug!(profile = slot.id, %uuid, %range, "Other service");
                continue;
            }
            info!(profile = slot.id, %uuid, %range, "Service found");
            slot.range = Some(range);
            slot.service.inst_id = inst_id;
        }
    }

    pub(super) fn on_search_complete(&mut self, status: GattStatus, conn_id: ConnId) {
        if !status.is_ok() {
            error!(conn_id, %status, "Service search failed");
            return;
        }
        let indices: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::DiscoveringServices && s.on_connection(conn_id))
            .map(|(i, _)| i)
            .collect();
        for index in indices {
            self.discover_attributes(index, conn_id);
        }
    }

    fn searching(&mut self, conn_id: ConnId) -> impl Iterator<Item = &mut ProfileSlot> {
        self.slots
            .iter_mut()
            .filter(move |s| s.state == SlotState::DiscoveringServices && s.on_connection(conn_id))
    }

    /// Characteristic then descriptor discovery for one slot
    fn discover_attributes(&mut self, index: usize, conn_id: ConnId) {
        let slot = &mut self.slots[index];
        let (Some(range), Some(transport)) = (slot.range, slot.transport) else {
            warn!(profile = slot.id, uuid = %slot.service.uuid, "Target service not found");
            return;
        };

        slot.set_state(SlotState::DiscoveringCharacteristics);
        slot.characteristics = match populate_characteristics(&self.stack, transport, conn_id, range)
        {
            Ok(chars) => chars,
            Err(e) => {
                error!(profile = slot.id, "{e}");
                return;
            }
        };

        slot.set_state(SlotState::DiscoveringDescriptors);
        if let Err(e) = populate_descriptors(
            &self.stack,
            transport,
            conn_id,
            &mut slot.characteristics,
            range.end,
        ) {
            error!(profile = slot.id, "{e}");
            return;
        }

        slot.set_state(SlotState::Ready);
        log_profile_db(slot);
        self.with_link(index, |cb, link| cb.on_search_complete(link));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        client::engine::test_support::*,
        core::types::CharProperties,
        stack::{MockCharacteristic, MockService, MockStack, StackCall},
    };

    fn record(handle: Handle) -> CharacteristicRecord {
        CharacteristicRecord {
            handle,
            properties: CharProperties(CharProperties::READ),
            uuid: BtUuid::Uuid16(0xff01),
            descriptors: Vec::new(),
        }
    }

    fn serve(stack: &MockStack, characteristics: Vec<MockCharacteristic>) {
        stack.add_service(MockService {
            uuid: SERVICE,
            range: HandleRange::new(10, 50),
            characteristics,
        });
    }

    #[test]
    fn test_descriptor_ranges() {
        let chars = vec![record(12), record(30)];
        assert_eq!(
            descriptor_range(&chars, 0, 50),
            Some(HandleRange::new(13, 29))
        );
        assert_eq!(
            descriptor_range(&chars, 1, 50),
            Some(HandleRange::new(31, 50))
        );
        assert_eq!(descriptor_range(&chars, 2, 50), None);
    }

    #[test]
    fn test_adjacent_handles_give_empty_range() {
        let chars = vec![record(12), record(13)];
        assert_eq!(descriptor_range(&chars, 0, 50), None);
        // last characteristic sitting on the service end
        assert_eq!(descriptor_range(&chars, 1, 13), None);
        assert_eq!(descriptor_range(&[record(u16::MAX)], 0, u16::MAX), None);
    }

    #[test]
    fn test_characteristics_sorted_by_handle() {
        let stack = MockStack::new();
        serve(
            &stack,
            vec![
                MockCharacteristic::new(30, BtUuid::Uuid16(0xff02)),
                MockCharacteristic::new(12, BtUuid::Uuid16(0xff01)),
            ],
        );
        let chars =
            populate_characteristics(&stack, TRANSPORT, CONN, HandleRange::new(10, 50)).unwrap();
        let handles: Vec<_> = chars.iter().map(|c| c.handle).collect();
        assert_eq!(handles, vec![12, 30]);
    }

    #[test]
    fn test_empty_descriptor_range_skips_stack() {
        let stack = MockStack::new();
        let mut chars = vec![record(12), record(13)];
        populate_descriptors(&stack, TRANSPORT, CONN, &mut chars, 13).unwrap();
        assert!(stack.calls().is_empty());
    }

    #[test]
    fn test_full_discovery_pipeline() {
        let stack = MockStack::new();
        serve(
            &stack,
            vec![
                MockCharacteristic::new(30, BtUuid::Uuid16(0xff02))
                    .with_descriptor(31, BtUuid::Uuid16(0x2901)),
                MockCharacteristic::new(12, BtUuid::Uuid16(0xff01))
                    .with_descriptor(13, BtUuid::Uuid16(0x2901)),
            ],
        );
        let (mut engine, recorder) = engine(&stack);
        engine.set_target_name("peer").unwrap();
        connect(&mut engine, "peer");
        stack.clear_calls();
        complete_search(&mut engine, HandleRange::new(10, 50));

        let slot = engine.slot(0).unwrap();
        assert_eq!(slot.state(), SlotState::Ready);
        assert_eq!(slot.range(), Some(HandleRange::new(10, 50)));
        let handles: Vec<_> = slot.characteristics().iter().map(|c| c.handle).collect();
        assert_eq!(handles, vec![12, 30]);
        assert_eq!(slot.characteristics()[0].descriptors[0].handle, 13);
        assert_eq!(slot.characteristics()[1].descriptors[0].handle, 31);

        let descriptor_queries: Vec<_> = stack
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StackCall::AttrCount(AttrQuery::Descriptors { range, char_handle }) => {
                    Some((char_handle, range))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            descriptor_queries,
            vec![
                (12, HandleRange::new(13, 29)),
                (30, HandleRange::new(31, 50))
            ]
        );
        assert_eq!(
            recorder.seen().last(),
            Some(&Seen::SearchComplete { characteristics: 2 })
        );
    }

    #[test]
    fn test_other_services_ignored() {
        let stack = MockStack::new();
        let (mut engine, recorder) = engine(&stack);
        engine.set_target_name("peer").unwrap();
        connect(&mut engine, "peer");

        engine.handle_event(gattc(crate::stack::GattcEvent::SearchResult {
            conn_id: CONN,
            uuid: BtUuid::Uuid16(0x1801),
            start_handle: 1,
            end_handle: 5,
            inst_id: 0,
            primary: true,
        }));
        engine.handle_event(gattc(crate::stack::GattcEvent::SearchComplete {
            status: GattStatus::OK,
            conn_id: CONN,
        }));

        let slot = engine.slot(0).unwrap();
        assert_eq!(slot.range(), None);
        assert_eq!(slot.state(), SlotState::DiscoveringServices);
        assert!(!recorder
            .seen()
            .iter()
            .any(|s| matches!(s, Seen::SearchComplete { .. })));
    }

    #[test]
    fn test_service_match_on_expanded_uuid() {
        let stack = MockStack::new();
        let (mut engine, _) = engine(&stack);
        engine.set_target_name("peer").unwrap();
        connect(&mut engine, "peer");

        engine.handle_event(gattc(crate::stack::GattcEvent::SearchResult {
            conn_id: CONN,
            uuid: BtUuid::Uuid128(SERVICE.to_uuid128()),
            start_handle: 40,
            end_handle: 48,
            inst_id: 2,
            primary: true,
        }));
        let slot = engine.slot(0).unwrap();
        assert_eq!(slot.range(), Some(HandleRange::new(40, 48)));
        assert_eq!(slot.service().inst_id, 2);
    }

    #[test]
    fn test_characteristic_failure_halts_slot() {
        let stack = MockStack::new();
        serve(&stack, vec![MockCharacteristic::new(12, BtUuid::Uuid16(0xff01))]);
        stack.set_failure("all_characteristics", true);
        let (mut engine, recorder) = engine(&stack);
        engine.set_target_name("peer").unwrap();
        connect(&mut engine, "peer");
        complete_search(&mut engine, HandleRange::new(10, 50));

        let slot = engine.slot(0).unwrap();
        assert_eq!(slot.state(), SlotState::DiscoveringCharacteristics);
        assert!(slot.characteristics().is_empty());
        assert_eq!(stack.count(|c| matches!(c, StackCall::AllDescriptors(_))), 0);
        assert!(!recorder
            .seen()
            .iter()
            .any(|s| matches!(s, Seen::SearchComplete { .. })));
    }

    #[test]
    fn test_descriptor_failure_keeps_characteristics() {
        let stack = MockStack::new();
        serve(
            &stack,
            vec![MockCharacteristic::new(12, BtUuid::Uuid16(0xff01))
                .with_descriptor(13, BtUuid::Uuid16(0x2901))],
        );
        stack.set_failure("descr_count", true);
        let (mut engine, _) = engine(&stack);
        engine.set_target_name("peer").unwrap();
        connect(&mut engine, "peer");
        complete_search(&mut engine, HandleRange::new(10, 50));

        let slot = engine.slot(0).unwrap();
        assert_eq!(slot.state(), SlotState::DiscoveringDescriptors);
        assert_eq!(slot.characteristics().len(), 1);
        assert!(slot.characteristics()[0].descriptors.is_empty());
    }

    fn search_result(uuid: BtUuid, range: HandleRange) -> crate::stack::StackEvent {
        gattc(crate::stack::GattcEvent::SearchResult {
            conn_id: CONN,
            uuid,
            start_handle: range.start,
            end_handle: range.end,
            inst_id: 0,
            primary: true,
        })
    }

    fn search_complete() -> crate::stack::StackEvent {
        gattc(crate::stack::GattcEvent::SearchComplete {
            status: GattStatus::OK,
            conn_id: CONN,
        })
    }

    #[test]
    fn test_profiles_sharing_link_all_discovered() {
        let stack = MockStack::new();
        serve(&stack, vec![MockCharacteristic::new(12, BtUuid::Uuid16(0xff01))]);
        stack.add_service(MockService {
            uuid: SECOND_SERVICE,
            range: HandleRange::new(60, 70),
            characteristics: vec![MockCharacteristic::new(62, BtUuid::Uuid16(0x2a19))
                .with_descriptor(63, BtUuid::Uuid16(0x2902))],
        });
        let (mut engine, first, second) = two_profile_engine(&stack);
        engine.set_target_name("peer").unwrap();
        register_second(&mut engine);
        connect(&mut engine, "peer");

        // only the first profile opened the link
        assert_eq!(stack.count(|c| matches!(c, StackCall::Open { .. })), 1);
        assert_eq!(
            second.seen(),
            vec![Seen::Connect {
                conn_id: CONN,
                stamped: false
            }]
        );

        engine.handle_event(search_result(SERVICE, HandleRange::new(10, 50)));
        engine.handle_event(search_result(SECOND_SERVICE, HandleRange::new(60, 70)));
        engine.handle_event(search_complete());

        let slot = engine.slot(0).unwrap();
        assert_eq!(slot.state(), SlotState::Ready);
        assert_eq!(slot.range(), Some(HandleRange::new(10, 50)));
        assert_eq!(slot.characteristics().len(), 1);

        let slot = engine.slot(1).unwrap();
        assert_eq!(slot.state(), SlotState::Ready);
        assert_eq!(slot.range(), Some(HandleRange::new(60, 70)));
        assert_eq!(slot.connection().map(|c| c.conn_id), Some(CONN));
        assert_eq!(slot.characteristics()[0].handle, 62);
        assert_eq!(slot.characteristics()[0].descriptors[0].handle, 63);

        assert_eq!(
            first.seen().last(),
            Some(&Seen::SearchComplete { characteristics: 1 })
        );
        assert_eq!(
            second.seen().last(),
            Some(&Seen::SearchComplete { characteristics: 1 })
        );

        // the second profile talks over its own transport on the shared link
        engine.read(1, 0).unwrap();
        assert_eq!(
            stack.count(|c| *c
                == StackCall::ReadChar {
                    transport: SECOND_TRANSPORT,
                    conn_id: CONN,
                    handle: 62
                }),
            1
        );
    }

    #[test]
    fn test_search_result_matching_no_profile() {
        let stack = MockStack::new();
        let (mut engine, first, second) = two_profile_engine(&stack);
        engine.set_target_name("peer").unwrap();
        register_second(&mut engine);
        connect(&mut engine, "peer");

        engine.handle_event(search_result(BtUuid::Uuid16(0x1801), HandleRange::new(1, 5)));
        engine.handle_event(search_complete());

        for id in 0..2 {
            let slot = engine.slot(id).unwrap();
            assert_eq!(slot.range(), None);
            assert_eq!(slot.state(), SlotState::DiscoveringServices);
        }
        for recorder in [first, second] {
            assert!(!recorder
                .seen()
                .iter()
                .any(|s| matches!(s, Seen::SearchComplete { .. })));
        }
        assert_eq!(stack.count(|c| matches!(c, StackCall::AttrCount(_))), 0);
    }

    #[test]
    fn test_unregistered_profile_not_put_on_link() {
        let stack = MockStack::new();
        let (mut engine, _, second) = two_profile_engine(&stack);
        engine.set_target_name("peer").unwrap();
        connect(&mut engine, "peer");

        let slot = engine.slot(1).unwrap();
        assert_eq!(slot.state(), SlotState::Unregistered);
        assert_eq!(slot.connection(), None);
        assert!(second.seen().is_empty());
    }
}
