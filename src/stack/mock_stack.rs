//! Mock Bluetooth stack for testing

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::error::{StackError, StackResult};
use crate::core::types::{
    AddressType, BtUuid, CharProperties, ConnId, GattStatus, Handle, HandleRange, PeerAddress,
    ProfileId, ScanParams, TransportId, WriteType,
};
use crate::stack::{AttrQuery, CharElement, DescrElement, GattStack};

/// Request recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackCall {
    Enable,
    RegisterApp(ProfileId),
    SetLocalMtu(u16),
    SetScanParams(ScanParams),
    StartScanning(u32),
    StopScanning,
    Open {
        transport: TransportId,
        addr: PeerAddress,
    },
    RequestMtu {
        transport: TransportId,
        conn_id: ConnId,
    },
    SearchService {
        transport: TransportId,
        conn_id: ConnId,
    },
    AttrCount(AttrQuery),
    AllCharacteristics(HandleRange),
    AllDescriptors(Handle),
    ReadChar {
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
    },
    WriteChar {
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
        value: Vec<u8>,
        write_type: WriteType,
    },
    RegisterForNotify {
        transport: TransportId,
        handle: Handle,
    },
}

/// Characteristic served by the mock attribute cache
#[derive(Debug, Clone)]
pub struct MockCharacteristic {
    pub handle: Handle,
    pub properties: CharProperties,
    pub uuid: BtUuid,
    pub descriptors: Vec<DescrElement>,
}

impl MockCharacteristic {
    pub fn new(handle: Handle, uuid: BtUuid) -> Self {
        Self {
            handle,
            properties: CharProperties(CharProperties::READ | CharProperties::WRITE),
            uuid,
            descriptors: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, handle: Handle, uuid: BtUuid) -> Self {
        self.descriptors.push(DescrElement { handle, uuid });
        self
    }
}

/// Service served by the mock attribute cache
#[derive(Debug, Clone)]
pub struct MockService {
    pub uuid: BtUuid,
    pub range: HandleRange,
    /// Kept in insertion order so tests can serve characteristics unsorted
    pub characteristics: Vec<MockCharacteristic>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<StackCall>,
    services: Vec<MockService>,
    failing: Vec<&'static str>,
}

/// Mock stack recording every request
///
/// Cloning shares state, so a test keeps one clone for inspection while the
/// engine owns the other. Completion events are not generated; tests feed
/// them to the engine explicitly.
#[derive(Debug, Clone, Default)]
pub struct MockStack {
    inner: Arc<Mutex<MockState>>,
}

impl MockStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }

    /// Add a service to the attribute cache
    pub fn add_service(&self, service: MockService) {
        self.state().services.push(service);
    }

    /// Make requests named `op` fail immediately
    pub fn set_failure(&self, op: &'static str, should_fail: bool) {
        let mut state = self.state();
        state.failing.retain(|o| *o != op);
        if should_fail {
            state.failing.push(op);
        }
    }

    /// All requests recorded so far
    pub fn calls(&self) -> Vec<StackCall> {
        self.state().calls.clone()
    }

    /// Number of recorded requests matching `pred`
    pub fn count(&self, pred: impl Fn(&StackCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn record(&self, op: &'static str, call: StackCall) -> StackResult<()> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failing.contains(&op) {
            Err(StackError::Rejected {
                op,
                status: GattStatus::ERROR,
            })
        } else {
            Ok(())
        }
    }

    fn find_characteristic(&self, handle: Handle) -> Option<MockCharacteristic> {
        self.state()
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.handle == handle)
            .cloned()
    }
}

impl GattStack for MockStack {
    fn enable(&mut self) -> StackResult<()> {
        self.record("enable", StackCall::Enable)
    }

    fn register_app(&mut self, app_id: ProfileId) -> StackResult<()> {
        self.record("register_app", StackCall::RegisterApp(app_id))
    }

    fn set_local_mtu(&mut self, mtu: u16) -> StackResult<()> {
        self.record("set_local_mtu", StackCall::SetLocalMtu(mtu))
    }

    fn set_scan_params(&mut self, params: &ScanParams) -> StackResult<()> {
        self.record("set_scan_params", StackCall::SetScanParams(*params))
    }

    fn start_scanning(&mut self, duration_secs: u32) -> StackResult<()> {
        self.record("start_scanning", StackCall::StartScanning(duration_secs))
    }

    fn stop_scanning(&mut self) -> StackResult<()> {
        self.record("stop_scanning", StackCall::StopScanning)
    }

    fn open(
        &mut self,
        transport: TransportId,
        addr: PeerAddress,
        _addr_type: AddressType,
        _direct: bool,
    ) -> StackResult<()> {
        self.record("open", StackCall::Open { transport, addr })
    }

    fn request_mtu(&mut self, transport: TransportId, conn_id: ConnId) -> StackResult<()> {
        self.record("request_mtu", StackCall::RequestMtu { transport, conn_id })
    }

    fn search_service(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        _filter: Option<BtUuid>,
    ) -> StackResult<()> {
        self.record(
            "search_service",
            StackCall::SearchService { transport, conn_id },
        )
    }

    fn attr_count(
        &self,
        _transport: TransportId,
        _conn_id: ConnId,
        query: AttrQuery,
    ) -> StackResult<u16> {
        match query {
            AttrQuery::Characteristics(range) => {
                self.record("char_count", StackCall::AttrCount(query))?;
                let count = self
                    .state()
                    .services
                    .iter()
                    .flat_map(|s| s.characteristics.iter())
                    .filter(|c| range.contains(c.handle))
                    .count();
                Ok(count as u16)
            }
            AttrQuery::Descriptors { range, char_handle } => {
                self.record("descr_count", StackCall::AttrCount(query))?;
                let count = self
                    .find_characteristic(char_handle)
                    .map(|c| {
                        c.descriptors
                            .iter()
                            .filter(|d| range.contains(d.handle))
                            .count()
                    })
                    .unwrap_or(0);
                Ok(count as u16)
            }
        }
    }

    fn all_characteristics(
        &self,
        _transport: TransportId,
        _conn_id: ConnId,
        range: HandleRange,
    ) -> StackResult<Vec<CharElement>> {
        self.record("all_characteristics", StackCall::AllCharacteristics(range))?;
        Ok(self
            .state()
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .filter(|c| range.contains(c.handle))
            .map(|c| CharElement {
                handle: c.handle,
                properties: c.properties,
                uuid: c.uuid,
            })
            .collect())
    }

    fn all_descriptors(
        &self,
        _transport: TransportId,
        _conn_id: ConnId,
        char_handle: Handle,
    ) -> StackResult<Vec<DescrElement>> {
        self.record("all_descriptors", StackCall::AllDescriptors(char_handle))?;
        Ok(self
            .find_characteristic(char_handle)
            .map(|c| c.descriptors)
            .unwrap_or_default())
    }

    fn read_char(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
    ) -> StackResult<()> {
        self.record(
            "read_char",
            StackCall::ReadChar {
                transport,
                conn_id,
                handle,
            },
        )
    }

    fn write_char(
        &mut self,
        transport: TransportId,
        conn_id: ConnId,
        handle: Handle,
        value: &[u8],
        write_type: WriteType,
    ) -> StackResult<()> {
        self.record(
            "write_char",
            StackCall::WriteChar {
                transport,
                conn_id,
                handle,
                value: value.to_vec(),
                write_type,
            },
        )
    }

    fn register_for_notify(
        &mut self,
        transport: TransportId,
        _addr: PeerAddress,
        handle: Handle,
    ) -> StackResult<()> {
        self.record(
            "register_for_notify",
            StackCall::RegisterForNotify { transport, handle },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_and_fails() {
        let mut stack = MockStack::new();
        stack.enable().unwrap();
        stack.set_failure("register_app", true);
        assert!(stack.register_app(0).is_err());
        assert_eq!(
            stack.calls(),
            vec![StackCall::Enable, StackCall::RegisterApp(0)]
        );

        stack.set_failure("register_app", false);
        assert!(stack.register_app(0).is_ok());
    }

    #[test]
    fn test_mock_serves_unsorted_characteristics() {
        let stack = MockStack::new();
        stack.add_service(MockService {
            uuid: BtUuid::Uuid16(0x180f),
            range: HandleRange::new(10, 50),
            characteristics: vec![
                MockCharacteristic::new(30, BtUuid::Uuid16(0x2a19)),
                MockCharacteristic::new(12, BtUuid::Uuid16(0x2a1a)),
            ],
        });

        let range = HandleRange::new(10, 50);
        let t = TransportId(3);
        assert_eq!(
            stack
                .attr_count(t, 0, AttrQuery::Characteristics(range))
                .unwrap(),
            2
        );
        let handles: Vec<_> = stack
            .all_characteristics(t, 0, range)
            .unwrap()
            .iter()
            .map(|c| c.handle)
            .collect();
        assert_eq!(handles, vec![30, 12]);
    }
}
