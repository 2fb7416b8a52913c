//! Read and write access to discovered characteristics

use tracing::debug;

use crate::{
    client::engine::DiscoveryEngine,
    core::{
        error::{ClientError, ClientResult},
        types::{Connection, Handle, ProfileId, SlotState, TransportId, WriteType},
    },
    stack::GattStack,
};

impl<S: GattStack> DiscoveryEngine<S> {
    /// Resolve `(profile, index)` to a characteristic of a ready slot
    fn target(
        &self,
        profile: ProfileId,
        index: usize,
    ) -> ClientResult<(TransportId, Connection, Handle)> {
        let slot = self
            .slots
            .get(profile)
            .ok_or(ClientError::InvalidProfile(profile))?;

        let not_ready = ClientError::NotReady {
            profile,
            state: slot.state,
        };
        if slot.state != SlotState::Ready {
            return Err(not_ready);
        }
        let (Some(transport), Some(connection)) = (slot.transport, slot.connection) else {
            return Err(not_ready);
        };

        let characteristic =
            slot.characteristics
                .get(index)
                .ok_or(ClientError::InvalidCharacteristic {
                    profile,
                    index,
                    available: slot.characteristics.len(),
                })?;
        Ok((transport, connection, characteristic.handle))
    }

    /// Read characteristic `index` of `profile`
    ///
    /// The value arrives later through the profile's `on_read`.
    pub fn read(&mut self, profile: ProfileId, index: usize) -> ClientResult<()> {
        let (transport, connection, handle) = self.target(profile, index)?;
        debug!(profile, index, handle, "Read request");
        self.stack
            .read_char(transport, connection.conn_id, handle)?;
        Ok(())
    }

    /// Write `value` to characteristic `index` of `profile` without response
    pub fn write(&mut self, profile: ProfileId, index: usize, value: &[u8]) -> ClientResult<()> {
        let (transport, connection, handle) = self.target(profile, index)?;
        debug!(profile, index, handle, value = %hex::encode(value), "Write request");
        self.stack.write_char(
            transport,
            connection.conn_id,
            handle,
            value,
            WriteType::NoResponse,
        )?;
        Ok(())
    }
}
