//! Storage behind the example service's characteristics

use std::sync::Arc;

use tokio::sync::RwLock;
use trait_variant::make;

use crate::core::{
    error::{TransportError, TransportResult},
    uuids::MAX_VALUE_LEN,
};

/// Value shared by the write and read characteristics
///
/// Implementations decide where the bytes live; the GATT handlers only
/// translate their errors into ATT error codes.
#[make(Send)]
pub trait ValueStore: Sync + 'static {
    /// Bytes of the value starting at `offset`
    ///
    /// An offset equal to the length yields an empty value; anything beyond
    /// is an error.
    async fn read(&self, offset: usize) -> TransportResult<Vec<u8>>;

    /// Replace the value from `offset` on with `data`
    ///
    /// Offset zero replaces the whole value. A non-zero offset continues a
    /// long write and must not lie beyond the current value.
    async fn write(&self, offset: usize, data: &[u8]) -> TransportResult<()>;
}

/// In-memory value store with a fixed capacity
#[derive(Debug, Clone)]
pub struct MemoryValueStore {
    value: Arc<RwLock<Vec<u8>>>,
    capacity: usize,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_VALUE_LEN)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            value: Arc::new(RwLock::new(Vec::new())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueStore for MemoryValueStore {
    async fn read(&self, offset: usize) -> TransportResult<Vec<u8>> {
        let value = self.value.read().await;
        value
            .get(offset..)
            .map(<[u8]>::to_vec)
            .ok_or(TransportError::InvalidOffset {
                offset,
                len: value.len(),
            })
    }

    async fn write(&self, offset: usize, data: &[u8]) -> TransportResult<()> {
        let mut value = self.value.write().await;
        if offset > value.len() {
            return Err(TransportError::InvalidOffset {
                offset,
                len: value.len(),
            });
        }
        let len = offset + data.len();
        if len > self.capacity {
            return Err(TransportError::ValueTooLong {
                len,
                capacity: self.capacity,
            });
        }
        value.truncate(offset);
        value.extend_from_slice(data);
        Ok(())
    }
}
