//! Request handlers of the example service

use std::sync::Arc;

use bluer::gatt::local::ReqError;
use tracing::{debug, warn};

use crate::{core::error::TransportError, server::value_store::ValueStore};

/// Handles reads and writes arriving at the example service
pub struct CharacteristicHandler<V: ValueStore> {
    store: Arc<V>,
}

impl<V: ValueStore> CharacteristicHandler<V> {
    pub fn new(store: Arc<V>) -> Self {
        Self { store }
    }

    fn req_error(err: TransportError) -> ReqError {
        match err {
            TransportError::ValueTooLong { .. } => ReqError::InvalidValueLength,
            TransportError::InvalidOffset { .. } => ReqError::InvalidOffset,
            _ => ReqError::Failed,
        }
    }

    /// Write to the write-only characteristic
    pub async fn handle_value_write(&self, value: Vec<u8>, offset: u16) -> Result<(), ReqError> {
        debug!(
            offset,
            len = value.len(),
            value = %hex::encode(&value),
            "Value write received"
        );
        self.store
            .write(usize::from(offset), &value)
            .await
            .map_err(|e| {
                warn!("Value write rejected: {e}");
                Self::req_error(e)
            })
    }

    /// Read of the read-only characteristic
    pub async fn handle_value_read(&self, offset: u16) -> Result<Vec<u8>, ReqError> {
        let value = self
            .store
            .read(usize::from(offset))
            .await
            .map_err(|e| {
                warn!("Value read rejected: {e}");
                Self::req_error(e)
            })?;
        debug!(offset, len = value.len(), "Value read");
        Ok(value)
    }
}

/// Read of a constant descriptor text
pub fn descriptor_read(text: &str, offset: u16) -> Result<Vec<u8>, ReqError> {
    text.as_bytes()
        .get(usize::from(offset)..)
        .map(<[u8]>::to_vec)
        .ok_or(ReqError::InvalidOffset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::uuids::{MAX_VALUE_LEN, READ_DESCRIPTOR_TEXT, WRITE_DESCRIPTOR_TEXT},
        server::value_store::MemoryValueStore,
    };

    fn create_test_handler() -> CharacteristicHandler<MemoryValueStore> {
        CharacteristicHandler::new(Arc::new(MemoryValueStore::new()))
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let handler = create_test_handler();
        handler.handle_value_write(b"led on".to_vec(), 0).await.unwrap();
        assert_eq!(handler.handle_value_read(0).await.unwrap(), b"led on");
    }

    #[tokio::test]
    async fn test_read_empty_value() {
        let handler = create_test_handler();
        assert!(handler.handle_value_read(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_write_rejected() {
        let handler = create_test_handler();
        let result = handler
            .handle_value_write(vec![0; MAX_VALUE_LEN + 1], 0)
            .await;
        assert!(matches!(result, Err(ReqError::InvalidValueLength)));
    }

    #[tokio::test]
    async fn test_read_offset_beyond_value_rejected() {
        let handler = create_test_handler();
        handler.handle_value_write(b"abc".to_vec(), 0).await.unwrap();
        assert_eq!(handler.handle_value_read(1).await.unwrap(), b"bc");
        assert!(matches!(
            handler.handle_value_read(4).await,
            Err(ReqError::InvalidOffset)
        ));
    }

    #[test]
    fn test_descriptor_texts() {
        assert_eq!(
            descriptor_read(WRITE_DESCRIPTOR_TEXT, 0).unwrap(),
            b"Write only property"
        );
        assert_eq!(
            descriptor_read(READ_DESCRIPTOR_TEXT, 5).unwrap(),
            b"only property"
        );
        assert!(matches!(
            descriptor_read(READ_DESCRIPTOR_TEXT, 200),
            Err(ReqError::InvalidOffset)
        ));
    }
}
