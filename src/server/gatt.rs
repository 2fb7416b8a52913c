//! GATT application of the companion peripheral

use std::sync::Arc;

use bluer::{
    Adapter,
    gatt::local::{
        Application, ApplicationHandle, Characteristic, CharacteristicRead, CharacteristicWrite,
        CharacteristicWriteMethod, Descriptor, DescriptorRead, Service,
    },
};
use tracing::info;

use crate::{
    core::uuids::{
        EXAMPLE_READ_CHAR_UUID, EXAMPLE_READ_DESCRIPTOR_UUID, EXAMPLE_SERVICE_UUID,
        EXAMPLE_WRITE_CHAR_UUID, EXAMPLE_WRITE_DESCRIPTOR_UUID, READ_DESCRIPTOR_TEXT,
        WRITE_DESCRIPTOR_TEXT,
    },
    server::{
        characteristics::{CharacteristicHandler, descriptor_read},
        value_store::ValueStore,
    },
};

/// GATT server exposing the example service
pub struct GattServer<V: ValueStore> {
    handler: Arc<CharacteristicHandler<V>>,
}

impl<V: ValueStore> GattServer<V> {
    pub fn new(store: Arc<V>) -> Self {
        Self {
            handler: Arc::new(CharacteristicHandler::new(store)),
        }
    }

    /// Build the GATT application
    pub fn build_application(&self) -> Application {
        Application {
            services: vec![self.build_example_service()],
            ..Default::default()
        }
    }

    fn build_example_service(&self) -> Service {
        let handler = self.handler.clone();
        Service {
            uuid: EXAMPLE_SERVICE_UUID,
            primary: true,
            characteristics: vec![
                // write-only value
                Characteristic {
                    uuid: EXAMPLE_WRITE_CHAR_UUID,
                    write: Some(CharacteristicWrite {
                        write: true,
                        write_without_response: true,
                        method: CharacteristicWriteMethod::Fun({
                            let handler = handler.clone();
                            Box::new(move |new_value, req| {
                                let handler = handler.clone();
                                Box::pin(async move {
                                    handler.handle_value_write(new_value, req.offset).await
                                })
                            })
                        }),
                        ..Default::default()
                    }),
                    descriptors: vec![text_descriptor(
                        EXAMPLE_WRITE_DESCRIPTOR_UUID,
                        WRITE_DESCRIPTOR_TEXT,
                    )],
                    ..Default::default()
                },
                // read-only view of the same value
                Characteristic {
                    uuid: EXAMPLE_READ_CHAR_UUID,
                    read: Some(CharacteristicRead {
                        read: true,
                        fun: {
                            let handler = handler.clone();
                            Box::new(move |req| {
                                let handler = handler.clone();
                                Box::pin(async move { handler.handle_value_read(req.offset).await })
                            })
                        },
                        ..Default::default()
                    }),
                    descriptors: vec![text_descriptor(
                        EXAMPLE_READ_DESCRIPTOR_UUID,
                        READ_DESCRIPTOR_TEXT,
                    )],
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    /// Register the application; it stays registered while the handle lives
    pub async fn register(&self, adapter: &Adapter) -> Result<ApplicationHandle, bluer::Error> {
        info!("Registering GATT application");
        let handle = adapter
            .serve_gatt_application(self.build_application())
            .await?;
        info!("GATT application registered");
        Ok(handle)
    }
}

/// Read-only descriptor serving a constant text
fn text_descriptor(uuid: uuid::Uuid, text: &'static str) -> Descriptor {
    Descriptor {
        uuid,
        read: Some(DescriptorRead {
            read: true,
            fun: Box::new(move |req| Box::pin(async move { descriptor_read(text, req.offset) })),
            ..Default::default()
        }),
        ..Default::default()
    }
}
