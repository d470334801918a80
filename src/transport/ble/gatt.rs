//! GATT application for the provisioning service

use bluer::gatt::local::{
    Application, Characteristic, CharacteristicRead, CharacteristicWrite,
    CharacteristicWriteMethod, Service,
};
use std::sync::Arc;
use tracing::warn;

use crate::core::types::SecurityMode;

use super::{
    characteristics::CharacteristicHandler,
    uuids::{
        COMMIT_CHAR_UUID, MAX_ENDPOINTS, POP_CHAR_UUID, SECRET_CHAR_UUID, SSID_CHAR_UUID,
        STATUS_CHAR_UUID, endpoint_char_uuid,
    },
};

/// Builds the GATT application for one provisioning session
///
/// One primary service under the configured service UUID: credential
/// intake characteristics, the status characteristic, and one
/// characteristic per declared custom data endpoint.
pub struct ProvisioningGatt {
    handler: Arc<CharacteristicHandler>,
    service_uuid: uuid::Uuid,
    security: SecurityMode,
    endpoints: Vec<String>,
}

impl ProvisioningGatt {
    pub fn new(
        handler: Arc<CharacteristicHandler>,
        service_uuid: uuid::Uuid,
        security: SecurityMode,
        endpoints: Vec<String>,
    ) -> Self {
        Self {
            handler,
            service_uuid,
            security,
            endpoints,
        }
    }

    pub fn build_application(&self) -> Application {
        Application {
            services: vec![Service {
                uuid: self.service_uuid,
                primary: true,
                characteristics: self.build_characteristics(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn build_characteristics(&self) -> Vec<Characteristic> {
        let mut characteristics = Vec::new();

        if self.security == SecurityMode::ProofOfPossession {
            let handler = self.handler.clone();
            characteristics.push(Characteristic {
                uuid: POP_CHAR_UUID,
                write: Some(CharacteristicWrite {
                    write: true,
                    write_without_response: false,
                    method: CharacteristicWriteMethod::Fun(Box::new(move |new_value, _req| {
                        let handler = handler.clone();
                        Box::pin(async move { handler.handle_pop_write(new_value).await })
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        // SSID characteristic
        {
            let handler = self.handler.clone();
            characteristics.push(Characteristic {
                uuid: SSID_CHAR_UUID,
                write: Some(CharacteristicWrite {
                    write: true,
                    write_without_response: false,
                    method: CharacteristicWriteMethod::Fun(Box::new(move |new_value, _req| {
                        let handler = handler.clone();
                        Box::pin(async move { handler.handle_ssid_write(new_value).await })
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        // Passphrase characteristic
        {
            let handler = self.handler.clone();
            characteristics.push(Characteristic {
                uuid: SECRET_CHAR_UUID,
                write: Some(CharacteristicWrite {
                    write: true,
                    write_without_response: false,
                    method: CharacteristicWriteMethod::Fun(Box::new(move |new_value, _req| {
                        let handler = handler.clone();
                        Box::pin(async move { handler.handle_secret_write(new_value).await })
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        // Commit characteristic
        {
            let handler = self.handler.clone();
            characteristics.push(Characteristic {
                uuid: COMMIT_CHAR_UUID,
                write: Some(CharacteristicWrite {
                    write: true,
                    write_without_response: false,
                    method: CharacteristicWriteMethod::Fun(Box::new(move |new_value, _req| {
                        let handler = handler.clone();
                        Box::pin(async move { handler.handle_commit_write(new_value).await })
                    })),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        // Status characteristic
        {
            let handler = self.handler.clone();
            characteristics.push(Characteristic {
                uuid: STATUS_CHAR_UUID,
                read: Some(CharacteristicRead {
                    read: true,
                    fun: Box::new(move |_req| {
                        let handler = handler.clone();
                        Box::pin(async move { handler.handle_status_read().await })
                    }),
                    ..Default::default()
                }),
                notify: Some(Default::default()),
                ..Default::default()
            });
        }

        // Custom data endpoints, one characteristic each
        for (index, name) in self.endpoints.iter().enumerate() {
            let Some(uuid) = endpoint_char_uuid(index) else {
                warn!(
                    "endpoint \"{}\" exceeds the {} characteristic slots, skipping",
                    name, MAX_ENDPOINTS
                );
                continue;
            };

            let write_handler = self.handler.clone();
            let write_name = name.clone();
            let read_handler = self.handler.clone();
            let read_name = name.clone();

            characteristics.push(Characteristic {
                uuid,
                write: Some(CharacteristicWrite {
                    write: true,
                    write_without_response: false,
                    method: CharacteristicWriteMethod::Fun(Box::new(move |new_value, _req| {
                        let handler = write_handler.clone();
                        let name = write_name.clone();
                        Box::pin(
                            async move { handler.handle_endpoint_write(&name, new_value).await },
                        )
                    })),
                    ..Default::default()
                }),
                read: Some(CharacteristicRead {
                    read: true,
                    fun: Box::new(move |_req| {
                        let handler = read_handler.clone();
                        let name = read_name.clone();
                        Box::pin(async move { handler.handle_endpoint_read(&name).await })
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        characteristics
    }
}
