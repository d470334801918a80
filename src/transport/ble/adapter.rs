//! BLE provisioning transport over BlueZ

use std::{collections::BTreeSet, sync::Arc};

use bluer::{
    Adapter, AdapterEvent,
    adv::{Advertisement, AdvertisementHandle},
    gatt::local::ApplicationHandle,
};
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::{
    core::{
        endpoint::EndpointRegistry,
        error::{TransportError, TransportResult},
        types::{SessionEvent, ValidationOutcome},
    },
    transport::{ProvisioningTransport, TransportConfig},
};

use super::{characteristics::CharacteristicHandler, gatt::ProvisioningGatt, session::BlePeerSession};

/// Resources held while a session is advertising
struct ActiveSession {
    adapter: Adapter,
    _app: ApplicationHandle,
    _advertisement: AdvertisementHandle,
}

/// BLE provisioning transport
///
/// Advertises the configured service name and UUID, serves the credential
/// and custom data characteristics, and reports session events into the
/// coordinator's channel. `start`/`shutdown` bracket one session; dropping
/// the handles unregisters the application from BlueZ.
pub struct BleTransport {
    events: mpsc::Sender<SessionEvent>,
    status: Arc<RwLock<Option<ValidationOutcome>>>,
    active: Mutex<Option<ActiveSession>>,
}

impl BleTransport {
    pub fn new(events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            events,
            status: Arc::new(RwLock::new(None)),
            active: Mutex::new(None),
        }
    }

    fn ble_err(e: bluer::Error) -> TransportError {
        TransportError::Ble(e.to_string())
    }
}

impl ProvisioningTransport for BleTransport {
    async fn start(
        &self,
        config: TransportConfig,
        endpoints: EndpointRegistry,
    ) -> TransportResult<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(TransportError::Ble("transport already started".into()));
        }

        let session = bluer::Session::new().await.map_err(Self::ble_err)?;
        let adapter = session.default_adapter().await.map_err(Self::ble_err)?;
        info!("using BLE adapter: {}", adapter.name());

        adapter.set_powered(true).await.map_err(Self::ble_err)?;
        adapter
            .set_alias(config.service_name.to_string())
            .await
            .map_err(Self::ble_err)?;
        adapter.set_discoverable(true).await.map_err(Self::ble_err)?;
        adapter.set_pairable(true).await.map_err(Self::ble_err)?;

        let peer = Arc::new(BlePeerSession::new());
        let handler = Arc::new(CharacteristicHandler::new(
            config.clone(),
            peer,
            endpoints,
            self.events.clone(),
            self.status.clone(),
        ));

        let gatt = ProvisioningGatt::new(
            handler,
            config.service_uuid,
            config.security,
            config.endpoints.clone(),
        );
        let app = adapter
            .serve_gatt_application(gatt.build_application())
            .await
            .map_err(Self::ble_err)?;

        let advertisement = Advertisement {
            service_uuids: BTreeSet::from([config.service_uuid]),
            discoverable: Some(true),
            local_name: Some(config.service_name.to_string()),
            ..Default::default()
        };
        let advertisement = adapter
            .advertise(advertisement)
            .await
            .map_err(Self::ble_err)?;

        // Adapter event monitor, for observability only
        let monitor = adapter.clone();
        tokio::spawn(async move {
            let Ok(mut events) = monitor.events().await else {
                warn!("cannot monitor BLE adapter events");
                return;
            };
            while let Some(event) = events.next().await {
                match event {
                    AdapterEvent::DeviceAdded(addr) => debug!("device added: {}", addr),
                    AdapterEvent::DeviceRemoved(addr) => debug!("device removed: {}", addr),
                    AdapterEvent::PropertyChanged(_) => {}
                }
            }
        });

        info!(
            service = %config.service_name,
            uuid = %config.service_uuid,
            "BLE provisioning service advertising"
        );

        *active = Some(ActiveSession {
            adapter,
            _app: app,
            _advertisement: advertisement,
        });
        Ok(())
    }

    async fn notify_validation(&self, outcome: ValidationOutcome) -> TransportResult<()> {
        debug!(?outcome, "validation outcome available to peer");
        *self.status.write().await = Some(outcome);
        Ok(())
    }

    async fn shutdown(&self) -> TransportResult<()> {
        let Some(session) = self.active.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = session.adapter.set_discoverable(false).await {
            warn!("failed to stop discoverability: {}", e);
        }
        // GATT application and advertisement unregister when their handles drop
        info!("BLE provisioning service released");
        Ok(())
    }
}
