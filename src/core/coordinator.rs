//! Lifecycle coordinator
//!
//! Sequences boot, provisioning, association, and reconnection. Owns both
//! state machines and the ready signal, drains the link and session event
//! channels on a single delivery context, and guarantees the provisioning
//! session is torn down at most once per successful connection epoch.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    backend::{CredentialStore, LinkDriver},
    core::{
        error::ServiceResult,
        identity,
        ready::ReadySignal,
        session::{ProvisioningSessionManager, ProvisioningSettings},
        supervisor::ConnectionSupervisor,
        types::{LinkEvent, SessionEvent, SessionState, WifiCredentials},
    },
    transport::ProvisioningTransport,
};

/// Top-level lifecycle coordinator
pub struct LifecycleCoordinator<L: LinkDriver, T: ProvisioningTransport> {
    driver: Arc<L>,
    session: Arc<ProvisioningSessionManager<T>>,
    supervisor: Arc<ConnectionSupervisor<L>>,
    ready: ReadySignal,
    settings: ProvisioningSettings,
    store: Option<Arc<dyn CredentialStore>>,
    link_events: mpsc::Receiver<LinkEvent>,
    session_events: mpsc::Receiver<SessionEvent>,
    /// Credentials awaiting the validation outcome, for the store bridge
    pending: Option<WifiCredentials>,
    /// At most one session teardown per successful epoch
    teardown_done: bool,
}

impl<L: LinkDriver, T: ProvisioningTransport> LifecycleCoordinator<L, T> {
    pub fn new(
        driver: Arc<L>,
        transport: Arc<T>,
        settings: ProvisioningSettings,
        store: Option<Arc<dyn CredentialStore>>,
        link_events: mpsc::Receiver<LinkEvent>,
        session_events: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        let ready = ReadySignal::new();
        let session = Arc::new(ProvisioningSessionManager::new(
            transport,
            settings.clone(),
        ));
        let supervisor = Arc::new(ConnectionSupervisor::new(driver.clone(), ready.clone()));

        Self {
            driver,
            session,
            supervisor,
            ready,
            settings,
            store,
            link_events,
            session_events,
            pending: None,
            teardown_done: false,
        }
    }

    /// Signal the application blocks on before proceeding past onboarding
    pub fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }

    pub fn session(&self) -> Arc<ProvisioningSessionManager<T>> {
        self.session.clone()
    }

    pub fn supervisor(&self) -> Arc<ConnectionSupervisor<L>> {
        self.supervisor.clone()
    }

    /// Boots the onboarding flow
    ///
    /// Consults the credential store first: stored credentials skip
    /// provisioning entirely (unless `always_provision` is set) and go
    /// straight to association. Otherwise derives the service name and
    /// starts the provisioning session. `IdentityUnavailable` and
    /// `InitFailure` propagate as unrecoverable startup faults.
    pub async fn start(&self) -> ServiceResult<()> {
        if !self.settings.always_provision {
            if let Some(credentials) = self.store.as_ref().and_then(|store| store.get()) {
                info!(ssid = %credentials.ssid, "stored credentials found, skipping provisioning");
                return self.supervisor.apply_credentials(credentials).await;
            }
        }

        let service_name = identity::derive_service_name(self.driver.as_ref()).await?;
        self.session.start(service_name).await
    }

    /// Drains both event channels until they close
    ///
    /// This loop is the single event-delivery context: no two state
    /// transitions interleave. Recoverable per-event errors are logged and
    /// the loop continues.
    pub async fn run(mut self) -> ServiceResult<()> {
        loop {
            tokio::select! {
                event = self.session_events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_session_event(event).await {
                            warn!("session event handling failed: {e}");
                        }
                    }
                    None => break,
                },
                event = self.link_events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.handle_link_event(event).await {
                            warn!("link event handling failed: {e}");
                        }
                    }
                    None => break,
                },
            }
        }
        info!("event channels closed, coordinator stopping");
        Ok(())
    }

    async fn handle_session_event(&mut self, event: SessionEvent) -> ServiceResult<()> {
        match event {
            SessionEvent::Started => {
                self.session.peer_session_started().await;
                Ok(())
            }
            SessionEvent::CredentialsReceived(credentials) => {
                self.session.credentials_received().await?;
                self.pending = Some(credentials.clone());
                self.supervisor.apply_credentials(credentials).await
            }
            SessionEvent::Ended => {
                self.session.peer_session_ended().await;
                Ok(())
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) -> ServiceResult<()> {
        match event {
            LinkEvent::Started => {
                self.supervisor.on_link_started().await;
                Ok(())
            }
            LinkEvent::Associated => {
                self.supervisor.on_association_up().await;
                Ok(())
            }
            LinkEvent::Disconnected(reason) => {
                // A credential rejection during validation goes back to the
                // peer; everything else is link loss and gets retried.
                if let Some(failure) = reason.credential_failure() {
                    if self.session.state().await == SessionState::Validating {
                        self.pending = None;
                        self.session.validation_failed(failure).await?;
                        self.supervisor.abandon().await;
                        return Ok(());
                    }
                }
                self.supervisor.on_disconnect(reason).await
            }
            LinkEvent::IpAcquired(addr) => {
                self.supervisor.on_ip_acquired(addr).await;

                if self.session.state().await == SessionState::Validating {
                    self.session.validation_succeeded().await?;
                }

                let validated = self.pending.take();
                if let (Some(store), Some(credentials)) = (self.store.as_ref(), validated) {
                    store.put(&credentials);
                    debug!("credentials handed to the store");
                }

                if !self.teardown_done && self.session.state().await == SessionState::Success {
                    self.session.end().await?;
                    self.teardown_done = true;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockCredentialStore, MockLinkDriver};
    use crate::core::endpoint::{ACK_RESPONSE, AckHandler};
    use crate::core::error::{LinkError, ServiceError};
    use crate::core::types::{
        ConnectionState, CredentialFailure, DisconnectReason, SecurityMode, SessionId,
        ValidationOutcome,
    };
    use crate::transport::MockTransport;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    struct Harness {
        driver: Arc<MockLinkDriver>,
        transport: MockTransport,
        link_tx: mpsc::Sender<LinkEvent>,
        session_tx: mpsc::Sender<SessionEvent>,
        coordinator: LifecycleCoordinator<MockLinkDriver, MockTransport>,
    }

    fn settings() -> ProvisioningSettings {
        ProvisioningSettings {
            security: SecurityMode::ProofOfPossession,
            proof_of_possession: Some("abcd1234".to_string()),
            settle_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn harness(store: Option<Arc<dyn CredentialStore>>) -> Harness {
        let (link_tx, link_rx) = mpsc::channel(32);
        let (session_tx, session_rx) = mpsc::channel(32);

        let driver = Arc::new(MockLinkDriver::with_events(link_tx.clone()));
        let transport = MockTransport::new();

        let coordinator = LifecycleCoordinator::new(
            driver.clone(),
            Arc::new(transport.clone()),
            settings(),
            store,
            link_rx,
            session_rx,
        );

        Harness {
            driver,
            transport,
            link_tx,
            session_tx,
            coordinator,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_full_onboarding_scenario() {
        let h = harness(None);
        h.driver.add_network("HomeNet", "hunter2").await;
        h.driver.set_mac([0xde, 0xad, 0xbe, 0xef, 0x12, 0x34]).await;
        h.driver.set_ip(Ipv4Addr::new(192, 168, 4, 20)).await;

        h.coordinator.start().await.unwrap();

        let session = h.coordinator.session();
        let ready = h.coordinator.ready();
        let supervisor = h.coordinator.supervisor();

        assert_eq!(session.state().await, SessionState::Advertising);
        let config = h.transport.config().await.unwrap();
        assert_eq!(config.service_name.as_str(), "PROV_EF1234");
        assert_eq!(config.security, SecurityMode::ProofOfPossession);

        session
            .register_endpoint("custom-data", Arc::new(AckHandler))
            .await
            .unwrap();

        tokio::spawn(h.coordinator.run());

        // Peer opens its session and submits valid credentials
        h.session_tx.send(SessionEvent::Started).await.unwrap();
        settle().await;
        assert_eq!(session.state().await, SessionState::CredentialsPending);

        h.session_tx
            .send(SessionEvent::CredentialsReceived(WifiCredentials::new(
                "HomeNet", "hunter2",
            )))
            .await
            .unwrap();

        assert!(ready.wait_timeout(Duration::from_secs(1)).await);
        assert_eq!(supervisor.state().await, ConnectionState::Ready);
        assert_eq!(
            supervisor.status().await.ip_address,
            Some("192.168.4.20".to_string())
        );

        // Session reported success and tore down exactly once
        settle().await;
        assert_eq!(
            h.transport.outcomes().await,
            vec![ValidationOutcome::Succeeded]
        );
        assert_eq!(session.state().await, SessionState::Uninitialized);
        assert_eq!(h.transport.shutdown_calls().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_credentials_reprompt_the_peer() {
        let h = harness(None);
        h.driver.add_network("HomeNet", "hunter2").await;

        h.coordinator.start().await.unwrap();
        let session = h.coordinator.session();
        let ready = h.coordinator.ready();
        let supervisor = h.coordinator.supervisor();
        tokio::spawn(h.coordinator.run());

        // Wrong passphrase: the simulated AP rejects it
        h.session_tx
            .send(SessionEvent::CredentialsReceived(WifiCredentials::new(
                "HomeNet", "wrong",
            )))
            .await
            .unwrap();
        settle().await;

        assert_eq!(session.state().await, SessionState::Advertising);
        assert_eq!(
            session.last_failure().await,
            Some(CredentialFailure::AuthError)
        );
        assert_eq!(
            h.transport.outcomes().await,
            vec![ValidationOutcome::Failed(CredentialFailure::AuthError)]
        );
        assert_eq!(supervisor.state().await, ConnectionState::Idle);
        assert!(!ready.is_set());

        // The rejected secret was never retried on its own
        assert_eq!(h.driver.associate_calls().await, 1);
        assert_eq!(h.driver.reconnect_calls().await, 0);

        // Resubmission with the right secret completes onboarding
        h.session_tx
            .send(SessionEvent::CredentialsReceived(WifiCredentials::new(
                "HomeNet", "hunter2",
            )))
            .await
            .unwrap();
        assert!(ready.wait_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_unknown_ssid_maps_to_ap_not_found() {
        let h = harness(None);

        h.coordinator.start().await.unwrap();
        let session = h.coordinator.session();
        tokio::spawn(h.coordinator.run());

        h.session_tx
            .send(SessionEvent::CredentialsReceived(WifiCredentials::new(
                "NoSuchNet", "secret",
            )))
            .await
            .unwrap();
        settle().await;

        assert_eq!(session.state().await, SessionState::Advertising);
        assert_eq!(
            session.last_failure().await,
            Some(CredentialFailure::ApNotFound)
        );
    }

    #[tokio::test]
    async fn test_link_loss_after_ready_retries_unbounded() {
        let h = harness(None);
        h.driver.add_network("HomeNet", "hunter2").await;

        h.coordinator.start().await.unwrap();
        let ready = h.coordinator.ready();
        let supervisor = h.coordinator.supervisor();
        tokio::spawn(h.coordinator.run());

        h.session_tx
            .send(SessionEvent::CredentialsReceived(WifiCredentials::new(
                "HomeNet", "hunter2",
            )))
            .await
            .unwrap();
        assert!(ready.wait_timeout(Duration::from_secs(1)).await);
        settle().await;

        // AP vanishes; every disconnect re-enters Associating, forever
        h.driver.set_silent(true).await;
        for _ in 0..20 {
            h.link_tx
                .send(LinkEvent::Disconnected(DisconnectReason::ConnectionLost))
                .await
                .unwrap();
        }
        settle().await;

        assert_eq!(supervisor.state().await, ConnectionState::Associating);
        assert_eq!(h.driver.reconnect_calls().await, 20);
        assert!(!ready.is_set());

        // The provisioning session stays gone; credential-shaped disconnect
        // reasons after provisioning are ordinary link loss
        h.link_tx
            .send(LinkEvent::Disconnected(DisconnectReason::AuthFailure))
            .await
            .unwrap();
        settle().await;
        assert_eq!(supervisor.state().await, ConnectionState::Associating);
        assert_eq!(h.driver.reconnect_calls().await, 21);
    }

    #[tokio::test]
    async fn test_peer_disconnect_mid_session_returns_to_advertising() {
        let h = harness(None);

        h.coordinator.start().await.unwrap();
        let session = h.coordinator.session();
        tokio::spawn(h.coordinator.run());

        h.session_tx.send(SessionEvent::Started).await.unwrap();
        settle().await;
        assert_eq!(session.state().await, SessionState::CredentialsPending);

        h.session_tx.send(SessionEvent::Ended).await.unwrap();
        settle().await;
        assert_eq!(session.state().await, SessionState::Advertising);
    }

    #[tokio::test]
    async fn test_identity_unavailable_is_fatal() {
        let h = harness(None);
        h.driver.set_identity_failure(true).await;

        let err = h.coordinator.start().await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Link(LinkError::IdentityUnavailable(_))
        ));
        assert_eq!(h.transport.start_calls().await, 0);
    }

    #[tokio::test]
    async fn test_transport_init_failure_is_fatal() {
        let h = harness(None);
        h.transport.set_start_failure(true).await;

        let err = h.coordinator.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::InitFailure(_)));
        assert_eq!(
            h.coordinator.session().state().await,
            SessionState::Uninitialized
        );
    }

    #[tokio::test]
    async fn test_stored_credentials_skip_provisioning() {
        let store = MockCredentialStore::with_credentials(WifiCredentials::new(
            "HomeNet", "hunter2",
        ));
        let h = harness(Some(store));
        h.driver.add_network("HomeNet", "hunter2").await;

        h.coordinator.start().await.unwrap();
        let ready = h.coordinator.ready();
        let session = h.coordinator.session();
        tokio::spawn(h.coordinator.run());

        // No provisioning session, straight to association
        assert_eq!(h.transport.start_calls().await, 0);
        assert_eq!(session.state().await, SessionState::Uninitialized);
        assert!(ready.wait_timeout(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_validated_credentials_reach_the_store() {
        let store = Arc::new(MockCredentialStore::new());
        let h = harness(Some(store.clone()));
        h.driver.add_network("HomeNet", "hunter2").await;

        h.coordinator.start().await.unwrap();
        let ready = h.coordinator.ready();
        tokio::spawn(h.coordinator.run());

        h.session_tx
            .send(SessionEvent::CredentialsReceived(WifiCredentials::new(
                "HomeNet", "hunter2",
            )))
            .await
            .unwrap();
        assert!(ready.wait_timeout(Duration::from_secs(1)).await);
        settle().await;

        assert_eq!(
            store.get(),
            Some(WifiCredentials::new("HomeNet", "hunter2"))
        );
    }

    #[tokio::test]
    async fn test_custom_data_endpoint_over_session() {
        let h = harness(None);
        h.coordinator.start().await.unwrap();
        let session = h.coordinator.session();

        session
            .register_endpoint("custom-data", Arc::new(AckHandler))
            .await
            .unwrap();

        // The transport dispatches against the registry it was started with
        let registry = h.transport.endpoints().await.unwrap();
        let response = registry
            .dispatch(SessionId::new(), "custom-data", b"any request at all")
            .await
            .unwrap();
        assert_eq!(response, ACK_RESPONSE);
    }
}
