//! Provisioning session manager with lifecycle state machine
//!
//! Owns one onboarding attempt end to end: transport bring-up, credential
//! intake, validation outcome, and the ordered delay-then-release teardown.

use std::{sync::Arc, time::Duration};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    core::{
        endpoint::{EndpointHandler, EndpointRegistry},
        error::{ServiceError, ServiceResult},
        identity::ServiceName,
        types::{CredentialFailure, SecurityMode, SessionState, ValidationOutcome},
    },
    transport::{ProvisioningTransport, TransportConfig},
};

/// Settle delay applied between validation success and transport release,
/// so the final acknowledgment reaches the peer before the radio goes away
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default service identifier advertised to provisioning peers
pub const DEFAULT_SERVICE_UUID: uuid::Uuid = uuid::Uuid::from_bytes([
    0x02, 0x1a, 0x90, 0x04, 0x03, 0x82, 0x4a, 0xea, 0xbf, 0xf4, 0x6b, 0x3f, 0x1c, 0x5a, 0xdf, 0xb4,
]);

/// Session parameters fixed at start
#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    pub security: SecurityMode,
    pub proof_of_possession: Option<String>,
    pub service_uuid: uuid::Uuid,
    /// Endpoint names the transport materializes at session start
    pub endpoints: Vec<String>,
    pub settle_delay: Duration,
    /// Re-provision even when the credential store already has credentials
    pub always_provision: bool,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            security: SecurityMode::Open,
            proof_of_possession: None,
            service_uuid: DEFAULT_SERVICE_UUID,
            endpoints: vec!["custom-data".to_string()],
            settle_delay: DEFAULT_SETTLE_DELAY,
            always_provision: false,
        }
    }
}

/// Session state machine
#[derive(Debug)]
struct SessionStateMachine {
    state: SessionState,
    service_name: Option<ServiceName>,
    last_failure: Option<CredentialFailure>,
}

impl SessionStateMachine {
    fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            service_name: None,
            last_failure: None,
        }
    }
}

/// Provisioning session manager
///
/// At most one session is active device-wide; `start` on an active manager
/// is a programmer error and `end` is idempotent.
pub struct ProvisioningSessionManager<T: ProvisioningTransport> {
    transport: Arc<T>,
    settings: ProvisioningSettings,
    state: Arc<RwLock<SessionStateMachine>>,
    endpoints: EndpointRegistry,
}

impl<T: ProvisioningTransport> ProvisioningSessionManager<T> {
    pub fn new(transport: Arc<T>, settings: ProvisioningSettings) -> Self {
        Self {
            transport,
            settings,
            state: Arc::new(RwLock::new(SessionStateMachine::new())),
            endpoints: EndpointRegistry::new(),
        }
    }

    /// Starts a provisioning session advertising under `service_name`
    ///
    /// Transport initialization failure is fatal: the state machine returns
    /// to Uninitialized and the error propagates with no retry here.
    pub async fn start(&self, service_name: ServiceName) -> ServiceResult<()> {
        {
            let mut sm = self.state.write().await;
            if sm.state != SessionState::Uninitialized {
                return Err(ServiceError::AlreadyActive);
            }
            sm.state = SessionState::Starting;
            sm.service_name = Some(service_name.clone());
            sm.last_failure = None;
        }

        let config = TransportConfig {
            service_name: service_name.clone(),
            service_uuid: self.settings.service_uuid,
            security: self.settings.security,
            proof_of_possession: self.settings.proof_of_possession.clone(),
            endpoints: self.settings.endpoints.clone(),
            settle_delay: self.settings.settle_delay,
        };

        match self.transport.start(config, self.endpoints.clone()).await {
            Ok(()) => {
                self.state.write().await.state = SessionState::Advertising;
                info!(service = %service_name, "provisioning session advertising");
                Ok(())
            }
            Err(e) => {
                let mut sm = self.state.write().await;
                sm.state = SessionState::Uninitialized;
                sm.service_name = None;
                Err(ServiceError::InitFailure(e))
            }
        }
    }

    /// Peer opened its secure session
    pub async fn peer_session_started(&self) {
        let mut sm = self.state.write().await;
        match sm.state {
            SessionState::Advertising => {
                sm.state = SessionState::CredentialsPending;
                debug!("peer session started, awaiting credentials");
            }
            state => debug!(?state, "peer session started, no transition"),
        }
    }

    /// Peer submitted credentials; validation is now pending on the
    /// connection supervisor's association attempt
    pub async fn credentials_received(&self) -> ServiceResult<()> {
        let mut sm = self.state.write().await;
        match sm.state {
            SessionState::Advertising | SessionState::CredentialsPending => {
                sm.state = SessionState::Validating;
                info!("credentials received, validating against access point");
                Ok(())
            }
            SessionState::Uninitialized => Err(ServiceError::NoActiveSession),
            from => Err(ServiceError::InvalidStateTransition {
                from,
                to: SessionState::Validating,
            }),
        }
    }

    /// Association attempt failed with a credential rejection
    ///
    /// Returns the session to Advertising: the peer must resubmit, the
    /// rejected credentials are never retried.
    pub async fn validation_failed(&self, reason: CredentialFailure) -> ServiceResult<()> {
        {
            let mut sm = self.state.write().await;
            if sm.state != SessionState::Validating {
                return Err(ServiceError::InvalidStateTransition {
                    from: sm.state,
                    to: SessionState::Failure,
                });
            }
            sm.state = SessionState::Failure;
            sm.last_failure = Some(reason);
        }

        warn!(%reason, "credential validation failed, awaiting resubmission");
        if let Err(e) = self
            .transport
            .notify_validation(ValidationOutcome::Failed(reason))
            .await
        {
            warn!("failed to report validation outcome: {e}");
        }

        self.state.write().await.state = SessionState::Advertising;
        Ok(())
    }

    /// Association and IP acquisition succeeded with the peer's credentials
    pub async fn validation_succeeded(&self) -> ServiceResult<()> {
        {
            let mut sm = self.state.write().await;
            if sm.state != SessionState::Validating {
                return Err(ServiceError::InvalidStateTransition {
                    from: sm.state,
                    to: SessionState::Success,
                });
            }
            sm.state = SessionState::Success;
        }

        info!("credential validation succeeded");
        if let Err(e) = self
            .transport
            .notify_validation(ValidationOutcome::Succeeded)
            .await
        {
            warn!("failed to report validation outcome: {e}");
        }
        Ok(())
    }

    /// Peer closed its session before the exchange completed
    pub async fn peer_session_ended(&self) {
        let mut sm = self.state.write().await;
        match sm.state {
            SessionState::CredentialsPending | SessionState::Validating => {
                sm.state = SessionState::Advertising;
                info!("peer session ended mid-exchange, advertising again");
            }
            state => debug!(?state, "peer session ended, no transition"),
        }
    }

    /// Tears the session down: settle delay first, then transport release
    ///
    /// The delay lets the transport flush the final acknowledgment to the
    /// peer; release strictly follows it. Idempotent: ending an already
    /// ended (or currently ending) session is a no-op.
    pub async fn end(&self) -> ServiceResult<()> {
        {
            let mut sm = self.state.write().await;
            match sm.state {
                SessionState::Uninitialized | SessionState::TearingDown => return Ok(()),
                _ => sm.state = SessionState::TearingDown,
            }
        }

        tokio::time::sleep(self.settings.settle_delay).await;

        if let Err(e) = self.transport.shutdown().await {
            warn!("transport shutdown failed: {e}");
        }
        self.endpoints.clear().await;

        let mut sm = self.state.write().await;
        sm.state = SessionState::Uninitialized;
        sm.service_name = None;
        info!("provisioning session torn down");
        Ok(())
    }

    /// Binds a handler to a named custom data endpoint
    ///
    /// Only valid while a session is active; duplicate names are rejected.
    pub async fn register_endpoint(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn EndpointHandler>,
    ) -> ServiceResult<()> {
        if !self.state.read().await.state.is_active() {
            return Err(ServiceError::NoActiveSession);
        }
        self.endpoints.bind(name, handler).await
    }

    /// Registry the transport dispatches inbound requests against
    pub fn endpoints(&self) -> EndpointRegistry {
        self.endpoints.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.state
    }

    pub async fn service_name(&self) -> Option<ServiceName> {
        self.state.read().await.service_name.clone()
    }

    pub async fn last_failure(&self) -> Option<CredentialFailure> {
        self.state.read().await.last_failure
    }
}
