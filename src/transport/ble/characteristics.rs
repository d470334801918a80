//! BLE characteristic handlers

use bluer::gatt::local::ReqError;
use serde::Serialize;
use sha3::{Digest, Sha3_256};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, warn};

use crate::{
    core::{
        endpoint::EndpointRegistry,
        error::EndpointError,
        types::{CredentialFailure, SecurityMode, SessionEvent, ValidationOutcome},
    },
    transport::TransportConfig,
};

use super::session::BlePeerSession;

/// JSON payload of the status characteristic
#[derive(Debug, Serialize)]
struct StatusPayload {
    validation: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<CredentialFailure>,
}

impl From<Option<ValidationOutcome>> for StatusPayload {
    fn from(outcome: Option<ValidationOutcome>) -> Self {
        match outcome {
            None => Self {
                validation: None,
                reason: None,
            },
            Some(ValidationOutcome::Succeeded) => Self {
                validation: Some("succeeded"),
                reason: None,
            },
            Some(ValidationOutcome::Failed(reason)) => Self {
                validation: Some("failed"),
                reason: Some(reason),
            },
        }
    }
}

/// Characteristic handler for the provisioning GATT service
pub struct CharacteristicHandler {
    config: TransportConfig,
    session: Arc<BlePeerSession>,
    endpoints: EndpointRegistry,
    events: mpsc::Sender<SessionEvent>,
    status: Arc<RwLock<Option<ValidationOutcome>>>,
}

impl CharacteristicHandler {
    pub fn new(
        config: TransportConfig,
        session: Arc<BlePeerSession>,
        endpoints: EndpointRegistry,
        events: mpsc::Sender<SessionEvent>,
        status: Arc<RwLock<Option<ValidationOutcome>>>,
    ) -> Self {
        Self {
            config,
            session,
            endpoints,
            events,
            status,
        }
    }

    /// Gate for everything except the proof-of-possession write
    ///
    /// Open sessions start implicitly on first contact; authenticated
    /// sessions require the proof write first.
    async fn ensure_session(&self) -> Result<(), ReqError> {
        match self.config.security {
            SecurityMode::Open => {
                if self.session.mark_started().await {
                    self.emit(SessionEvent::Started).await;
                }
                Ok(())
            }
            SecurityMode::ProofOfPossession => {
                if self.session.is_authorized().await {
                    Ok(())
                } else {
                    warn!("request before proof of possession");
                    Err(ReqError::NotAuthorized)
                }
            }
        }
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            warn!("session event channel closed");
        }
    }

    /// Handle proof-of-possession write (32-byte SHA3-256 digest)
    pub async fn handle_pop_write(&self, value: Vec<u8>) -> Result<(), ReqError> {
        debug!("proof write received ({} bytes)", value.len());

        let Some(pop) = self.config.proof_of_possession.as_deref() else {
            // Open session; the proof characteristic is not exposed
            return Err(ReqError::NotSupported);
        };

        if value.len() != 32 {
            error!("invalid proof length: {}", value.len());
            return Err(ReqError::InvalidValueLength);
        }

        let mut hasher = Sha3_256::new();
        hasher.update(pop.as_bytes());
        let expected = hasher.finalize();

        if value.as_slice() != expected.as_slice() {
            warn!("proof of possession mismatch");
            return Err(ReqError::NotAuthorized);
        }

        self.session.set_authorized(true).await;
        if self.session.mark_started().await {
            self.emit(SessionEvent::Started).await;
        }
        debug!("peer authorized");
        Ok(())
    }

    /// Handle SSID write (accumulates partial writes)
    pub async fn handle_ssid_write(&self, value: Vec<u8>) -> Result<(), ReqError> {
        self.ensure_session().await?;
        debug!("SSID write received ({} bytes)", value.len());
        self.session.append_ssid(&value).await;
        Ok(())
    }

    /// Handle passphrase write (accumulates partial writes)
    pub async fn handle_secret_write(&self, value: Vec<u8>) -> Result<(), ReqError> {
        self.ensure_session().await?;
        debug!("passphrase write received ({} bytes)", value.len());
        self.session.append_secret(&value).await;
        Ok(())
    }

    /// Handle commit write: submits the buffered credentials
    pub async fn handle_commit_write(&self, value: Vec<u8>) -> Result<(), ReqError> {
        self.ensure_session().await?;

        if value.first() != Some(&1) {
            warn!("invalid commit value: {:?}", value.first());
            return Err(ReqError::InvalidValueLength);
        }

        match self.session.take_credentials().await {
            Ok(credentials) => {
                debug!(ssid = %credentials.ssid, "credentials committed");
                self.emit(SessionEvent::CredentialsReceived(credentials)).await;
                Ok(())
            }
            Err(e) => {
                error!("malformed credential submission: {}", e);
                Err(ReqError::Failed)
            }
        }
    }

    /// Handle status read
    pub async fn handle_status_read(&self) -> Result<Vec<u8>, ReqError> {
        self.ensure_session().await?;

        let payload = StatusPayload::from(*self.status.read().await);
        match serde_json::to_vec(&payload) {
            Ok(json) => Ok(json),
            Err(e) => {
                error!("failed to serialize status: {}", e);
                Err(ReqError::Failed)
            }
        }
    }

    /// Handle a request write on a custom data endpoint
    pub async fn handle_endpoint_write(&self, name: &str, value: Vec<u8>) -> Result<(), ReqError> {
        self.ensure_session().await?;

        match self.endpoints.dispatch(self.session.id(), name, &value).await {
            Ok(response) => {
                // Response ownership moves to the transport; the peer
                // collects it with a read on the same characteristic.
                self.session.store_response(name, response).await;
                Ok(())
            }
            Err(EndpointError::OutOfMemory) => {
                error!(endpoint = name, "handler out of memory");
                Err(ReqError::Failed)
            }
            Err(EndpointError::Unbound(_)) => {
                warn!(endpoint = name, "request to unbound endpoint");
                Err(ReqError::NotSupported)
            }
        }
    }

    /// Handle a response read on a custom data endpoint
    pub async fn handle_endpoint_read(&self, name: &str) -> Result<Vec<u8>, ReqError> {
        self.ensure_session().await?;
        Ok(self.session.take_response(name).await.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::endpoint::{ACK_RESPONSE, AckHandler};
    use crate::core::identity::ServiceName;
    use crate::core::session::DEFAULT_SERVICE_UUID;
    use std::time::Duration;

    fn config(security: SecurityMode) -> TransportConfig {
        TransportConfig {
            service_name: ServiceName::from_mac(&[0, 0, 0, 1, 2, 3]),
            service_uuid: DEFAULT_SERVICE_UUID,
            security,
            proof_of_possession: match security {
                SecurityMode::ProofOfPossession => Some("abcd1234".to_string()),
                SecurityMode::Open => None,
            },
            endpoints: vec!["custom-data".to_string()],
            settle_delay: Duration::from_millis(10),
        }
    }

    fn handler(
        security: SecurityMode,
    ) -> (CharacteristicHandler, mpsc::Receiver<SessionEvent>, EndpointRegistry) {
        let (tx, rx) = mpsc::channel(8);
        let registry = EndpointRegistry::new();
        let handler = CharacteristicHandler::new(
            config(security),
            Arc::new(BlePeerSession::new()),
            registry.clone(),
            tx,
            Arc::new(RwLock::new(None)),
        );
        (handler, rx, registry)
    }

    fn proof(pop: &str) -> Vec<u8> {
        let mut hasher = Sha3_256::new();
        hasher.update(pop.as_bytes());
        hasher.finalize().to_vec()
    }

    #[tokio::test]
    async fn test_pop_write_authorizes_and_starts_session() {
        let (handler, mut rx, _) = handler(SecurityMode::ProofOfPossession);

        handler.handle_pop_write(proof("abcd1234")).await.unwrap();
        assert_eq!(rx.recv().await, Some(SessionEvent::Started));

        // A second proof write does not emit Started again
        handler.handle_pop_write(proof("abcd1234")).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wrong_proof_rejected() {
        let (handler, _rx, _) = handler(SecurityMode::ProofOfPossession);

        assert!(matches!(
            handler.handle_pop_write(proof("wrong")).await,
            Err(ReqError::NotAuthorized)
        ));
        assert!(matches!(
            handler.handle_pop_write(vec![0u8; 16]).await,
            Err(ReqError::InvalidValueLength)
        ));
    }

    #[tokio::test]
    async fn test_writes_require_authorization() {
        let (handler, _rx, _) = handler(SecurityMode::ProofOfPossession);

        assert!(matches!(
            handler.handle_ssid_write(b"HomeNet".to_vec()).await,
            Err(ReqError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn test_credential_submission_flow() {
        let (handler, mut rx, _) = handler(SecurityMode::ProofOfPossession);

        handler.handle_pop_write(proof("abcd1234")).await.unwrap();
        rx.recv().await;

        handler.handle_ssid_write(b"Home".to_vec()).await.unwrap();
        handler.handle_ssid_write(b"Net".to_vec()).await.unwrap();
        handler.handle_secret_write(b"hunter2".to_vec()).await.unwrap();
        handler.handle_commit_write(vec![1]).await.unwrap();

        match rx.recv().await {
            Some(SessionEvent::CredentialsReceived(creds)) => {
                assert_eq!(creds.ssid, "HomeNet");
                assert_eq!(creds.secret, "hunter2");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_mode_starts_on_first_write() {
        let (handler, mut rx, _) = handler(SecurityMode::Open);

        handler.handle_ssid_write(b"HomeNet".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await, Some(SessionEvent::Started));
    }

    #[tokio::test]
    async fn test_endpoint_roundtrip() {
        let (handler, mut rx, registry) = handler(SecurityMode::Open);
        registry
            .bind("custom-data", Arc::new(AckHandler))
            .await
            .unwrap();

        handler
            .handle_endpoint_write("custom-data", b"hello device".to_vec())
            .await
            .unwrap();
        rx.recv().await; // implicit session start

        let response = handler.handle_endpoint_read("custom-data").await.unwrap();
        assert_eq!(response, ACK_RESPONSE);

        // Response is consumed by the read
        let empty = handler.handle_endpoint_read("custom-data").await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_unbound_endpoint_not_supported() {
        let (handler, _rx, _) = handler(SecurityMode::Open);

        assert!(matches!(
            handler
                .handle_endpoint_write("custom-data", b"x".to_vec())
                .await,
            Err(ReqError::NotSupported)
        ));
    }

    #[tokio::test]
    async fn test_status_read_reflects_outcome() {
        let (tx, _rx) = mpsc::channel(8);
        let status = Arc::new(RwLock::new(None));
        let handler = CharacteristicHandler::new(
            config(SecurityMode::Open),
            Arc::new(BlePeerSession::new()),
            EndpointRegistry::new(),
            tx,
            status.clone(),
        );

        let idle = handler.handle_status_read().await.unwrap();
        assert_eq!(String::from_utf8(idle).unwrap(), r#"{"validation":null}"#);

        *status.write().await = Some(ValidationOutcome::Failed(CredentialFailure::ApNotFound));
        let failed = handler.handle_status_read().await.unwrap();
        assert_eq!(
            String::from_utf8(failed).unwrap(),
            r#"{"validation":"failed","reason":"ap_not_found"}"#
        );
    }
}
