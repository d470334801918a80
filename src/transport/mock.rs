//! Mock provisioning transport for testing

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::{
    endpoint::EndpointRegistry,
    error::{TransportError, TransportResult},
    types::ValidationOutcome,
};
use crate::transport::{ProvisioningTransport, TransportConfig};

/// Internal state for the mock transport
#[derive(Default)]
struct MockTransportState {
    started: bool,
    start_calls: u32,
    shutdown_calls: u32,
    should_fail_start: bool,
    config: Option<TransportConfig>,
    endpoints: Option<EndpointRegistry>,
    outcomes: Vec<ValidationOutcome>,
}

/// Mock provisioning transport
///
/// Records lifecycle calls and validation outcomes so tests can assert the
/// session manager's ordering guarantees. Session events are injected by
/// the test through the event channel it wired up, not through the mock.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail its next `start`
    pub async fn set_start_failure(&self, should_fail: bool) {
        self.inner.lock().await.should_fail_start = should_fail;
    }

    pub async fn is_started(&self) -> bool {
        self.inner.lock().await.started
    }

    pub async fn start_calls(&self) -> u32 {
        self.inner.lock().await.start_calls
    }

    pub async fn shutdown_calls(&self) -> u32 {
        self.inner.lock().await.shutdown_calls
    }

    /// Config passed to the most recent `start`
    pub async fn config(&self) -> Option<TransportConfig> {
        self.inner.lock().await.config.clone()
    }

    /// Endpoint registry passed to the most recent `start`
    pub async fn endpoints(&self) -> Option<EndpointRegistry> {
        self.inner.lock().await.endpoints.clone()
    }

    /// Validation outcomes reported so far, in order
    pub async fn outcomes(&self) -> Vec<ValidationOutcome> {
        self.inner.lock().await.outcomes.clone()
    }
}

impl ProvisioningTransport for MockTransport {
    async fn start(
        &self,
        config: TransportConfig,
        endpoints: EndpointRegistry,
    ) -> TransportResult<()> {
        let mut state = self.inner.lock().await;
        state.start_calls += 1;
        if state.should_fail_start {
            return Err(TransportError::Ble("mock start failure".into()));
        }
        state.started = true;
        state.config = Some(config);
        state.endpoints = Some(endpoints);
        Ok(())
    }

    async fn notify_validation(&self, outcome: ValidationOutcome) -> TransportResult<()> {
        self.inner.lock().await.outcomes.push(outcome);
        Ok(())
    }

    async fn shutdown(&self) -> TransportResult<()> {
        let mut state = self.inner.lock().await;
        state.shutdown_calls += 1;
        state.started = false;
        Ok(())
    }
}
