//! Provisioning transport abstraction
//!
//! The transport is the opaque secure-session provider: it advertises the
//! device, authenticates the peer, and delivers credential submissions and
//! custom data requests. Its framing and encryption are its own business.

use std::time::Duration;

use trait_variant::make;

use crate::core::{
    endpoint::EndpointRegistry,
    error::TransportResult,
    identity::ServiceName,
    types::{SecurityMode, ValidationOutcome},
};

/// Everything a transport needs to open one provisioning session
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Name the device advertises under
    pub service_name: ServiceName,
    /// 16-byte service identifier the peer filters on
    pub service_uuid: uuid::Uuid,
    /// Session security mode
    pub security: SecurityMode,
    /// Shared secret for `SecurityMode::ProofOfPossession`
    pub proof_of_possession: Option<String>,
    /// Names of the custom data endpoints to expose
    pub endpoints: Vec<String>,
    /// Settle delay the session manager applies before `shutdown`
    pub settle_delay: Duration,
}

/// Secure-session provider for one provisioning attempt
///
/// Implementations push [`SessionEvent`](crate::core::types::SessionEvent)s
/// into the channel they were constructed with; the session manager drives
/// the calls below. `start`/`shutdown` bracket exactly one session.
#[make(Send)]
pub trait ProvisioningTransport: Sync + 'static {
    /// Initializes the provider and starts advertising
    ///
    /// Failure here is fatal to the session; the manager surfaces it as
    /// `InitFailure` and does not retry.
    async fn start(
        &self,
        config: TransportConfig,
        endpoints: EndpointRegistry,
    ) -> TransportResult<()>;

    /// Reports the credential validation outcome to the peer
    async fn notify_validation(&self, outcome: ValidationOutcome) -> TransportResult<()>;

    /// Releases the transport's resources
    ///
    /// Called once per session, after the settle delay has elapsed.
    async fn shutdown(&self) -> TransportResult<()>;
}
