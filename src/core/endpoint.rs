//! Session-scoped custom data channel
//!
//! Named request/response endpoints the provisioning peer can call for
//! application data that has nothing to do with credential exchange.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::debug;

use crate::core::{
    error::{EndpointError, EndpointResult, ServiceError, ServiceResult},
    types::SessionId,
};

/// Fixed acknowledgment returned by the baseline handler, terminator included
pub const ACK_RESPONSE: &[u8] = b"SUCCESS\0";

/// Handler for one named endpoint
///
/// Invoked synchronously on the transport's delivery context for every
/// inbound request, so it must not block. The returned buffer (zero-length
/// is fine) is moved to the transport, which owns its delivery and release.
pub trait EndpointHandler: Send + Sync {
    fn handle(&self, session: SessionId, request: &[u8]) -> EndpointResult<Vec<u8>>;
}

impl<F> EndpointHandler for F
where
    F: Fn(SessionId, &[u8]) -> EndpointResult<Vec<u8>> + Send + Sync,
{
    fn handle(&self, session: SessionId, request: &[u8]) -> EndpointResult<Vec<u8>> {
        self(session, request)
    }
}

/// Baseline handler: log the request, acknowledge unconditionally
pub struct AckHandler;

impl EndpointHandler for AckHandler {
    fn handle(&self, session: SessionId, request: &[u8]) -> EndpointResult<Vec<u8>> {
        debug!(
            %session,
            len = request.len(),
            payload = %String::from_utf8_lossy(request),
            "custom data request"
        );
        Ok(ACK_RESPONSE.to_vec())
    }
}

/// Name → handler table shared between the session manager and the transport
///
/// The session manager owns registration (and the active-session gate);
/// the transport dispatches inbound requests against it.
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn EndpointHandler>>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to a name; names are unique within a session
    pub async fn bind(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn EndpointHandler>,
    ) -> ServiceResult<()> {
        let name = name.into();
        let mut map = self.inner.write().await;
        if map.contains_key(&name) {
            return Err(ServiceError::DuplicateEndpoint(name));
        }
        map.insert(name, handler);
        Ok(())
    }

    /// Dispatches one request to the named endpoint's handler
    pub async fn dispatch(
        &self,
        session: SessionId,
        name: &str,
        request: &[u8],
    ) -> EndpointResult<Vec<u8>> {
        let handler = {
            let map = self.inner.read().await;
            map.get(name)
                .cloned()
                .ok_or_else(|| EndpointError::Unbound(name.to_string()))?
        };
        handler.handle(session, request)
    }

    pub async fn is_bound(&self, name: &str) -> bool {
        self.inner.read().await.contains_key(name)
    }

    /// Drops all registrations; called during session teardown
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_ack_handler_returns_literal() {
        let handler = AckHandler;
        let response = handler.handle(SessionId::new(), b"arbitrary bytes").unwrap();
        assert_eq!(response, b"SUCCESS\0");
        assert_eq!(response.len(), 8);
    }

    #[tokio::test]
    async fn test_ack_handler_ignores_request_content() {
        let handler = AckHandler;
        let empty = handler.handle(SessionId::new(), b"").unwrap();
        let binary = handler.handle(SessionId::new(), &[0xff, 0x00, 0x7f]).unwrap();
        assert_eq!(empty, binary);
    }

    #[tokio::test]
    async fn test_registry_dispatch() {
        let registry = EndpointRegistry::new();
        registry
            .bind("custom-data", Arc::new(AckHandler))
            .await
            .unwrap();

        let response = registry
            .dispatch(SessionId::new(), "custom-data", b"hello")
            .await
            .unwrap();
        assert_eq!(response, ACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_registry_rejects_duplicate_names() {
        let registry = EndpointRegistry::new();
        registry
            .bind("custom-data", Arc::new(AckHandler))
            .await
            .unwrap();

        let err = registry
            .bind("custom-data", Arc::new(AckHandler))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateEndpoint(_)));
    }

    #[tokio::test]
    async fn test_registry_unbound_endpoint() {
        let registry = EndpointRegistry::new();
        let err = registry
            .dispatch(SessionId::new(), "missing", b"")
            .await
            .unwrap_err();
        assert_eq!(err, EndpointError::Unbound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_handler_out_of_memory_fails_single_exchange() {
        fn oom(_session: SessionId, _request: &[u8]) -> EndpointResult<Vec<u8>> {
            Err(EndpointError::OutOfMemory)
        }

        let registry = EndpointRegistry::new();
        registry.bind("flaky", Arc::new(oom)).await.unwrap();
        registry
            .bind("custom-data", Arc::new(AckHandler))
            .await
            .unwrap();

        let err = registry.dispatch(SessionId::new(), "flaky", b"x").await.unwrap_err();
        assert_eq!(err, EndpointError::OutOfMemory);

        // Other endpoints keep working
        let ok = registry
            .dispatch(SessionId::new(), "custom-data", b"x")
            .await
            .unwrap();
        assert_eq!(ok, ACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_clear_drops_registrations() {
        let registry = EndpointRegistry::new();
        registry
            .bind("custom-data", Arc::new(AckHandler))
            .await
            .unwrap();
        registry.clear().await;
        assert!(!registry.is_bound("custom-data").await);
    }
}
