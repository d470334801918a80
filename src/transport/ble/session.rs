//! BLE peer session state

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::core::types::{SessionId, WifiCredentials};

/// State of the connected provisioning peer
///
/// Credential fields accumulate across chunked GATT writes until the peer
/// commits them; endpoint responses wait here for the peer's read-back.
#[derive(Debug)]
pub struct BlePeerSession {
    id: SessionId,
    started: RwLock<bool>,
    authorized: RwLock<bool>,
    ssid_buffer: RwLock<Vec<u8>>,
    secret_buffer: RwLock<Vec<u8>>,
    responses: RwLock<HashMap<String, Vec<u8>>>,
}

impl BlePeerSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            started: RwLock::new(false),
            authorized: RwLock::new(false),
            ssid_buffer: RwLock::new(Vec::new()),
            secret_buffer: RwLock::new(Vec::new()),
            responses: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Marks the session started; true exactly once
    pub async fn mark_started(&self) -> bool {
        let mut started = self.started.write().await;
        !std::mem::replace(&mut *started, true)
    }

    pub async fn is_authorized(&self) -> bool {
        *self.authorized.read().await
    }

    pub async fn set_authorized(&self, authorized: bool) {
        *self.authorized.write().await = authorized;
    }

    pub async fn append_ssid(&self, data: &[u8]) {
        self.ssid_buffer.write().await.extend_from_slice(data);
    }

    pub async fn append_secret(&self, data: &[u8]) {
        self.secret_buffer.write().await.extend_from_slice(data);
    }

    /// Drains the credential buffers into a `WifiCredentials`
    ///
    /// Fails on an empty SSID or invalid UTF-8; the buffers are cleared
    /// either way so a garbled submission does not poison the next one.
    pub async fn take_credentials(&self) -> Result<WifiCredentials, String> {
        let ssid_bytes = std::mem::take(&mut *self.ssid_buffer.write().await);
        let secret_bytes = std::mem::take(&mut *self.secret_buffer.write().await);

        let ssid =
            String::from_utf8(ssid_bytes).map_err(|e| format!("invalid UTF-8 in SSID: {}", e))?;
        let secret = String::from_utf8(secret_bytes)
            .map_err(|e| format!("invalid UTF-8 in passphrase: {}", e))?;

        if ssid.is_empty() {
            return Err("empty SSID".to_string());
        }
        Ok(WifiCredentials::new(ssid, secret))
    }

    /// Parks an endpoint response until the peer reads it back
    pub async fn store_response(&self, endpoint: &str, response: Vec<u8>) {
        self.responses
            .write()
            .await
            .insert(endpoint.to_string(), response);
    }

    /// Hands the parked response to the peer, consuming it
    pub async fn take_response(&self, endpoint: &str) -> Option<Vec<u8>> {
        self.responses.write().await.remove(endpoint)
    }
}

impl Default for BlePeerSession {
    fn default() -> Self {
        Self::new()
    }
}
