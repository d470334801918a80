//! Mock link driver for testing

use std::{collections::HashMap, net::Ipv4Addr, sync::Arc};

use tokio::sync::{Mutex, mpsc};

use crate::backend::LinkDriver;
use crate::core::{
    error::{LinkError, LinkResult},
    types::{DisconnectReason, LinkEvent},
};

/// Internal state for the mock driver
struct MockState {
    mac: [u8; 6],
    identity_failure: bool,
    /// Simulated access points in range: SSID -> passphrase
    networks: HashMap<String, String>,
    assigned_ip: Ipv4Addr,
    stored: Option<(String, String)>,
    silent: bool,
    associate_calls: u32,
    reconnect_calls: u32,
    disconnect_calls: u32,
}

/// Mock link driver backed by a simulated access point table
///
/// With an event channel attached, `associate`/`reconnect` emit the link
/// events a real driver would: `Associated` + `IpAcquired` when the SSID
/// and passphrase match a configured network, `Disconnected` with the
/// matching reason otherwise. Without a channel it only records calls.
#[derive(Clone)]
pub struct MockLinkDriver {
    inner: Arc<Mutex<MockState>>,
    events: Option<mpsc::Sender<LinkEvent>>,
}

impl MockLinkDriver {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a mock that emits link events into `events`
    pub fn with_events(events: mpsc::Sender<LinkEvent>) -> Self {
        Self::build(Some(events))
    }

    fn build(events: Option<mpsc::Sender<LinkEvent>>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                mac: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
                identity_failure: false,
                networks: HashMap::new(),
                assigned_ip: Ipv4Addr::new(192, 168, 1, 100),
                stored: None,
                silent: false,
                associate_calls: 0,
                reconnect_calls: 0,
                disconnect_calls: 0,
            })),
            events,
        }
    }

    pub async fn set_mac(&self, mac: [u8; 6]) {
        self.inner.lock().await.mac = mac;
    }

    /// Configure the mock to fail MAC reads
    pub async fn set_identity_failure(&self, should_fail: bool) {
        self.inner.lock().await.identity_failure = should_fail;
    }

    /// Adds a simulated access point accepting the given passphrase
    pub async fn add_network(&self, ssid: impl Into<String>, secret: impl Into<String>) {
        self.inner
            .lock()
            .await
            .networks
            .insert(ssid.into(), secret.into());
    }

    pub async fn remove_network(&self, ssid: &str) {
        self.inner.lock().await.networks.remove(ssid);
    }

    pub async fn set_ip(&self, ip: Ipv4Addr) {
        self.inner.lock().await.assigned_ip = ip;
    }

    /// Stops emitting events; calls are still recorded
    pub async fn set_silent(&self, silent: bool) {
        self.inner.lock().await.silent = silent;
    }

    pub async fn associate_calls(&self) -> u32 {
        self.inner.lock().await.associate_calls
    }

    pub async fn reconnect_calls(&self) -> u32 {
        self.inner.lock().await.reconnect_calls
    }

    pub async fn disconnect_calls(&self) -> u32 {
        self.inner.lock().await.disconnect_calls
    }

    /// Emits the outcome of one association attempt against the AP table
    async fn emit_outcome(&self) {
        let (events, ip, verdict) = {
            let state = self.inner.lock().await;
            if state.silent {
                return;
            }
            let Some(events) = self.events.clone() else {
                return;
            };
            let Some((ssid, secret)) = state.stored.clone() else {
                return;
            };
            let verdict = match state.networks.get(&ssid) {
                None => Err(DisconnectReason::ApNotFound),
                Some(expected) if *expected != secret => Err(DisconnectReason::AuthFailure),
                Some(_) => Ok(()),
            };
            (events, state.assigned_ip, verdict)
        };

        match verdict {
            Ok(()) => {
                let _ = events.send(LinkEvent::Associated).await;
                let _ = events.send(LinkEvent::IpAcquired(ip)).await;
            }
            Err(reason) => {
                let _ = events.send(LinkEvent::Disconnected(reason)).await;
            }
        }
    }
}

impl Default for MockLinkDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkDriver for MockLinkDriver {
    async fn mac(&self) -> LinkResult<[u8; 6]> {
        let state = self.inner.lock().await;
        if state.identity_failure {
            Err(LinkError::DriverUnavailable("MAC not readable".into()))
        } else {
            Ok(state.mac)
        }
    }

    async fn associate(&self, ssid: &str, secret: &str) -> LinkResult<()> {
        {
            let mut state = self.inner.lock().await;
            state.associate_calls += 1;
            state.stored = Some((ssid.to_string(), secret.to_string()));
        }
        self.emit_outcome().await;
        Ok(())
    }

    async fn reconnect(&self) -> LinkResult<()> {
        {
            let mut state = self.inner.lock().await;
            state.reconnect_calls += 1;
            if state.stored.is_none() {
                return Err(LinkError::DriverUnavailable(
                    "no stored network configuration".into(),
                ));
            }
        }
        self.emit_outcome().await;
        Ok(())
    }

    async fn disconnect(&self) -> LinkResult<()> {
        let mut state = self.inner.lock().await;
        state.disconnect_calls += 1;
        state.stored = None;
        Ok(())
    }
}
