//! Station connection supervisor with state machine
//!
//! Owns association and the reconnection policy once credentials are
//! known. Retry on disconnect is immediate, unconditional, and unbounded;
//! a device being onboarded has a human nearby, so the simple policy wins
//! over backoff.

use std::{net::Ipv4Addr, sync::Arc};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    backend::LinkDriver,
    core::{
        error::{ServiceError, ServiceResult},
        ready::ReadySignal,
        types::{ConnectionState, ConnectionStatus, DisconnectReason, WifiCredentials},
    },
};

/// Connection state machine
#[derive(Debug)]
struct ConnectionStateMachine {
    state: ConnectionState,
    ssid: Option<String>,
    ip_address: Option<Ipv4Addr>,
    last_disconnect: Option<DisconnectReason>,
    /// Driver holds a network configuration and can reconnect on its own
    configured: bool,
}

impl ConnectionStateMachine {
    fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            ssid: None,
            ip_address: None,
            last_disconnect: None,
            configured: false,
        }
    }

    fn start_associating(&mut self, ssid: String) -> ServiceResult<()> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected => {
                self.state = ConnectionState::Associating;
                self.ssid = Some(ssid);
                self.ip_address = None;
                self.configured = true;
                Ok(())
            }
            _ => Err(ServiceError::AssociationInProgress),
        }
    }

    fn association_up(&mut self) -> bool {
        if self.state == ConnectionState::Associating {
            self.state = ConnectionState::AssociatedNoIp;
            self.last_disconnect = None;
            true
        } else {
            false
        }
    }

    fn ip_acquired(&mut self, addr: Ipv4Addr) -> bool {
        if self.state == ConnectionState::AssociatedNoIp {
            self.state = ConnectionState::Ready;
            self.ip_address = Some(addr);
            true
        } else {
            false
        }
    }

    fn disconnected(&mut self, reason: DisconnectReason) {
        self.state = ConnectionState::Disconnected;
        self.ip_address = None;
        self.last_disconnect = Some(reason);
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Idle;
        self.ssid = None;
        self.ip_address = None;
        self.configured = false;
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            ssid: self.ssid.clone(),
            ip_address: self.ip_address.map(|ip| ip.to_string()),
            last_disconnect: self.last_disconnect,
        }
    }
}

/// Station connection supervisor
pub struct ConnectionSupervisor<L: LinkDriver> {
    driver: Arc<L>,
    state: Arc<RwLock<ConnectionStateMachine>>,
    ready: ReadySignal,
}

impl<L: LinkDriver> ConnectionSupervisor<L> {
    /// Creates a supervisor over `driver`, raising `ready` on IP acquisition
    pub fn new(driver: Arc<L>, ready: ReadySignal) -> Self {
        Self {
            driver,
            state: Arc::new(RwLock::new(ConnectionStateMachine::new())),
            ready,
        }
    }

    pub fn driver(&self) -> &L {
        &self.driver
    }

    /// Arms the supervisor with credentials and starts association
    ///
    /// The credentials are consumed into the driver here and not retained;
    /// retries use the driver's own stored configuration.
    pub async fn apply_credentials(&self, credentials: WifiCredentials) -> ServiceResult<()> {
        self.state
            .write()
            .await
            .start_associating(credentials.ssid.clone())?;

        info!(ssid = %credentials.ssid, "associating");
        self.driver
            .associate(&credentials.ssid, &credentials.secret)
            .await
            .map_err(ServiceError::from)
    }

    /// Station interface came up
    pub async fn on_link_started(&self) {
        debug!("station interface started");
    }

    /// Link-layer association completed; IP acquisition is still pending
    pub async fn on_association_up(&self) {
        if self.state.write().await.association_up() {
            info!("associated, waiting for IP");
        } else {
            debug!("association event outside Associating, ignored");
        }
    }

    /// IP stack acquired an address; raises the ready signal once per epoch
    pub async fn on_ip_acquired(&self, addr: Ipv4Addr) {
        if self.state.write().await.ip_acquired(addr) {
            info!(ip = %addr, "network ready");
            self.ready.set();
        } else {
            debug!(ip = %addr, "IP event outside AssociatedNoIp, ignored");
        }
    }

    /// Link dropped or association failed; retries immediately, forever
    ///
    /// The unbounded retry is the policy, not an accident: every disconnect
    /// re-enters Associating with no cap and no backoff.
    pub async fn on_disconnect(&self, reason: DisconnectReason) -> ServiceResult<()> {
        {
            let mut sm = self.state.write().await;
            if !sm.configured {
                sm.last_disconnect = Some(reason);
                debug!(?reason, "disconnect while unprovisioned, staying idle");
                return Ok(());
            }

            if sm.state == ConnectionState::Ready {
                // Downstream waiters must re-wait for the next epoch
                self.ready.clear();
            }
            sm.disconnected(reason);
            sm.state = ConnectionState::Associating;
        }

        warn!(?reason, "link lost, reassociating");
        self.driver.reconnect().await.map_err(ServiceError::from)
    }

    /// Drops the armed configuration and returns to Idle
    ///
    /// Invoked when the peer's credentials were rejected: the device must
    /// not keep retrying a secret the access point refused.
    pub async fn abandon(&self) {
        self.state.write().await.reset();
        if let Err(e) = self.driver.disconnect().await {
            warn!("driver disconnect during abandon failed: {e}");
        }
        info!("association abandoned, awaiting new credentials");
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.state
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status()
    }

    pub fn ready(&self) -> ReadySignal {
        self.ready.clone()
    }
}
