//! wifi-ctrl link driver implementation
//!
//! Drives wpa_supplicant through its control socket and forwards its
//! broadcast events into the coordinator's `LinkEvent` channel.

use std::net::Ipv4Addr;

use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};
use wifi_ctrl::sta::{Broadcast, BroadcastReceiver, RequestClient, WifiSetup};

use crate::{
    backend::LinkDriver,
    core::{
        error::{LinkError, LinkResult},
        types::{DisconnectReason, LinkEvent},
    },
};

const IP_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);
const IP_POLL_RETRIES: usize = 50; // 50 * 200ms = 10 seconds of DHCP patience

pub struct WifiCtrlLink {
    interface: String,
    client: RequestClient,
}

impl WifiCtrlLink {
    /// Connects to wpa_supplicant on `interface` and starts event forwarding
    pub async fn new(interface: String, events: mpsc::Sender<LinkEvent>) -> LinkResult<Self> {
        let path = format!("/var/run/wpa_supplicant/{}", interface);
        let mut setup =
            WifiSetup::new().map_err(|e| LinkError::DriverUnavailable(e.to_string()))?;
        setup.set_socket_path(path);

        let client = setup.get_request_client();
        let broadcast_receiver = setup.get_broadcast_receiver();
        let station = setup.complete();

        // Supplicant runtime
        tokio::spawn(async move {
            if let Err(e) = station.run().await {
                error!("WifiStation runtime error: {}", e);
            }
        });

        // Broadcast -> LinkEvent forwarder
        tokio::spawn(forward_events(
            broadcast_receiver,
            events.clone(),
            interface.clone(),
        ));

        if events.send(LinkEvent::Started).await.is_err() {
            warn!("link event channel closed before startup");
        }

        Ok(Self { interface, client })
    }
}

impl LinkDriver for WifiCtrlLink {
    async fn mac(&self) -> LinkResult<[u8; 6]> {
        let path = format!("/sys/class/net/{}/address", self.interface);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LinkError::IdentityUnavailable(format!("{}: {}", path, e)))?;
        parse_mac(raw.trim())
            .ok_or_else(|| LinkError::IdentityUnavailable(format!("malformed MAC {:?}", raw)))
    }

    async fn associate(&self, ssid: &str, secret: &str) -> LinkResult<()> {
        debug!(%ssid, "configuring network");

        if ssid.is_empty() || ssid.len() > 32 {
            return Err(LinkError::InvalidSsid(ssid.to_string()));
        }

        let network_id = self
            .client
            .add_network()
            .await
            .map_err(|e| LinkError::AssociationFailed(format!("add_network: {}", e)))?;

        self.client
            .set_network_ssid(network_id, ssid.to_string())
            .await
            .map_err(|e| LinkError::AssociationFailed(format!("set ssid: {}", e)))?;

        // Quoted passphrase; wpa_supplicant derives the PSK itself
        self.client
            .set_network_psk(network_id, format!("\"{}\"", secret))
            .await
            .map_err(|e| LinkError::AssociationFailed(format!("set psk: {}", e)))?;

        self.client
            .select_network(network_id)
            .await
            .map_err(|e| LinkError::AssociationFailed(format!("select network: {}", e)))?;

        if let Err(e) = self.client.save_config().await {
            warn!("failed to save wpa_supplicant config: {}", e);
        }

        debug!("association initiated");
        Ok(())
    }

    async fn reconnect(&self) -> LinkResult<()> {
        self.client
            .send_custom("RECONNECT".to_string())
            .await
            .map_err(|e| LinkError::AssociationFailed(format!("reconnect: {}", e)))?;
        Ok(())
    }

    async fn disconnect(&self) -> LinkResult<()> {
        debug!("disconnecting");
        self.client
            .send_custom("DISCONNECT".to_string())
            .await
            .map_err(|e| LinkError::DriverUnavailable(format!("disconnect: {}", e)))?;
        Ok(())
    }
}

/// Forwards supplicant broadcasts as link events, polling for the IPv4
/// address once the link comes up
async fn forward_events(
    mut receiver: BroadcastReceiver,
    events: mpsc::Sender<LinkEvent>,
    interface: String,
) {
    loop {
        match receiver.recv().await {
            Ok(Broadcast::Connected) => {
                if events.send(LinkEvent::Associated).await.is_err() {
                    break;
                }
                if let Some(ip) = poll_ipv4(&interface).await {
                    if events.send(LinkEvent::IpAcquired(ip)).await.is_err() {
                        break;
                    }
                } else {
                    warn!("associated but no IPv4 address appeared");
                }
            }
            Ok(Broadcast::WrongPsk) => {
                let event = LinkEvent::Disconnected(DisconnectReason::AuthFailure);
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Broadcast::NetworkNotFound) => {
                let event = LinkEvent::Disconnected(DisconnectReason::ApNotFound);
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Broadcast::Disconnected) => {
                let event = LinkEvent::Disconnected(DisconnectReason::ConnectionLost);
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(other) => {
                debug!(?other, "ignoring supplicant broadcast");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("supplicant broadcast receiver lagged by {}", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                warn!("supplicant broadcast channel closed");
                break;
            }
        }
    }
}

/// Polls `ip -4 addr show` until the interface has an address
async fn poll_ipv4(interface: &str) -> Option<Ipv4Addr> {
    for _ in 0..IP_POLL_RETRIES {
        let output = Command::new("ip")
            .args(["-4", "addr", "show", interface])
            .output()
            .await
            .ok()?;
        if let Some(ip) = parse_ipv4_addr(&String::from_utf8_lossy(&output.stdout)) {
            return Some(ip);
        }
        tokio::time::sleep(IP_POLL_INTERVAL).await;
    }
    None
}

/// Extracts the first `inet` address from `ip -4 addr show` output
fn parse_ipv4_addr(stdout: &str) -> Option<Ipv4Addr> {
    for line in stdout.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("inet ") {
            let addr = rest.split_whitespace().next()?.split('/').next()?;
            if let Ok(ip) = addr.parse() {
                return Some(ip);
            }
        }
    }
    None
}

/// Parses a sysfs "aa:bb:cc:dd:ee:ff" MAC string
fn parse_mac(raw: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = raw.split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac() {
        assert_eq!(
            parse_mac("aa:bb:cc:dd:ee:ff"),
            Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])
        );
        assert_eq!(parse_mac("00:11:22:33:44:55"), Some([0, 0x11, 0x22, 0x33, 0x44, 0x55]));
    }

    #[test]
    fn test_parse_mac_malformed() {
        assert_eq!(parse_mac(""), None);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee"), None);
        assert_eq!(parse_mac("aa:bb:cc:dd:ee:ff:00"), None);
        assert_eq!(parse_mac("zz:bb:cc:dd:ee:ff"), None);
    }

    #[test]
    fn test_parse_ipv4_addr() {
        let stdout = "\
3: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP\n\
    inet 192.168.1.42/24 brd 192.168.1.255 scope global dynamic wlan0\n\
       valid_lft 86391sec preferred_lft 86391sec\n";
        assert_eq!(
            parse_ipv4_addr(stdout),
            Some(Ipv4Addr::new(192, 168, 1, 42))
        );
    }

    #[test]
    fn test_parse_ipv4_addr_no_address() {
        let stdout = "3: wlan0: <BROADCAST,MULTICAST> mtu 1500 qdisc noqueue state DOWN\n";
        assert_eq!(parse_ipv4_addr(stdout), None);
    }
}
