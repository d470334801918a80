//! Link driver trait definition

use trait_variant::make;

use crate::core::error::LinkResult;

/// Abstraction over the station link layer (typically wpa_supplicant)
///
/// Commands only; asynchronous outcomes (association up, disconnects, IP
/// acquisition) arrive as [`LinkEvent`](crate::core::types::LinkEvent)s on
/// the channel the driver implementation was constructed with. This split
/// keeps the lifecycle state machines testable without hardware.
#[make(Send)]
pub trait LinkDriver: Sync + 'static {
    /// Reads the station MAC address
    ///
    /// Used to derive the advertised service name; fails when the hardware
    /// identity is not readable yet.
    async fn mac(&self) -> LinkResult<[u8; 6]>;

    /// Configures the driver with a network and starts association
    ///
    /// The driver retains the configuration; later `reconnect` calls reuse
    /// it without the credentials being passed again.
    async fn associate(&self, ssid: &str, secret: &str) -> LinkResult<()>;

    /// Re-attempts association with the stored configuration
    async fn reconnect(&self) -> LinkResult<()>;

    /// Drops the stored configuration and leaves the network
    async fn disconnect(&self) -> LinkResult<()>;
}
