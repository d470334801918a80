//! Device identity provider
//!
//! Derives the advertised service name from the station MAC address so a
//! phone can tell nearby unprovisioned devices apart.

use crate::{
    backend::LinkDriver,
    core::error::{LinkError, LinkResult},
};

/// Prefix of every advertised service name
pub const SERVICE_NAME_PREFIX: &str = "PROV_";

/// Human-readable identifier a device advertises while unprovisioned
///
/// Fixed prefix plus six uppercase hex characters taken from the last
/// three bytes of the MAC. Unique enough for devices within BLE range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceName(String);

impl ServiceName {
    /// Builds a service name from a station MAC address
    pub fn from_mac(mac: &[u8; 6]) -> Self {
        Self(format!(
            "{}{}",
            SERVICE_NAME_PREFIX,
            hex::encode_upper(&mac[3..])
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives the service name from the link driver's MAC address
///
/// Read-only; fails with `IdentityUnavailable` when the hardware identity
/// cannot be read yet. Callers must not start a session on that failure.
pub async fn derive_service_name<L: LinkDriver>(driver: &L) -> LinkResult<ServiceName> {
    let mac = driver
        .mac()
        .await
        .map_err(|e| LinkError::IdentityUnavailable(e.to_string()))?;
    Ok(ServiceName::from_mac(&mac))
}
