//! Domain types for the provisioning and connection lifecycle

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// WiFi credentials received from the provisioning peer
///
/// Held only until the association attempt resolves; the secret is wiped
/// on drop. Persistence, if any, is the credential store's business.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WifiCredentials {
    /// Network SSID
    pub ssid: String,
    /// Network passphrase
    pub secret: String,
}

impl WifiCredentials {
    pub fn new(ssid: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Provisioning session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Advertising,
    CredentialsPending,
    Validating,
    Success,
    Failure,
    TearingDown,
}

impl SessionState {
    /// Whether a session exists and has not begun teardown
    ///
    /// Endpoint registration is only valid inside this window.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Uninitialized | SessionState::TearingDown)
    }
}

/// Station connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Associating = 1,
    AssociatedNoIp = 2,
    Ready = 3,
    Disconnected = 4,
}

impl TryFrom<u8> for ConnectionState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0 => Ok(ConnectionState::Idle),
            1 => Ok(ConnectionState::Associating),
            2 => Ok(ConnectionState::AssociatedNoIp),
            3 => Ok(ConnectionState::Ready),
            4 => Ok(ConnectionState::Disconnected),
            _ => Err(()),
        }
    }
}

impl From<ConnectionState> for u8 {
    fn from(state: ConnectionState) -> Self {
        state as u8
    }
}

/// Why the peer's credentials were rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialFailure {
    /// The access point rejected the passphrase
    AuthError,
    /// No access point with the submitted SSID was found
    ApNotFound,
}

impl std::fmt::Display for CredentialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialFailure::AuthError => write!(f, "authentication failed"),
            CredentialFailure::ApNotFound => write!(f, "access point not found"),
        }
    }
}

/// Why the link layer dropped (or never completed) an association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Authentication with the access point failed
    AuthFailure,
    /// The access point was not found during association
    ApNotFound,
    /// The association attempt failed for a transient reason
    AssocFailed,
    /// An established link was lost
    ConnectionLost,
}

impl DisconnectReason {
    /// Maps this reason onto a credential rejection, if it is one
    ///
    /// Only meaningful while a provisioning session is validating; the same
    /// reasons after validation are ordinary link loss and get retried.
    pub fn credential_failure(&self) -> Option<CredentialFailure> {
        match self {
            DisconnectReason::AuthFailure => Some(CredentialFailure::AuthError),
            DisconnectReason::ApNotFound => Some(CredentialFailure::ApNotFound),
            DisconnectReason::AssocFailed | DisconnectReason::ConnectionLost => None,
        }
    }
}

/// Outcome of validating the peer's credentials against the access point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Succeeded,
    Failed(CredentialFailure),
}

/// Security mode of the provisioning session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No session authentication
    Open,
    /// Peer must prove possession of a shared secret
    ProofOfPossession,
}

/// Events emitted by the link/IP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The station interface started
    Started,
    /// Association with the access point completed
    Associated,
    /// The link dropped or the association attempt failed
    Disconnected(DisconnectReason),
    /// The IP stack acquired an address
    IpAcquired(Ipv4Addr),
}

/// Events emitted by the provisioning transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A peer opened a secure session
    Started,
    /// The peer submitted WiFi credentials
    CredentialsReceived(WifiCredentials),
    /// The peer closed its session
    Ended,
}

/// Station status snapshot, exposed to the provisioning peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current connection state
    pub state: ConnectionState,
    /// SSID of the network being joined (if any)
    pub ssid: Option<String>,
    /// Acquired IP address (once Ready)
    pub ip_address: Option<String>,
    /// Reason for the most recent disconnect (if any)
    pub last_disconnect: Option<DisconnectReason>,
}

/// Identifier for one request/response exchange on the provisioning transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_roundtrip() {
        for state in [
            ConnectionState::Idle,
            ConnectionState::Associating,
            ConnectionState::AssociatedNoIp,
            ConnectionState::Ready,
            ConnectionState::Disconnected,
        ] {
            assert_eq!(ConnectionState::try_from(u8::from(state)), Ok(state));
        }
        assert!(ConnectionState::try_from(5).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secret() {
        let creds = WifiCredentials::new("HomeNet", "hunter2");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("HomeNet"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_disconnect_reason_classification() {
        assert_eq!(
            DisconnectReason::AuthFailure.credential_failure(),
            Some(CredentialFailure::AuthError)
        );
        assert_eq!(
            DisconnectReason::ApNotFound.credential_failure(),
            Some(CredentialFailure::ApNotFound)
        );
        assert_eq!(DisconnectReason::ConnectionLost.credential_failure(), None);
        assert_eq!(DisconnectReason::AssocFailed.credential_failure(), None);
    }

    #[test]
    fn test_session_state_active_window() {
        assert!(!SessionState::Uninitialized.is_active());
        assert!(!SessionState::TearingDown.is_active());
        assert!(SessionState::Starting.is_active());
        assert!(SessionState::Advertising.is_active());
        assert!(SessionState::Validating.is_active());
        assert!(SessionState::Success.is_active());
    }
}
