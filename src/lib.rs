//! WiFi Provisioning Service
//!
//! Onboards a headless device onto a WiFi network: a short-lived BLE
//! provisioning session receives credentials from a nearby peer, the
//! station supervisor validates them against the access point, and a
//! ready signal releases the application once an IP address is acquired.

pub mod backend;
pub mod config;
pub mod core;
pub mod transport;

pub use crate::core::{
    error::{EndpointError, LinkError, ServiceError, TransportError},
    ready::ReadySignal,
    types::{
        ConnectionState, ConnectionStatus, CredentialFailure, DisconnectReason, SecurityMode,
        SessionState, WifiCredentials,
    },
};
