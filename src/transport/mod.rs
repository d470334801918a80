//! Provisioning transport layer

pub mod ble;
pub mod mock;
pub mod provisioning;

pub use mock::MockTransport;
pub use provisioning::{ProvisioningTransport, TransportConfig};
