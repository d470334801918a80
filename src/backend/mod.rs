//! Link layer and persistence abstraction

pub mod credential_store;
pub mod link_driver;
pub mod mock_link;
pub mod wifi_ctrl_link;

pub use credential_store::{CredentialStore, MockCredentialStore};
pub use link_driver::LinkDriver;
pub use mock_link::MockLinkDriver;
pub use wifi_ctrl_link::WifiCtrlLink;
