//! Command-line argument parsing

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "wifi-provisioning", version, author)]
#[clap(about = "Onboards a headless device onto WiFi via a BLE provisioning session")]
pub struct CliArgs {
    /// Wireless network interface name
    #[clap(short, long, default_value = "wlan0")]
    pub interface: String,

    /// Proof-of-possession secret; omitting it runs the session unauthenticated
    #[clap(short, long)]
    pub pop: Option<String>,

    /// Service identifier advertised to provisioning peers (UUID)
    #[clap(long)]
    pub service_uuid: Option<String>,

    /// Custom data endpoint names to expose during provisioning
    #[clap(long = "endpoint", default_values_t = ["custom-data".to_string()])]
    pub endpoints: Vec<String>,

    /// Delay between validation success and transport release (milliseconds)
    #[clap(long, default_value = "500")]
    pub settle_ms: u64,

    /// Run a provisioning session even when stored credentials exist
    #[clap(long)]
    pub always_provision: bool,
}
