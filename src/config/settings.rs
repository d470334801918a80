//! Runtime settings

use std::time::Duration;

use crate::config::CliArgs;
use crate::core::session::{DEFAULT_SERVICE_UUID, ProvisioningSettings};
use crate::core::types::SecurityMode;

/// Runtime configuration settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub interface: String,
    pub provisioning: ProvisioningSettings,
}

impl From<CliArgs> for Settings {
    fn from(args: CliArgs) -> Self {
        let service_uuid = args
            .service_uuid
            .as_deref()
            .and_then(|raw| uuid::Uuid::parse_str(raw).ok())
            .unwrap_or(DEFAULT_SERVICE_UUID);

        let security = if args.pop.is_some() {
            SecurityMode::ProofOfPossession
        } else {
            SecurityMode::Open
        };

        Settings {
            interface: args.interface,
            provisioning: ProvisioningSettings {
                security,
                proof_of_possession: args.pop,
                service_uuid,
                endpoints: args.endpoints,
                settle_delay: Duration::from_millis(args.settle_ms),
                always_provision: args.always_provision,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let args = CliArgs::parse_from(["wifi-provisioning"]);
        let settings = Settings::from(args);

        assert_eq!(settings.interface, "wlan0");
        assert_eq!(settings.provisioning.security, SecurityMode::Open);
        assert_eq!(settings.provisioning.service_uuid, DEFAULT_SERVICE_UUID);
        assert_eq!(
            settings.provisioning.endpoints,
            vec!["custom-data".to_string()]
        );
        assert_eq!(
            settings.provisioning.settle_delay,
            Duration::from_millis(500)
        );
        assert!(!settings.provisioning.always_provision);
    }

    #[test]
    fn test_pop_enables_proof_of_possession() {
        let args = CliArgs::parse_from(["wifi-provisioning", "--pop", "abcd1234"]);
        let settings = Settings::from(args);

        assert_eq!(
            settings.provisioning.security,
            SecurityMode::ProofOfPossession
        );
        assert_eq!(
            settings.provisioning.proof_of_possession,
            Some("abcd1234".to_string())
        );
    }

    #[test]
    fn test_service_uuid_parsing() {
        let args = CliArgs::parse_from([
            "wifi-provisioning",
            "--service-uuid",
            "021a9004-0382-4aea-bff4-6b3f1c5adfb4",
        ]);
        let settings = Settings::from(args);
        assert_eq!(settings.provisioning.service_uuid, DEFAULT_SERVICE_UUID);
    }

    #[test]
    fn test_invalid_service_uuid_falls_back_to_default() {
        let args = CliArgs::parse_from(["wifi-provisioning", "--service-uuid", "not-a-uuid"]);
        let settings = Settings::from(args);
        assert_eq!(settings.provisioning.service_uuid, DEFAULT_SERVICE_UUID);
    }

    #[test]
    fn test_multiple_endpoints() {
        let args = CliArgs::parse_from([
            "wifi-provisioning",
            "--endpoint",
            "custom-data",
            "--endpoint",
            "telemetry",
        ]);
        let settings = Settings::from(args);
        assert_eq!(
            settings.provisioning.endpoints,
            vec!["custom-data".to_string(), "telemetry".to_string()]
        );
    }
}
