//! Network port configuration: the settings that are live and the settings
//! that will apply after a restart.
//!
//! The listeners bind once at startup.  Changing a port from the UI therefore
//! never rebinds anything: [`NetworkConfigManager::stage`] validates the
//! candidate and records it as the *staged* generation, and tells the caller
//! whether a restart is needed for it to take effect.  The *active*
//! generation is what the process actually bound and never changes while it
//! runs.

use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;
use tracing::info;

/// Lowest port an unprivileged process may bind.
pub const MIN_UNPRIVILEGED_PORT: u16 = 1024;

pub const DEFAULT_CONTROL_PORT: u16 = 24800;
pub const DEFAULT_INPUT_PORT: u16 = 24801;
pub const DEFAULT_DISCOVERY_PORT: u16 = 24802;

/// Error type for network configuration changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkConfigError {
    #[error("{name} port {port} is in the privileged range (must be >= {MIN_UNPRIVILEGED_PORT})")]
    PrivilegedPort { name: &'static str, port: u16 },

    #[error("{first} and {second} ports must differ (both are {port})")]
    DuplicatePort {
        first: &'static str,
        second: &'static str,
        port: u16,
    },

    #[error("invalid bind address: {0:?}")]
    InvalidBindAddress(String),
}

/// One generation of network settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Connection-oriented handshake and command channel.
    pub control_port: u16,
    /// Connectionless, high-frequency pointer channel.
    pub input_port: u16,
    /// Connectionless broadcast channel for peer discovery.
    pub discovery_port: u16,
    pub bind_address: IpAddr,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            input_port: DEFAULT_INPUT_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl NetworkSettings {
    /// Builds settings from raw parts, parsing `bind_address` and validating.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkConfigError::InvalidBindAddress`] if the address does
    /// not parse, or any error of [`NetworkSettings::validate`].
    pub fn from_parts(
        control_port: u16,
        input_port: u16,
        discovery_port: u16,
        bind_address: &str,
    ) -> Result<Self, NetworkConfigError> {
        let bind_address = bind_address
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| NetworkConfigError::InvalidBindAddress(bind_address.to_string()))?;
        let settings = Self {
            control_port,
            input_port,
            discovery_port,
            bind_address,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every port is unprivileged and that no two ports collide.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), NetworkConfigError> {
        let ports = self.named_ports();

        for (name, port) in ports {
            if port < MIN_UNPRIVILEGED_PORT {
                return Err(NetworkConfigError::PrivilegedPort { name, port });
            }
        }
        for (i, (first, a)) in ports.iter().enumerate() {
            if let Some((second, _)) = ports[i + 1..].iter().find(|(_, b)| b == a) {
                return Err(NetworkConfigError::DuplicatePort {
                    first,
                    second,
                    port: *a,
                });
            }
        }
        Ok(())
    }

    fn named_ports(&self) -> [(&'static str, u16); 3] {
        [
            ("control", self.control_port),
            ("input", self.input_port),
            ("discovery", self.discovery_port),
        ]
    }
}

/// Holds the active and staged generations of [`NetworkSettings`].
#[derive(Debug, Clone)]
pub struct NetworkConfigManager {
    active: NetworkSettings,
    staged: NetworkSettings,
}

impl NetworkConfigManager {
    /// Starts with `initial` as both the active and the staged generation.
    pub fn new(initial: NetworkSettings) -> Self {
        Self {
            active: initial,
            staged: initial,
        }
    }

    /// The settings the running listeners were bound with.
    pub fn get_active(&self) -> NetworkSettings {
        self.active
    }

    /// The settings that will apply after the next restart.
    pub fn get_staged(&self) -> NetworkSettings {
        self.staged
    }

    /// Whether the staged generation differs from the active one.
    pub fn restart_required(&self) -> bool {
        self.staged != self.active
    }

    /// Validates `candidate` and records it as the staged generation.
    ///
    /// Returns `true` when the staged settings now differ from the active
    /// ones, meaning a restart is required.
    ///
    /// # Errors
    ///
    /// Returns the validation error; the staged generation is unchanged.
    pub fn stage(&mut self, candidate: NetworkSettings) -> Result<bool, NetworkConfigError> {
        candidate.validate()?;
        self.staged = candidate;
        let restart_required = self.restart_required();
        info!(
            control_port = candidate.control_port,
            input_port = candidate.input_port,
            discovery_port = candidate.discovery_port,
            bind_address = %candidate.bind_address,
            restart_required,
            "network settings staged"
        );
        Ok(restart_required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(control: u16, input: u16, discovery: u16) -> NetworkSettings {
        NetworkSettings {
            control_port: control,
            input_port: input,
            discovery_port: discovery,
            ..NetworkSettings::default()
        }
    }

    #[test]
    fn test_default_settings_use_documented_ports() {
        let s = NetworkSettings::default();
        assert_eq!((s.control_port, s.input_port, s.discovery_port), (24800, 24801, 24802));
        assert_eq!(s.bind_address.to_string(), "0.0.0.0");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_privileged_port() {
        assert_eq!(
            settings(80, 24801, 24802).validate(),
            Err(NetworkConfigError::PrivilegedPort {
                name: "control",
                port: 80
            })
        );
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        assert!(matches!(
            settings(24800, 0, 24802).validate(),
            Err(NetworkConfigError::PrivilegedPort { name: "input", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_ports() {
        assert_eq!(
            settings(24800, 24801, 24800).validate(),
            Err(NetworkConfigError::DuplicatePort {
                first: "control",
                second: "discovery",
                port: 24800
            })
        );
    }

    #[test]
    fn test_from_parts_rejects_unparseable_bind_address() {
        assert!(matches!(
            NetworkSettings::from_parts(24800, 24801, 24802, "not-an-ip"),
            Err(NetworkConfigError::InvalidBindAddress(_))
        ));
    }

    #[test]
    fn test_from_parts_accepts_ipv6_address() {
        let s = NetworkSettings::from_parts(24800, 24801, 24802, "::1").unwrap();
        assert!(s.bind_address.is_ipv6());
    }

    #[test]
    fn test_stage_records_candidate_without_touching_active() {
        // Arrange
        let mut manager = NetworkConfigManager::new(NetworkSettings::default());

        // Act
        let restart_required = manager.stage(settings(25800, 25801, 25802)).unwrap();

        // Assert
        assert!(restart_required);
        assert_eq!(manager.get_active(), NetworkSettings::default());
        assert_eq!(manager.get_staged().control_port, 25800);
    }

    #[test]
    fn test_stage_same_as_active_needs_no_restart() {
        let mut manager = NetworkConfigManager::new(NetworkSettings::default());
        manager.stage(settings(25800, 25801, 25802)).unwrap();

        let restart_required = manager.stage(NetworkSettings::default()).unwrap();

        assert!(!restart_required);
        assert!(!manager.restart_required());
    }

    #[test]
    fn test_stage_invalid_candidate_keeps_previous_staged() {
        let mut manager = NetworkConfigManager::new(NetworkSettings::default());
        manager.stage(settings(25800, 25801, 25802)).unwrap();

        let result = manager.stage(settings(25800, 25800, 25802));

        assert!(result.is_err());
        assert_eq!(manager.get_staged(), settings(25800, 25801, 25802));
    }
}
