use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::{Error, Result};
use crate::lease::MAX_POOL_SIZE;

/// Number of interfaces one process will serve.
pub const MAX_INTERFACES: usize = 4;

pub const DEFAULT_LEASE_DURATION_SECONDS: u32 = 600;

/// Lease duration used internally for `lease_duration_seconds = 0`.
pub const INFINITE_LEASE: u32 = u32::MAX;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub server_ip: Ipv4Addr,
    #[serde(default = "default_subnet_mask")]
    pub subnet_mask: Ipv4Addr,
    #[serde(default)]
    pub pool_start: Option<Ipv4Addr>,
    #[serde(default)]
    pub pool_end: Option<Ipv4Addr>,
    #[serde(default = "default_lease_duration")]
    pub lease_duration_seconds: u32,
    /// Network device the socket is bound to (Linux only).
    #[serde(default)]
    pub interface: Option<String>,
}

/// Settings of one interface after range derivation, as printed by
/// `show-config`.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSummary {
    pub server_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,
    pub pool_size: usize,
    /// `None` for an infinite lease.
    pub lease_duration_seconds: Option<u32>,
    pub interface: Option<String>,
}

fn default_subnet_mask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}

fn default_lease_duration() -> u32 {
    DEFAULT_LEASE_DURATION_SECONDS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interfaces: vec![InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10))],
        }
    }
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one interface must be configured".to_string(),
            ));
        }

        if self.interfaces.len() > MAX_INTERFACES {
            return Err(Error::InvalidConfig(format!(
                "{} interfaces configured, at most {} are supported",
                self.interfaces.len(),
                MAX_INTERFACES
            )));
        }

        for (index, interface) in self.interfaces.iter().enumerate() {
            interface.validate()?;

            if self.interfaces[..index]
                .iter()
                .any(|other| other.server_ip == interface.server_ip)
            {
                return Err(Error::InvalidConfig(format!(
                    "server_ip {} is configured on more than one interface",
                    interface.server_ip
                )));
            }
        }

        Ok(())
    }
}

impl InterfaceConfig {
    /// Interface with default mask and lease, and a range derived from
    /// `server_ip`.
    pub fn new(server_ip: Ipv4Addr) -> Self {
        Self {
            server_ip,
            subnet_mask: default_subnet_mask(),
            pool_start: None,
            pool_end: None,
            lease_duration_seconds: DEFAULT_LEASE_DURATION_SECONDS,
            interface: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let host_mask = !u32::from(self.subnet_mask);
        if host_mask & host_mask.wrapping_add(1) != 0 {
            return Err(Error::InvalidConfig(format!(
                "{}: subnet_mask {} is not contiguous",
                self.server_ip, self.subnet_mask
            )));
        }

        let (start, end) = self.address_range()?;
        let (start, end) = (u32::from(start), u32::from(end));

        if start > end {
            return Err(Error::InvalidConfig(format!(
                "{}: pool_start must be less than or equal to pool_end",
                self.server_ip
            )));
        }

        let server = u32::from(self.server_ip);
        if server >= start && server <= end {
            return Err(Error::InvalidConfig(format!(
                "{}: server_ip must not be within the pool range",
                self.server_ip
            )));
        }

        if let Some(name) = &self.interface
            && name.is_empty()
        {
            return Err(Error::InvalidConfig(format!(
                "{}: interface name must not be empty",
                self.server_ip
            )));
        }

        Ok(())
    }

    /// Returns the range of addresses to hand out.
    ///
    /// An explicit `pool_start`/`pool_end` pair is returned as configured. If
    /// neither is set the range is derived from the host part of the server
    /// IP within `subnet_mask`. In the upper half of the subnet the pool sits
    /// below the server (first host up to the server minus one), otherwise
    /// above it (server plus one up to the last host before broadcast). On
    /// a `/24` that is `.1` to server - 1 from `.128` up, server + 1 to
    /// `.254` below. A derived range is limited to [`MAX_POOL_SIZE`]
    /// addresses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if only one of the bounds is set, or
    /// if the range must be derived and the subnet is `/31` or smaller.
    pub fn address_range(&self) -> Result<(Ipv4Addr, Ipv4Addr)> {
        match (self.pool_start, self.pool_end) {
            (Some(start), Some(end)) => Ok((start, end)),
            (None, None) => self.derived_range(),
            _ => Err(Error::InvalidConfig(format!(
                "{}: pool_start and pool_end must be set together",
                self.server_ip
            ))),
        }
    }

    /// Lease duration in seconds; `0` in the file means infinite.
    pub fn lease_duration(&self) -> u32 {
        match self.lease_duration_seconds {
            0 => INFINITE_LEASE,
            seconds => seconds,
        }
    }

    pub fn summary(&self) -> Result<InterfaceSummary> {
        let (range_start, range_end) = self.address_range()?;
        let range_size = u64::from(u32::from(range_end))
            .saturating_sub(u64::from(u32::from(range_start)))
            + 1;
        let pool_size = range_size.min(MAX_POOL_SIZE as u64) as usize;
        let range_end = Ipv4Addr::from(u32::from(range_start) + pool_size as u32 - 1);

        let lease = self.lease_duration();
        Ok(InterfaceSummary {
            server_ip: self.server_ip,
            subnet_mask: self.subnet_mask,
            range_start,
            range_end,
            pool_size,
            lease_duration_seconds: (lease != INFINITE_LEASE).then_some(lease),
            interface: self.interface.clone(),
        })
    }

    fn derived_range(&self) -> Result<(Ipv4Addr, Ipv4Addr)> {
        let server = u32::from(self.server_ip);
        let host_mask = !u32::from(self.subnet_mask);
        if host_mask < 3 {
            return Err(Error::InvalidConfig(format!(
                "{}: subnet {} leaves no room for a derived pool",
                self.server_ip, self.subnet_mask
            )));
        }

        let network = server & !host_mask;
        let host = server & host_mask;

        let (start, end) = if host > host_mask / 2 {
            (network | 1, server - 1)
        } else {
            (server + 1, network | (host_mask - 1))
        };

        let end = end.min(start.saturating_add(MAX_POOL_SIZE as u32 - 1));
        Ok((Ipv4Addr::from(start), Ipv4Addr::from(end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestGuard(String);
    impl Drop for TestGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let path = "test_config_create.json".to_string();
        let _guard = TestGuard(path.clone());

        let config = Config::load_or_create(&path).unwrap();
        assert_eq!(config.interfaces, Config::default().interfaces);
        assert!(Path::new(&path).exists());

        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded.interfaces, config.interfaces);
    }

    #[test]
    fn test_load_applies_field_defaults() {
        let path = "test_config_defaults.json".to_string();
        let _guard = TestGuard(path.clone());
        std::fs::write(&path, r#"{"interfaces":[{"server_ip":"10.0.0.200"}]}"#).unwrap();

        let config = Config::load_or_create(&path).unwrap();
        let interface = &config.interfaces[0];
        assert_eq!(interface.subnet_mask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(interface.lease_duration_seconds, 600);
        assert_eq!(interface.pool_start, None);
        assert_eq!(interface.interface, None);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let path = "test_config_invalid.json".to_string();
        let _guard = TestGuard(path.clone());
        std::fs::write(&path, r#"{"interfaces":[]}"#).unwrap();

        assert!(matches!(
            Config::load_or_create(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let path = "test_config_bad_json.json".to_string();
        let _guard = TestGuard(path.clone());
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load_or_create(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_derived_range_above_server() {
        let interface = InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10));
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(192, 168, 0, 11), Ipv4Addr::new(192, 168, 0, 42))
        );
    }

    #[test]
    fn test_derived_range_below_server() {
        let interface = InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 200));
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(192, 168, 0, 1), Ipv4Addr::new(192, 168, 0, 32))
        );
    }

    #[test]
    fn test_derived_range_boundary_octet() {
        let interface = InterfaceConfig::new(Ipv4Addr::new(192, 168, 5, 128));
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(192, 168, 5, 1), Ipv4Addr::new(192, 168, 5, 32))
        );

        let interface = InterfaceConfig::new(Ipv4Addr::new(192, 168, 5, 127));
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(192, 168, 5, 128), Ipv4Addr::new(192, 168, 5, 159))
        );
    }

    #[test]
    fn test_derived_range_follows_subnet_mask() {
        let interface = InterfaceConfig {
            subnet_mask: Ipv4Addr::new(255, 255, 0, 0),
            ..InterfaceConfig::new(Ipv4Addr::new(10, 1, 200, 5))
        };
        // Host part 200.5 sits in the upper half of the /16.
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(10, 1, 0, 1), Ipv4Addr::new(10, 1, 0, 32))
        );

        let interface = InterfaceConfig {
            subnet_mask: Ipv4Addr::new(255, 255, 255, 240),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 17))
        };
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(192, 168, 0, 18), Ipv4Addr::new(192, 168, 0, 30))
        );

        let interface = InterfaceConfig {
            subnet_mask: Ipv4Addr::new(255, 255, 255, 240),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 30))
        };
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(192, 168, 0, 17), Ipv4Addr::new(192, 168, 0, 29))
        );
        assert!(interface.validate().is_ok());
    }

    #[test]
    fn test_derived_range_needs_room() {
        let interface = InterfaceConfig {
            subnet_mask: Ipv4Addr::new(255, 255, 255, 254),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 2))
        };
        assert!(matches!(
            interface.address_range(),
            Err(Error::InvalidConfig(_))
        ));

        let interface = InterfaceConfig {
            pool_start: Some(Ipv4Addr::new(192, 168, 0, 3)),
            pool_end: Some(Ipv4Addr::new(192, 168, 0, 3)),
            ..interface
        };
        assert!(interface.validate().is_ok());
    }

    #[test]
    fn test_non_contiguous_mask_rejected() {
        let interface = InterfaceConfig {
            subnet_mask: Ipv4Addr::new(255, 0, 255, 0),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10))
        };
        assert!(matches!(interface.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_explicit_range_not_capped() {
        let interface = InterfaceConfig {
            pool_start: Some(Ipv4Addr::new(192, 168, 0, 1)),
            pool_end: Some(Ipv4Addr::new(192, 168, 0, 254)),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 1, 1))
        };
        assert_eq!(
            interface.address_range().unwrap(),
            (Ipv4Addr::new(192, 168, 0, 1), Ipv4Addr::new(192, 168, 0, 254))
        );
        assert!(interface.validate().is_ok());

        let summary = interface.summary().unwrap();
        assert_eq!(summary.pool_size, MAX_POOL_SIZE);
        assert_eq!(summary.range_end, Ipv4Addr::new(192, 168, 0, 32));
    }

    #[test]
    fn test_half_open_range_rejected() {
        let interface = InterfaceConfig {
            pool_start: Some(Ipv4Addr::new(192, 168, 0, 100)),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 1))
        };
        assert!(matches!(
            interface.address_range(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_pool_start_greater_than_end() {
        let interface = InterfaceConfig {
            pool_start: Some(Ipv4Addr::new(192, 168, 0, 200)),
            pool_end: Some(Ipv4Addr::new(192, 168, 0, 100)),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 1))
        };
        assert!(interface.validate().is_err());
    }

    #[test]
    fn test_server_ip_in_pool() {
        let interface = InterfaceConfig {
            pool_start: Some(Ipv4Addr::new(192, 168, 0, 1)),
            pool_end: Some(Ipv4Addr::new(192, 168, 0, 20)),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10))
        };
        assert!(interface.validate().is_err());
    }

    #[test]
    fn test_empty_interface_name_rejected() {
        let interface = InterfaceConfig {
            interface: Some(String::new()),
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10))
        };
        assert!(interface.validate().is_err());
    }

    #[test]
    fn test_duplicate_server_ip() {
        let config = Config {
            interfaces: vec![
                InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10)),
                InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10)),
            ],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interface_count_limits() {
        let config = Config {
            interfaces: Vec::new(),
        };
        assert!(config.validate().is_err());

        let interfaces: Vec<_> = (1..=MAX_INTERFACES as u8)
            .map(|n| InterfaceConfig::new(Ipv4Addr::new(10, 0, n, 1)))
            .collect();
        let mut config = Config { interfaces };
        assert!(config.validate().is_ok());

        config
            .interfaces
            .push(InterfaceConfig::new(Ipv4Addr::new(10, 0, 99, 1)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_lease_is_infinite() {
        let interface = InterfaceConfig {
            lease_duration_seconds: 0,
            ..InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10))
        };
        assert_eq!(interface.lease_duration(), INFINITE_LEASE);
        assert_eq!(interface.summary().unwrap().lease_duration_seconds, None);

        let interface = InterfaceConfig::new(Ipv4Addr::new(192, 168, 0, 10));
        assert_eq!(interface.lease_duration(), 600);
        assert_eq!(interface.summary().unwrap().lease_duration_seconds, Some(600));
    }
}
