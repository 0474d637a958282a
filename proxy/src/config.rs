//! Configuration module for the Raft client proxy
//!
//! This module handles proxy configuration including cluster membership,
//! session settings, and timeouts.

use log::warn;
use serde_derive::Deserialize;
use std::time::Duration;

/// Configuration for a single member of the Raft cluster
#[derive(Debug, Deserialize, Clone)]
pub struct MemberConfig {
    /// Unique identifier for the member
    pub id: u64,
    /// Network address of the member
    pub addr: String,
}

/// Runtime configuration for the Raft client proxy
#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    /// Name of the replicated service sessions are opened against
    pub service: String,
    /// List of all members in the Raft cluster
    pub members: Vec<MemberConfig>,
    /// Session timeout requested when opening a session
    pub session_timeout_ms: u64,
    /// Timeout for establishing a connection
    pub connect_timeout_ms: u64,
    /// Timeout for a single request/response exchange
    pub request_timeout_ms: u64,
    /// Network address for metrics collection
    pub metrics_addr: String,
}

impl ProxyConfig {
    /// Creates a new ProxyConfig with default values
    pub fn new() -> Self {
        ProxyConfig {
            service: "default".to_string(),
            members: Vec::new(),
            session_timeout_ms: 5_000,
            connect_timeout_ms: 1_000,
            request_timeout_ms: 30_000,
            metrics_addr: "0.0.0.0:4010".to_string(),
        }
    }

    /// Loads configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// Returns Some(ProxyConfig) if successful, or the defaults if the file
    /// could not be read or parsed
    pub fn from_toml(path: &str) -> Option<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Something went wrong reading the proxy config file, {:?}",
                    e
                );
                return Some(ProxyConfig::new());
            }
        };
        let config: ProxyConfig = match toml::from_str(&contents) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Something went wrong reading the proxy config file, {:?}",
                    e
                );
                return Some(ProxyConfig::new());
            }
        };
        Some(config)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
service = "registry"
session_timeout_ms = 10000
connect_timeout_ms = 500
request_timeout_ms = 2000
metrics_addr = "0.0.0.0:9100"

[[members]]
id = 1
addr = "10.0.0.1:4000"

[[members]]
id = 2
addr = "10.0.0.2:4000"
"#
        )
        .unwrap();

        let config = ProxyConfig::from_toml(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.service, "registry");
        assert_eq!(config.members.len(), 2);
        assert_eq!(config.members[1].addr, "10.0.0.2:4000");
        assert_eq!(config.session_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ProxyConfig::from_toml("/nonexistent/config.toml").unwrap();
        assert_eq!(config.service, "default");
        assert!(config.members.is_empty());
        assert_eq!(config.connect_timeout(), Duration::from_millis(1_000));
    }
}
