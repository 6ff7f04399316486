//! clockvote application settings
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config_error;
use crate::error::Result;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_NODES: u16 = 9000;
pub const DEFAULT_PORT_NODES: &str = "9000";
pub const STANDARD_PORT_HTTP: u16 = 8420;
pub const DEFAULT_PORT_HTTP: &str = "8420";

pub const DEFAULT_NODE_COUNT: &str = "8";
pub const DEFAULT_POLL_PERIOD_MS: &str = "3000";
pub const DEFAULT_INITIAL_DELAY_MS: &str = "1000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: &str = "1000";
pub const DEFAULT_DISCONNECT_THRESHOLD: &str = "3";
pub const DEFAULT_RECONNECT_BACKOFF_MS: &str = "5000";
pub const DEFAULT_REGISTRATION_TIMEOUT_MS: &str = "5000";

/// What the Connection Manager needs to know
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub node_count: u32,
    pub request_timeout: Duration,
    pub registration_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            node_count: 8,
            request_timeout: Duration::from_millis(1000),
            registration_timeout: Duration::from_millis(5000),
        }
    }
}

/// What the Voting Engine and its round driver need to know
#[derive(Clone, Debug)]
pub struct VotingConfig {
    pub node_count: u32,
    pub poll_period: Duration,
    pub initial_delay: Duration,
    pub request_timeout: Duration,
    pub disconnect_threshold: u32,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            node_count: 8,
            poll_period: Duration::from_millis(3000),
            initial_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_millis(1000),
            disconnect_threshold: 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // TCP port clock nodes dial into
    pub listen_port_nodes: u16,

    // HTTP control API port
    pub listen_port_http: u16,

    // Size of the configured node set, ids 1..=node_count
    pub node_count: u32,

    // Voting round cadence
    pub poll_period_ms: u64,
    pub initial_delay_ms: u64,

    // Per-request reply budget
    pub request_timeout_ms: u64,

    // Consecutive failures before a node is marked disconnected
    pub disconnect_threshold: u32,

    // How long a new connection may take to announce itself
    pub registration_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port_nodes: STANDARD_PORT_NODES,
            listen_port_http: STANDARD_PORT_HTTP,
            node_count: 8,
            poll_period_ms: 3000,
            initial_delay_ms: 1000,
            request_timeout_ms: 1000,
            disconnect_threshold: 3,
            registration_timeout_ms: 5000,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(config_error!("node count must be at least 1"));
        }
        if self.disconnect_threshold == 0 {
            return Err(config_error!("disconnect threshold must be at least 1"));
        }
        if self.poll_period_ms == 0 {
            return Err(config_error!("poll period must be positive"));
        }
        if self.request_timeout_ms == 0 {
            return Err(config_error!("request timeout must be positive"));
        }
        self.listen_ip().map(|_| ())
    }

    pub fn listen_ip(&self) -> Result<IpAddr> {
        self.listen_address
            .parse::<IpAddr>()
            .map_err(|e| config_error!("Invalid ip address '{}': {}", self.listen_address, e))
    }

    pub fn nodes_socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::from((self.listen_ip()?, self.listen_port_nodes)))
    }

    pub fn http_socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::from((self.listen_ip()?, self.listen_port_http)))
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            node_count: self.node_count,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            registration_timeout: Duration::from_millis(self.registration_timeout_ms),
        }
    }

    pub fn voting_config(&self) -> VotingConfig {
        VotingConfig {
            node_count: self.node_count,
            poll_period: Duration::from_millis(self.poll_period_ms),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            disconnect_threshold: self.disconnect_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.listen_port_nodes, 9000);
        assert_eq!(settings.node_count, 8);

        let voting = settings.voting_config();
        assert_eq!(voting.poll_period, Duration::from_millis(3000));
        assert_eq!(voting.initial_delay, Duration::from_millis(1000));
        assert_eq!(voting.request_timeout, Duration::from_millis(1000));
        assert_eq!(voting.disconnect_threshold, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.node_count = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.listen_address = "not-an-ip".to_string();
        assert!(settings.validate().is_err());
    }
}
