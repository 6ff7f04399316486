//! CLI for the coordinator and the clock node
//!
use crate::settings;

pub use settings::{APP_NAME, APP_VERSION};

#[derive(Clone, Debug, clap::Parser)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("CLOCKVOTE_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // TCP port for clock nodes
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_NODES,
        env("CLOCKVOTE_NODE_LISTEN_PORT"),
        help = "Port clock nodes connect to"
    )]
    pub listen_port_nodes: u16,

    // HTTP control API port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("CLOCKVOTE_HTTP_LISTEN_PORT"),
        help = "Port to bind the HTTP control API to"
    )]
    pub listen_port_http: u16,

    #[clap(
        long,
        default_value = settings::DEFAULT_NODE_COUNT,
        env("CLOCKVOTE_NODE_COUNT"),
        help = "Number of configured clock nodes (ids 1..=n)"
    )]
    pub node_count: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_POLL_PERIOD_MS,
        env("CLOCKVOTE_POLL_PERIOD_MS"),
        help = "Milliseconds between voting rounds"
    )]
    pub poll_period_ms: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_INITIAL_DELAY_MS,
        env("CLOCKVOTE_INITIAL_DELAY_MS"),
        help = "Milliseconds before the first voting round"
    )]
    pub initial_delay_ms: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_REQUEST_TIMEOUT_MS,
        env("CLOCKVOTE_REQUEST_TIMEOUT_MS"),
        help = "Milliseconds a node has to answer one request"
    )]
    pub request_timeout_ms: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_DISCONNECT_THRESHOLD,
        env("CLOCKVOTE_DISCONNECT_THRESHOLD"),
        help = "Consecutive failures before a node is marked disconnected"
    )]
    pub disconnect_threshold: u32,

    #[clap(
        long,
        default_value = settings::DEFAULT_REGISTRATION_TIMEOUT_MS,
        env("CLOCKVOTE_REGISTRATION_TIMEOUT_MS"),
        help = "Milliseconds a new connection has to announce itself"
    )]
    pub registration_timeout_ms: u64,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            listen_port_nodes: self.listen_port_nodes,
            listen_port_http: self.listen_port_http,
            node_count: self.node_count,
            poll_period_ms: self.poll_period_ms,
            initial_delay_ms: self.initial_delay_ms,
            request_timeout_ms: self.request_timeout_ms,
            disconnect_threshold: self.disconnect_threshold,
            registration_timeout_ms: self.registration_timeout_ms,
        }
    }
}

/// Arguments for a single clock source node
#[derive(Clone, Debug, clap::Parser)]
pub struct NodeCli {
    #[clap(long, env("CLOCKVOTE_NODE_ID"), help = "Identity of this clock node")]
    pub node_id: u32,

    #[clap(
        long,
        default_value = "127.0.0.1",
        env("CLOCKVOTE_COORDINATOR_HOST"),
        help = "Coordinator host to dial"
    )]
    pub coordinator_host: String,

    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_NODES,
        env("CLOCKVOTE_COORDINATOR_PORT"),
        help = "Coordinator node port"
    )]
    pub coordinator_port: u16,

    #[clap(
        long,
        default_value = settings::DEFAULT_RECONNECT_BACKOFF_MS,
        env("CLOCKVOTE_RECONNECT_BACKOFF_MS"),
        help = "Milliseconds to wait before reconnecting"
    )]
    pub reconnect_backoff_ms: u64,
}

impl NodeCli {
    pub fn coordinator_address(&self) -> String {
        format!("{}:{}", self.coordinator_host, self.coordinator_port)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["clockvote"]).unwrap();
        let settings = cli.into_settings();
        assert_eq!(settings.listen_port_nodes, settings::STANDARD_PORT_NODES);
        assert_eq!(settings.listen_port_http, settings::STANDARD_PORT_HTTP);
        assert_eq!(settings.node_count, 8);
        assert_eq!(settings.poll_period_ms, 3000);
        assert_eq!(settings.request_timeout_ms, 1000);
        assert_eq!(settings.disconnect_threshold, 3);
    }

    #[test]
    fn test_node_cli() {
        let cli = NodeCli::try_parse_from([
            "clock-node",
            "--node-id",
            "3",
            "--coordinator-host",
            "10.0.0.1",
        ])
        .unwrap();
        assert_eq!(cli.node_id, 3);
        assert_eq!(cli.reconnect_backoff_ms, 5000);
        assert_eq!(cli.coordinator_address(), "10.0.0.1:9000");
    }
}
