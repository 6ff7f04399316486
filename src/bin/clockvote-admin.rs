use clap::{Parser, Subcommand};
use reqwest::{Client, Method};
use serde_json::{json, Value};

use clockvote::api::paths;

#[derive(Parser)]
#[command(name = "clockvote-admin")]
#[command(about = "clockvote coordinator control tool")]
struct Cli {
    /// Coordinator control API (e.g., "127.0.0.1:8420")
    #[arg(long, default_value = "127.0.0.1:8420", env = "CLOCKVOTE_API")]
    api: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current system time estimate
    Status,
    /// Show health of every configured node
    Nodes,
    /// Set a node's voting weight (0 to 10)
    SetWeight { node_id: u32, weight: f64 },
    /// Make a node stop answering
    Crash { node_id: u32 },
    /// Skew a node's clock by a number of milliseconds
    Offset {
        node_id: u32,
        #[arg(allow_hyphen_values = true)]
        offset_ms: i64,
    },
    /// Clear crash and offset faults on a node
    Reset { node_id: u32 },
    /// Check a node answers at all
    Ping { node_id: u32 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let admin = Admin::new(&cli.api);

    let result = match cli.command {
        Commands::Status => admin.call(Method::GET, paths::control::ESTIMATE, None).await?,
        Commands::Nodes => admin.call(Method::GET, paths::control::NODES, None).await?,
        Commands::SetWeight { node_id, weight } => {
            admin
                .call(
                    Method::PUT,
                    &paths::weight_path(node_id),
                    Some(json!({ "weight": weight })),
                )
                .await?
        }
        Commands::Crash { node_id } => {
            admin
                .call(
                    Method::POST,
                    &paths::faults_path(node_id),
                    Some(fault_body("INJECT_CRASH", None)),
                )
                .await?
        }
        Commands::Offset { node_id, offset_ms } => {
            admin
                .call(
                    Method::POST,
                    &paths::faults_path(node_id),
                    Some(fault_body("INJECT_OFFSET", Some(offset_ms))),
                )
                .await?
        }
        Commands::Reset { node_id } => {
            admin
                .call(Method::POST, &paths::reset_path(node_id), None)
                .await?
        }
        Commands::Ping { node_id } => {
            admin
                .call(
                    Method::POST,
                    &paths::faults_path(node_id),
                    Some(fault_body("PING", None)),
                )
                .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

struct Admin {
    client: Client,
    base_url: String,
}

impl Admin {
    fn new(api: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url(api),
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, Box<dyn std::error::Error>> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let value = response.json::<Value>().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(format!("{} returned HTTP {}: {}", url, status, value).into());
        }
        Ok(value)
    }
}

fn base_url(api: &str) -> String {
    let api = api.trim_end_matches('/');
    if api.starts_with("http://") || api.starts_with("https://") {
        api.to_string()
    } else {
        format!("http://{}", api)
    }
}

fn fault_body(kind: &str, parameter: Option<i64>) -> Value {
    match parameter {
        Some(parameter) => json!({ "kind": kind, "parameter": parameter }),
        None => json!({ "kind": kind }),
    }
}
