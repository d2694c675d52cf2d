use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// The handful of flags spec.md's CLI surface names — enough to start a
/// process, not a general config file layer.
#[derive(Debug, Parser)]
#[command(name = "agentmail-node", about = "Run one agentmail node identity")]
pub struct Cli {
    /// Display/address name for this node (e.g. "alice" for alice@alice.local).
    #[arg(long, default_value = "alice")]
    pub name: String,

    /// Port to bind the node's HTTP surface on.
    #[arg(long, default_value_t = 7443)]
    pub port: u16,

    /// Base URL of a relay to register/pick up through (e.g. http://127.0.0.1:7900).
    #[arg(long)]
    pub relay: Option<String>,

    /// Directory holding the identity keyfile and mailbox database.
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,
}

/// Timeouts and the resolved CLI-surface values (spec.md §5, §6, §10.3).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub port: u16,
    pub relay: Option<String>,
    pub data_dir: PathBuf,
    pub direct_timeout: Duration,
    pub relay_timeout: Duration,
    pub registration_interval: Duration,
    pub pickup_interval: Duration,
    pub outbox_tick: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "alice".to_string(),
            port: 7443,
            relay: None,
            data_dir: PathBuf::from("./data"),
            direct_timeout: Duration::from_secs(3),
            relay_timeout: Duration::from_secs(5),
            registration_interval: Duration::from_secs(60),
            pickup_interval: Duration::from_secs(5),
            outbox_tick: Duration::from_secs(2),
        }
    }
}

impl From<Cli> for NodeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            name: cli.name,
            port: cli.port,
            relay: cli.relay,
            data_dir: cli.data_dir,
            ..Self::default()
        }
    }
}
