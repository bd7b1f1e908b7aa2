use std::{net::Ipv4Addr, path::PathBuf, time::Duration};

use clap::{command, Parser};
use serde::Deserialize;
use storage::DbConfig;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: Server,
    pub db: DbConfig,
    pub sender: Sender,
    pub monitor: Monitor,
}

impl Config {
    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.sender.workers == 0 || self.monitor.workers == 0 {
            return Err(crate::errors::Error::Other(
                "Sender.Workers and Monitor.Workers must be greater than zero".to_string(),
            ));
        }

        if self.sender.queue_size < self.sender.workers {
            return Err(crate::errors::Error::Other(
                "Sender.QueueSize must be greater or equal than Sender.Workers".to_string(),
            ));
        }

        if self.monitor.queue_size < self.monitor.workers {
            return Err(crate::errors::Error::Other(
                "Monitor.QueueSize must be greater or equal than Monitor.Workers".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    /// IPv4 address on which the server will listen for connections
    pub host: Ipv4Addr,
    /// Port used by the started server
    pub port: u16,
    /// How many requests a single IP can send within a second; 0 disables
    /// the limit
    pub max_requests_per_ip_and_second: u32,
    /// Whether per-request HTTP logs are emitted
    pub enable_http_log: bool,
    /// Whether batch requests are accepted
    pub batch_requests_enabled: bool,
    /// Maximum number of requests inside a batch request; 0 disables the
    /// limit
    pub batch_requests_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    /// URL of the sequencer RPC endpoint transactions are forwarded to.
    pub sequencer_url: Url,
    /// Number of workers forwarding transactions to the sequencer
    pub workers: usize,
    /// Capacity of the queue between the ingest endpoint and the workers
    pub queue_size: usize,
    /// How often the pool is scanned for operator-flagged resends
    #[serde(deserialize_with = "human_readable_duration")]
    pub resend_txs_check_interval: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Monitor {
    /// URL of the L2 node used to look up transaction receipts
    pub l2_node_url: Url,
    /// Number of workers querying for transaction receipts
    pub workers: usize,
    /// Capacity of the queue between the retry scheduler and the workers
    pub queue_size: usize,
    /// Wait before the first receipt lookup for a freshly sent transaction
    #[serde(deserialize_with = "human_readable_duration")]
    pub initial_wait_interval: Duration,
    /// Wait between receipt lookups for the same transaction
    #[serde(deserialize_with = "human_readable_duration")]
    pub retry_wait_interval: Duration,
    /// Maximum time a transaction is monitored before it is expired
    #[serde(deserialize_with = "human_readable_duration")]
    pub tx_life_time_max: Duration,
}

fn human_readable_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let duration_str: String = Deserialize::deserialize(deserializer)?;
    humantime::parse_duration(&duration_str).map_err(|e| {
        let msg = format!("Failed to parse duration '{duration_str}': {e}");
        serde::de::Error::custom(msg)
    })
}

#[derive(Debug, Clone)]
pub struct Internal {
    pub sequencer_errors_before_unhealthy: usize,
    pub l2_node_errors_before_unhealthy: usize,
}

impl Default for Internal {
    fn default() -> Self {
        Self {
            sequencer_errors_before_unhealthy: 3,
            l2_node_errors_before_unhealthy: 3,
        }
    }
}

#[derive(Parser)]
#[command(name = "pool-relayer", version, about, propagate_version = true)]
struct Cli {
    /// Path to a TOML configuration file; environment variables with the
    /// POOL_RELAYER prefix override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

pub fn parse() -> crate::errors::Result<Config> {
    let cli = Cli::parse();

    let mut builder = config::Config::builder();
    if let Some(path) = &cli.config {
        builder = builder.add_source(config::File::from(path.as_path()));
    }

    let config = builder
        .add_source(config::Environment::with_prefix("POOL_RELAYER").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_CONFIG: &str = r#"
        [server]
        host = "0.0.0.0"
        port = 8545
        max_requests_per_ip_and_second = 500
        enable_http_log = true
        batch_requests_enabled = false
        batch_requests_limit = 20

        [db]
        host = "pool-db"
        port = 5432
        username = "pool_user"
        password = "pool_password"
        database = "pool_db"
        max_connections = 200
        use_ssl = false

        [sender]
        sequencer_url = "http://localhost:8467"
        workers = 5
        queue_size = 25
        resend_txs_check_interval = "5s"

        [monitor]
        l2_node_url = "http://localhost:8467"
        workers = 5
        queue_size = 25
        initial_wait_interval = "3s"
        retry_wait_interval = "3s"
        tx_life_time_max = "30m"
    "#;

    fn parse_toml(contents: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn parses_a_complete_configuration() {
        // when
        let config = parse_toml(EXAMPLE_CONFIG);

        // then
        assert_eq!(config.server.port, 8545);
        assert_eq!(config.sender.workers, 5);
        assert_eq!(
            config.sender.resend_txs_check_interval,
            Duration::from_secs(5)
        );
        assert_eq!(
            config.monitor.tx_life_time_max,
            Duration::from_secs(30 * 60)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_a_queue_smaller_than_the_worker_pool() {
        // given
        let mut config = parse_toml(EXAMPLE_CONFIG);
        config.monitor.queue_size = 2;

        // when
        let result = config.validate();

        // then
        assert!(result.is_err());
    }
}
