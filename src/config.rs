use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use anyhow::{Context, Result};
use fast_remote_check::channel::route_source;
use fast_remote_check::util::parse_host_port;
use fast_remote_check::{CheckKind, IcmpTarget, ProbeTarget, WaitPolicy};
use crate::check::Check;
use std::net::Ipv4Addr;
use std::path::Path;
use tokio::fs;

const DEFAULT_TCP_PORT: u16 = 80;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TargetConfig {
    pub name: String,
    pub kind: CheckKind,
    /// IPv4 literal, optionally with `:port`
    pub host: String,
    pub port: Option<u16>,
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProbeConfig {
    pub probe_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: f64,
    /// Source endpoint written into SYN probes. `0.0.0.0` means the
    /// address of the interface that routes to each target.
    #[serde(default = "default_source_ip")]
    pub source_ip: String,
    #[serde(default = "default_source_port")]
    pub source_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    pub targets: Vec<TargetConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub enable_latency_history: bool,
    #[serde(default)]
    pub icmp_wait_policy: WaitPolicy,
}

fn default_timeout_secs() -> f64 {
    3.0
}

fn default_source_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_source_port() -> u16 {
    54321
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ProbeConfig {
    /// Get the log level as a tracing::Level
    pub fn get_tracing_level(&self) -> Result<tracing::Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(tracing::Level::TRACE),
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" | "warning" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            _ => Err(anyhow::anyhow!("Invalid log level: {}. Valid levels are: trace, debug, info, warn, error", self.log_level))
        }
    }

    /// Rejects a config the runner could not execute, so a bad reload
    /// keeps the previous one in place.
    pub fn validate(&self) -> Result<()> {
        self.get_tracing_level()?;
        if self.probe_interval_ms == 0 {
            return Err(anyhow::anyhow!("probe_interval_ms must be greater than zero"));
        }
        for target in &self.targets {
            target
                .to_check(self)
                .with_context(|| format!("target {}", target.name))?;
        }
        Ok(())
    }
}

pub struct ConfigManager {
    pub config: Arc<RwLock<ProbeConfig>>,
}

impl ConfigManager {
    pub async fn start() -> Result<Self> {
        let config_file = std::env::var("TARGET_CONFIG")
            .unwrap_or_else(|_| "targets.json".to_string());

        println!("Starting with local file: {}", config_file);

        let initial = Self::load_file_config(&config_file).await?;
        let config = Arc::new(RwLock::new(initial));

        let poll_interval_sec: u64 = std::env::var("CONFIG_POLL_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        // Spawn background task to watch file for changes
        {
            let config_clone = config.clone();
            let config_file_clone = config_file.clone();

            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(tokio::time::Duration::from_secs(poll_interval_sec)).await;
                    match Self::load_file_config(&config_file_clone).await {
                        Ok(new_cfg) => {
                            let mut c = config_clone.write().await;
                            if *c != new_cfg {
                                tracing::info!("Local config file updated");
                                *c = new_cfg;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Error reading config file {}: {:?}", config_file_clone, e);
                        }
                    }
                }
            });
        }

        Ok(ConfigManager { config })
    }

    pub async fn load_file_config(file_path: &str) -> Result<ProbeConfig> {
        if !Path::new(file_path).exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", file_path));
        }

        let content = fs::read_to_string(file_path).await?;
        let config: ProbeConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

impl TargetConfig {
    pub fn get_host_port(&self, default_port: u16) -> (String, u16) {
        parse_host_port(&self.host, self.port.unwrap_or(default_port))
    }

    /// Builds the probe for one scheduler tick from the current snapshot,
    /// so reloads and route changes show up on the next tick.
    pub fn to_check(&self, config: &ProbeConfig) -> Result<Check> {
        let timeout_secs = self.timeout_secs.unwrap_or(config.default_timeout_secs);
        let (host, port) = self.get_host_port(DEFAULT_TCP_PORT);

        let check = match self.kind {
            CheckKind::Icmp => Check::Icmp(
                IcmpTarget::new(&host, timeout_secs)?.with_wait_policy(config.icmp_wait_policy),
            ),
            CheckKind::Syn => {
                let source_ip = syn_source_ip(&config.source_ip, &host)?;
                Check::Syn(ProbeTarget::new(&source_ip, config.source_port, &host, port, timeout_secs)?)
            }
            CheckKind::Connect => {
                Check::Connect(ProbeTarget::new(&config.source_ip, config.source_port, &host, port, timeout_secs)?)
            }
        };
        Ok(check)
    }
}

/// The SYN checksum covers the source address, and the kernel fills in the
/// real one, so a wildcard source is replaced by the routed address.
fn syn_source_ip(source_ip: &str, host: &str) -> Result<String> {
    match (source_ip.parse::<Ipv4Addr>(), host.parse::<Ipv4Addr>()) {
        (Ok(source), Ok(destination)) if source.is_unspecified() => {
            let routed = route_source(destination)
                .with_context(|| format!("no source address for {destination}"))?;
            Ok(routed.to_string())
        }
        _ => Ok(source_ip.to_string()),
    }
}
