//! Node configuration, read from YAML.
//!
//! Every field has a default, so an empty document is a valid configuration for a node that
//! seeds its own ring on `127.0.0.1:8081`.

use crate::core::{Address, Ring};
use crate::logging::LogLevel;
use crate::node::{MaintenanceConfig, NodeOptions};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8081";
pub const DEFAULT_RING_BITS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address to listen on.
    pub listen: String,
    /// Address other members reach this node at, hashed into its ring position. Defaults to
    /// the bound listen address; required when listening on `0.0.0.0`. A port of 0 takes the
    /// bound port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise: Option<String>,
    /// The ring has `2^ring_bits` positions.
    pub ring_bits: u32,
    pub successor_list_len: usize,
    pub stabilize_interval_ms: u64,
    pub fix_fingers_interval_ms: u64,
    pub liveness_interval_ms: u64,
    pub jitter_ms: u64,
    pub rpc_timeout_ms: u64,
    pub rpc_retries: u32,
    /// Defaults to twice the finger count of the ring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hops: Option<u32>,
    /// Members to join through, tried in order. None means this node seeds a new ring.
    pub seeds: Vec<String>,
    /// Ping the seeds first and only try the ones that answer.
    pub ping_seeds: bool,
    pub log_level: LogLevel,
    /// Directory for daily-rolling log files; stderr only when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let maintenance = MaintenanceConfig::default();
        Config {
            listen: DEFAULT_LISTEN.to_string(),
            advertise: None,
            ring_bits: DEFAULT_RING_BITS,
            successor_list_len: crate::node::DEFAULT_SUCCESSOR_LIST_LEN,
            stabilize_interval_ms: maintenance.stabilize_interval.as_millis() as u64,
            fix_fingers_interval_ms: maintenance.fix_fingers_interval.as_millis() as u64,
            liveness_interval_ms: maintenance.liveness_interval.as_millis() as u64,
            jitter_ms: maintenance.jitter.as_millis() as u64,
            rpc_timeout_ms: crate::node::DEFAULT_RPC_TIMEOUT.as_millis() as u64,
            rpc_retries: crate::node::DEFAULT_RPC_RETRIES,
            max_hops: None,
            seeds: Vec::new(),
            ping_seeds: false,
            log_level: LogLevel::default(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Config::from_yaml(&text).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Config> {
        // an empty document deserializes as unit, not as an empty mapping
        let config: Config = if text.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(text).context("failed to parse config")?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        serde_yaml::to_string(self).context("failed to encode config")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.advertise_address(self.listen_address()?)?;
        self.seed_addresses()?;
        self.ring()?;
        if self.successor_list_len == 0 {
            return Err(anyhow!("successor_list_len must be at least 1"));
        }
        for (name, value) in [
            ("stabilize_interval_ms", self.stabilize_interval_ms),
            ("fix_fingers_interval_ms", self.fix_fingers_interval_ms),
            ("liveness_interval_ms", self.liveness_interval_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
        ] {
            if value == 0 {
                return Err(anyhow!("{} must be positive", name));
            }
        }
        let shortest_interval = self
            .stabilize_interval_ms
            .min(self.fix_fingers_interval_ms)
            .min(self.liveness_interval_ms);
        if self.jitter_ms >= shortest_interval {
            return Err(anyhow!(
                "jitter_ms ({}) must be smaller than every maintenance interval",
                self.jitter_ms
            ));
        }
        if self.max_hops == Some(0) {
            return Err(anyhow!("max_hops must be positive"));
        }
        Ok(())
    }

    pub fn listen_address(&self) -> anyhow::Result<Address> {
        Address::parse(&self.listen).context("invalid listen address")
    }

    /// The address this node announces, given the address its listener is bound to.
    pub fn advertise_address(&self, bound: Address) -> anyhow::Result<Address> {
        let Some(advertise) = &self.advertise else {
            let unspecified = bound
                .host()
                .parse::<IpAddr>()
                .is_ok_and(|ip| ip.is_unspecified());
            if unspecified {
                return Err(anyhow!(
                    "listening on {} needs an advertise address other members can reach",
                    bound
                ));
            }
            return Ok(bound);
        };

        let advertised = Address::parse(advertise).context("invalid advertise address")?;
        if advertised.port() == "0" {
            return Ok(Address::new(advertised.host(), bound.port()));
        }
        Ok(advertised)
    }

    pub fn seed_addresses(&self) -> anyhow::Result<Vec<Address>> {
        self.seeds
            .iter()
            .map(|seed| Address::parse(seed).with_context(|| format!("invalid seed {:?}", seed)))
            .collect()
    }

    pub fn ring(&self) -> anyhow::Result<Ring> {
        Ring::with_bits(self.ring_bits)
    }

    pub fn node_options(&self) -> anyhow::Result<NodeOptions> {
        let mut options = NodeOptions::for_ring(&self.ring()?);
        options.successor_list_len = self.successor_list_len;
        options.rpc_timeout = Duration::from_millis(self.rpc_timeout_ms);
        options.rpc_retries = self.rpc_retries;
        if let Some(max_hops) = self.max_hops {
            options.max_hops = max_hops;
        }
        Ok(options)
    }

    pub fn maintenance(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            stabilize_interval: Duration::from_millis(self.stabilize_interval_ms),
            fix_fingers_interval: Duration::from_millis(self.fix_fingers_interval_ms),
            liveness_interval: Duration::from_millis(self.liveness_interval_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}
