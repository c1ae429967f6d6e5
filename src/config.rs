//! Runtime configuration.
//!
//! SPEC_FULL.md §6 turns the original's compile-time `#define` table into a
//! `serde`-deserializable `Config`, loaded from a JSON file and overridable by
//! CLI flags, in the same layered-configuration style as
//! `examples/MalteJ-mvirt/mvirt-net/src/config.rs` (plain structs plus a
//! builder) and `src/main.rs` (`clap::Parser` derive).

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_lowpan_neighbors: usize,
    pub max_contexts: usize,
    pub max_bridge_entries: usize,
    pub pgw_period_ms: u64,
    pub dad_retrans_ms: u64,
    pub initial_context_lifetime_secs: u64,
    pub context_lifetime_secs: u64,
    pub min_context_change_delay_secs: u64,
    pub pgw_max_dad_ns: u8,
    pub garbage_collectible_lifetime_secs: u64,
    pub tentative_lifetime_secs: u64,
    pub option_filtering: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_lowpan_neighbors: 25,
            max_contexts: 16,
            max_bridge_entries: 30,
            pgw_period_ms: 100,
            dad_retrans_ms: 1000,
            initial_context_lifetime_secs: 600,
            context_lifetime_secs: 3600,
            min_context_change_delay_secs: 300,
            pgw_max_dad_ns: 1,
            garbage_collectible_lifetime_secs: 600,
            tentative_lifetime_secs: 20,
            option_filtering: false,
        }
    }
}

impl Config {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| GatewayError::ConfigInvalid(format!("{}: {e}", path.as_ref().display())))?;
        let cfg: Config = serde_json::from_str(&text)
            .map_err(|e| GatewayError::ConfigInvalid(format!("invalid config json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if !(2..=16).contains(&self.max_contexts) {
            return Err(GatewayError::ConfigInvalid(
                "max_contexts must be between 2 and 16".into(),
            ));
        }
        if self.max_lowpan_neighbors == 0 {
            return Err(GatewayError::ConfigInvalid(
                "max_lowpan_neighbors must be non-zero".into(),
            ));
        }
        if self.max_bridge_entries == 0 {
            return Err(GatewayError::ConfigInvalid(
                "max_bridge_entries must be non-zero".into(),
            ));
        }
        if self.pgw_max_dad_ns == 0 {
            return Err(GatewayError::ConfigInvalid(
                "pgw_max_dad_ns must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn pgw_period(&self) -> Duration {
        Duration::from_millis(self.pgw_period_ms)
    }

    /// DAD retransmission/defense window, distinct from `pgw_period` (the
    /// periodic-tick cadence): `UIP_ND6_RETRANS_TIMER`, roughly 1s.
    pub fn dad_retrans(&self) -> Duration {
        Duration::from_millis(self.dad_retrans_ms)
    }

    pub fn initial_context_lifetime(&self) -> Duration {
        Duration::from_secs(self.initial_context_lifetime_secs)
    }

    pub fn context_lifetime(&self) -> Duration {
        Duration::from_secs(self.context_lifetime_secs)
    }

    pub fn min_context_change_delay(&self) -> Duration {
        Duration::from_secs(self.min_context_change_delay_secs)
    }

    pub fn garbage_collectible_lifetime(&self) -> Duration {
        Duration::from_secs(self.garbage_collectible_lifetime_secs)
    }

    pub fn tentative_lifetime(&self) -> Duration {
        Duration::from_secs(self.tentative_lifetime_secs)
    }
}

/// CLI surface, layered on top of `Config::default()` / a loaded file. Mirrors
/// the reference stack's `clap::Parser` derive usage in `main.rs`.
#[derive(Debug, clap::Parser)]
#[command(name = "sixlp-gwd", about = "6LoWPAN proxy gateway")]
pub struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,

    #[arg(long)]
    pub max_contexts: Option<usize>,

    #[arg(long)]
    pub max_lowpan_neighbors: Option<usize>,

    #[arg(long)]
    pub max_bridge_entries: Option<usize>,

    #[arg(long)]
    pub option_filtering: bool,

    /// This gateway's own link-layer identity, as eight colon-separated hex
    /// octets (e.g. `02:00:00:00:00:00:00:01`).
    #[arg(long)]
    pub own_eui: String,

    /// Local Unix datagram socket path for the Ethernet-side driver.
    #[arg(long, default_value = "/run/sixlp-gw/eth.sock")]
    pub eth_local_socket: std::path::PathBuf,

    /// Peer Unix datagram socket path the Ethernet-side driver sends to.
    #[arg(long, default_value = "/run/sixlp-gw/eth-peer.sock")]
    pub eth_peer_socket: std::path::PathBuf,

    /// Local Unix datagram socket path for the LowPan-side driver.
    #[arg(long, default_value = "/run/sixlp-gw/lowpan.sock")]
    pub lowpan_local_socket: std::path::PathBuf,

    /// Peer Unix datagram socket path the LowPan-side driver sends to.
    #[arg(long, default_value = "/run/sixlp-gw/lowpan-peer.sock")]
    pub lowpan_peer_socket: std::path::PathBuf,

    /// Local Unix datagram socket path for the Local-interface driver (the
    /// gateway's own host-facing identity on the Ethernet segment).
    #[arg(long, default_value = "/run/sixlp-gw/local.sock")]
    pub local_local_socket: std::path::PathBuf,

    /// Peer Unix datagram socket path the Local-interface driver sends to.
    #[arg(long, default_value = "/run/sixlp-gw/local-peer.sock")]
    pub local_peer_socket: std::path::PathBuf,
}

impl Cli {
    pub fn resolve(&self) -> Result<Config, GatewayError> {
        let mut cfg = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if let Some(v) = self.max_contexts {
            cfg.max_contexts = v;
        }
        if let Some(v) = self.max_lowpan_neighbors {
            cfg.max_lowpan_neighbors = v;
        }
        if let Some(v) = self.max_bridge_entries {
            cfg.max_bridge_entries = v;
        }
        if self.option_filtering {
            cfg.option_filtering = true;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
