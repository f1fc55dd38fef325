// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Node configuration: a TOML file on disk, overridable by `RIRD_`-
//! prefixed environment variables, with defaults sane enough to run a
//! single local node out of the box.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("io reading config: {0}")]
    Io(#[from] std::io::Error),
    /// The config file's TOML was malformed.
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Identity subsystem configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Path to the node's keypair document.
    #[serde(default = "default_identity_path")]
    pub keypair_path: String,
}

fn default_identity_path() -> String {
    "./data/identity.json".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { keypair_path: default_identity_path() }
    }
}

/// Persistent log configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory for the sled database.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "./data/store".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

/// Gossip transport configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Listen multiaddr, e.g. `/ip4/0.0.0.0/tcp/4001`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Gossipsub topic name carrying public activity records.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Bootstrap peer multiaddrs.
    #[serde(default)]
    pub bootstrap: Vec<String>,
    /// Seen-id cache capacity (LRU eviction).
    #[serde(default = "default_seen_cache_capacity")]
    pub seen_cache_capacity: usize,
    /// Seen-id cache entry expiry, in seconds.
    #[serde(default = "default_seen_cache_ttl_secs")]
    pub seen_cache_ttl_secs: u64,
}

fn default_listen_addr() -> String {
    "/ip4/0.0.0.0/tcp/4001".to_string()
}
fn default_topic() -> String {
    "/rird/activity/1.0.0".to_string()
}
fn default_seen_cache_capacity() -> usize {
    10_000
}
fn default_seen_cache_ttl_secs() -> u64 {
    3600
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            topic: default_topic(),
            bootstrap: Vec::new(),
            seen_cache_capacity: default_seen_cache_capacity(),
            seen_cache_ttl_secs: default_seen_cache_ttl_secs(),
        }
    }
}

/// Governance configuration: keyholder registry and killswitch root.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GovernanceConfig {
    /// Hex-encoded keyholder public keys.
    #[serde(default)]
    pub keyholders: Vec<String>,
    /// Signatures required to pass a governance action.
    #[serde(default)]
    pub threshold: u32,
    /// Hex-encoded killswitch root public key.
    #[serde(default)]
    pub killswitch_root: String,
}

/// Escrow engine defaults: the execution/verification windows used to
/// compute a tier's lock duration when a task doesn't declare its own,
/// and the protocol's cut on claim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Default execution window, in seconds, feeding [`crate::core::escrow::lock_duration_secs`].
    #[serde(default = "default_execution_timeout_secs")]
    pub default_execution_timeout_secs: u64,
    /// Default verification window, in seconds.
    #[serde(default = "default_verification_timeout_secs")]
    pub default_verification_timeout_secs: u64,
    /// Protocol fee, in basis points of the worker's post-verifier-fee share.
    #[serde(default)]
    pub protocol_fee_bps: u32,
}

fn default_execution_timeout_secs() -> u64 {
    3600
}
fn default_verification_timeout_secs() -> u64 {
    1800
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            default_execution_timeout_secs: default_execution_timeout_secs(),
            default_verification_timeout_secs: default_verification_timeout_secs(),
            protocol_fee_bps: 0,
        }
    }
}

/// Metrics HTTP endpoint configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Bind address for the `/metrics` HTTP endpoint.
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9898".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { listen_addr: default_metrics_addr() }
    }
}

/// Local RPC control-plane configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Path of the Unix domain socket the control plane listens on.
    #[serde(default = "default_rpc_socket_path")]
    pub socket_path: String,
}

fn default_rpc_socket_path() -> String {
    "./data/rird.sock".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { socket_path: default_rpc_socket_path() }
    }
}

/// Root node configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct NodeConfig {
    /// Identity subsystem.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Persistent log.
    #[serde(default)]
    pub store: StoreConfig,
    /// Gossip transport.
    #[serde(default)]
    pub gossip: GossipConfig,
    /// Governance.
    #[serde(default)]
    pub governance: GovernanceConfig,
    /// Escrow engine defaults.
    #[serde(default)]
    pub escrow: EscrowConfig,
    /// Metrics endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Local RPC control plane.
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// Load configuration from `path`, falling back to defaults for any
/// field not present in the file. Returns all-default config if `path`
/// does not exist.
pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
    if !path.exists() {
        return Ok(NodeConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let cfg: NodeConfig = toml::from_str(&raw)?;
    Ok(apply_env_overrides(cfg))
}

fn apply_env_overrides(mut cfg: NodeConfig) -> NodeConfig {
    if let Ok(v) = std::env::var("RIRD_IDENTITY_KEYPAIR_PATH") {
        cfg.identity.keypair_path = v;
    }
    if let Ok(v) = std::env::var("RIRD_STORE_PATH") {
        cfg.store.path = v;
    }
    if let Ok(v) = std::env::var("RIRD_GOSSIP_LISTEN_ADDR") {
        cfg.gossip.listen_addr = v;
    }
    if let Ok(v) = std::env::var("RIRD_METRICS_LISTEN_ADDR") {
        cfg.metrics.listen_addr = v;
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load(Path::new("/nonexistent/path/rird.toml")).unwrap();
        assert_eq!(cfg.gossip.topic, "/rird/activity/1.0.0");
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rird.toml");
        std::fs::write(&path, "[store]\npath = \"/tmp/custom-store\"\n").unwrap();
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.store.path, "/tmp/custom-store");
        assert_eq!(cfg.gossip.seen_cache_capacity, 10_000);
    }

    #[test]
    fn escrow_defaults_present_without_a_section() {
        let cfg = load(Path::new("/nonexistent/path/rird.toml")).unwrap();
        assert_eq!(cfg.escrow.default_execution_timeout_secs, 3600);
        assert_eq!(cfg.escrow.protocol_fee_bps, 0);
    }

    #[test]
    fn rpc_socket_path_has_a_default() {
        let cfg = load(Path::new("/nonexistent/path/rird.toml")).unwrap();
        assert_eq!(cfg.rpc.socket_path, "./data/rird.sock");
    }

    #[test]
    fn malformed_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rird.toml");
        std::fs::write(&path, "not valid = = toml").unwrap();
        assert!(load(&path).is_err());
    }
}
