// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
};

/// Top-level node configuration, loaded from YAML. Every section has
/// defaults so an empty file is a valid config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsensusConfig {
    /// Upper bound on transactions drained into one block.
    pub max_block_size: usize,
    /// Mempool capacity before LRU eviction starts.
    pub mempool_capacity: usize,
    /// Bound for the queues between the worker tasks.
    pub channel_size: usize,
    /// Cadence of the polling workers, milliseconds.
    pub worker_tick_ms: u64,
    /// Deadline for any single outbound RPC, milliseconds.
    pub rpc_timeout_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_block_size: 500,
            mempool_capacity: 10_000,
            channel_size: 1024,
            worker_tick_ms: 3_000,
            rpc_timeout_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub listen_address: IpAddr,
    pub listen_port: u16,
    /// Bound of the inbound packet queue; full queue delays accepts.
    pub inbound_queue_size: usize,
    /// Directory holding the node identity keypair.
    pub identity_dir: PathBuf,
    /// Label of the identity keypair inside `identity_dir`.
    pub identity_label: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: 9000,
            inbound_queue_size: 4096,
            identity_dir: PathBuf::from("identity"),
            identity_label: "node".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Size of one replicated sector in bytes.
    pub sector_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            // 4 GiB
            sector_size: 4 * 1024 * 1024 * 1024,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_valid() {
        let config: NodeConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, NodeConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config: NodeConfig =
            serde_yaml::from_str("consensus:\n  max_block_size: 42\n").unwrap();
        assert_eq!(config.consensus.max_block_size, 42);
        assert_eq!(config.network.listen_port, 9000);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<NodeConfig>("nonsense: true\n").is_err());
    }
}
