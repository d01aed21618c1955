// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Configuration surfaces of a Modulr node.
//!
//! Three inputs exist, with different failure semantics:
//! - the node config file (YAML), optional, defaults apply;
//! - the chain environment (`CHAINDATA_PATH`, `genesis.toml`, `version.txt`),
//!   required, a missing piece is fatal and the node refuses to start;
//! - the run rules (TOML), the per-co-chain contract of §6.4 style options,
//!   where individual ill-typed options degrade to defaults with a warning.

mod chain_env;
mod error;
mod node_config;
mod run_rules;

pub use chain_env::{ChainEnv, Genesis, GenesisEpoch};
pub use error::ConfigError;
pub use node_config::{ConsensusConfig, NetworkConfig, NodeConfig, StorageConfig};
pub use run_rules::{Contact, JobFileStructure, KnownValidator, RunRules, DEFAULT_MIN_SCORE};
