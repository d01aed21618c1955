// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use modulr_types::{account::AccountId, network_parameters::NetworkParameters};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};

const CHAINDATA_PATH_VAR: &str = "CHAINDATA_PATH";
const GENESIS_FILE: &str = "genesis.toml";
const VERSION_FILE: &str = "version.txt";

/// Contents of `genesis.toml`. Only `NETWORK_ID` is mandatory; the epoch
/// section seeds the first real epoch when present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(rename = "NETWORK_ID")]
    pub network_id: String,
    #[serde(default)]
    pub epoch: Option<GenesisEpoch>,
    #[serde(default)]
    pub network_parameters: Option<NetworkParameters>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenesisEpoch {
    pub pools: Vec<AccountId>,
    pub quorum: Vec<AccountId>,
    #[serde(default)]
    pub leaders_sequence: Vec<AccountId>,
    pub start_timestamp: u64,
}

/// Everything the node needs from the environment before it can open its
/// databases. Discovery is fail-fast: a missing piece refuses startup.
#[derive(Clone, Debug)]
pub struct ChainEnv {
    pub chaindata_path: PathBuf,
    pub genesis: Genesis,
    pub core_major_version: i64,
}

impl ChainEnv {
    /// Reads `CHAINDATA_PATH`, `genesis.toml` inside it, and `version.txt`
    /// in the working directory.
    pub fn discover() -> Result<Self, ConfigError> {
        let chaindata_path = PathBuf::from(
            env::var(CHAINDATA_PATH_VAR).map_err(|_| ConfigError::MissingChaindataPath)?,
        );
        if chaindata_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingChaindataPath);
        }
        fs::create_dir_all(&chaindata_path)
            .map_err(|_| ConfigError::UnusableChaindataPath(chaindata_path.clone()))?;

        let genesis = Self::load_genesis(&chaindata_path)?;
        let core_major_version = Self::load_version(&PathBuf::from(VERSION_FILE))?;

        Ok(Self {
            chaindata_path,
            genesis,
            core_major_version,
        })
    }

    /// Same discovery with explicit paths, for tests and tools.
    pub fn discover_at(
        chaindata_path: PathBuf,
        version_file: PathBuf,
    ) -> Result<Self, ConfigError> {
        fs::create_dir_all(&chaindata_path)
            .map_err(|_| ConfigError::UnusableChaindataPath(chaindata_path.clone()))?;
        let genesis = Self::load_genesis(&chaindata_path)?;
        let core_major_version = Self::load_version(&version_file)?;
        Ok(Self {
            chaindata_path,
            genesis,
            core_major_version,
        })
    }

    fn load_genesis(chaindata_path: &PathBuf) -> Result<Genesis, ConfigError> {
        let genesis_path = chaindata_path.join(GENESIS_FILE);
        if !genesis_path.is_file() {
            return Err(ConfigError::MissingGenesis(genesis_path));
        }
        let raw = fs::read_to_string(&genesis_path).map_err(|source| ConfigError::Io {
            path: genesis_path.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: genesis_path,
            message: e.to_string(),
        })
    }

    fn load_version(version_file: &PathBuf) -> Result<i64, ConfigError> {
        let raw = fs::read_to_string(version_file)
            .map_err(|e| ConfigError::UnreadableVersion(e.to_string()))?;
        raw.trim()
            .parse::<i64>()
            .map_err(|e| ConfigError::UnreadableVersion(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_genesis(dir: &std::path::Path, body: &str) {
        fs::write(dir.join(GENESIS_FILE), body).unwrap();
    }

    #[test]
    fn test_minimal_genesis() {
        let dir = tempfile::tempdir().unwrap();
        write_genesis(dir.path(), "NETWORK_ID = \"modulr-testnet\"\n");
        let version = dir.path().join("version.txt");
        fs::write(&version, "1\n").unwrap();

        let env = ChainEnv::discover_at(dir.path().to_path_buf(), version).unwrap();
        assert_eq!(env.genesis.network_id, "modulr-testnet");
        assert_eq!(env.core_major_version, 1);
        assert!(env.genesis.epoch.is_none());
    }

    #[test]
    fn test_genesis_with_epoch_section() {
        let dir = tempfile::tempdir().unwrap();
        let key = "ab".repeat(32);
        write_genesis(
            dir.path(),
            &format!(
                "NETWORK_ID = \"modulr-testnet\"\n\n\
                 [epoch]\npools = [\"{k}\"]\nquorum = [\"{k}\"]\nstart_timestamp = 5\n\n\
                 [network_parameters]\nEPOCH_TIME = 60000\nLEADERSHIP_TIMEFRAME = 5000\n",
                k = key
            ),
        );
        let version = dir.path().join("version.txt");
        fs::write(&version, "2").unwrap();

        let env = ChainEnv::discover_at(dir.path().to_path_buf(), version).unwrap();
        let epoch = env.genesis.epoch.unwrap();
        assert_eq!(epoch.quorum.len(), 1);
        assert_eq!(env.genesis.network_parameters.unwrap().epoch_time, 60000);
    }

    #[test]
    fn test_missing_genesis_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let version = dir.path().join("version.txt");
        fs::write(&version, "1").unwrap();
        assert!(matches!(
            ChainEnv::discover_at(dir.path().to_path_buf(), version),
            Err(ConfigError::MissingGenesis(_))
        ));
    }

    #[test]
    fn test_bad_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_genesis(dir.path(), "NETWORK_ID = \"n\"\n");
        let version = dir.path().join("version.txt");
        fs::write(&version, "not-a-number").unwrap();
        assert!(matches!(
            ChainEnv::discover_at(dir.path().to_path_buf(), version),
            Err(ConfigError::UnreadableVersion(_))
        ));
    }
}
