// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use modulr_logger::prelude::*;
use serde::Deserialize;
use std::{fs, path::Path};

/// Admission floor applied when the option is missing or ill-typed.
pub const DEFAULT_MIN_SCORE: i64 = 420;

/// Seed peer from the `known_validators` table.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct KnownValidator {
    pub public_key: String,
    pub contact: Contact,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Contact {
    pub method: String,
    pub ip: String,
    pub port: u16,
}

/// Job-file schema of one co-chain.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobFileStructure {
    pub fields: Vec<String>,
    pub mandatory: Vec<String>,
    pub job_types: Vec<String>,
    pub token: String,
}

/// The parsed run rules of a co-chain. Unlike the chain environment, most
/// accessors degrade to defaults on missing or ill-typed options so an old
/// rules file keeps a node bootable.
#[derive(Clone, Debug)]
pub struct RunRules {
    config: toml::Value,
}

impl RunRules {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = raw.parse::<toml::Value>().map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self { config })
    }

    pub fn from_value(config: toml::Value) -> Self {
        Self { config }
    }

    /// Upper bound on the validator pool size.
    pub fn max_validators(&self) -> Option<u64> {
        self.config
            .get("max_validators")?
            .get("max")?
            .as_integer()
            .map(|v| v as u64)
    }

    pub fn known_validators(&self) -> Vec<KnownValidator> {
        self.config
            .get("known_validators")
            .and_then(|v| v.clone().try_into().ok())
            .unwrap_or_default()
    }

    pub fn min_validator_score(&self) -> i64 {
        self.score_option("min_validator_score")
    }

    pub fn min_partner_score(&self) -> i64 {
        self.score_option("min_partner_score")
    }

    fn score_option(&self, name: &str) -> i64 {
        match self.config.get(name) {
            Some(value) => value.as_integer().unwrap_or_else(|| {
                warn!(option = name, "run rules option is not an integer, using default");
                DEFAULT_MIN_SCORE
            }),
            None => DEFAULT_MIN_SCORE,
        }
    }

    pub fn governance(&self) -> Option<&toml::Value> {
        self.config.get("governance")
    }

    pub fn tokenomics(&self) -> Option<&toml::Value> {
        self.config.get("tokenomics")
    }

    /// Latency budget per block from the `performance` table.
    pub fn max_block_time_ms(&self) -> Option<u64> {
        self.config
            .get("performance")?
            .get("max_block_time_ms")?
            .as_integer()
            .map(|v| v as u64)
    }

    /// Schema of the job file for `co_chain` (or the base schema).
    pub fn job_file_structure(&self, co_chain: &str) -> Option<JobFileStructure> {
        let section = self.config.get(co_chain)?;
        let string_list = |key: &str| -> Vec<String> {
            section
                .get(key)
                .and_then(|v| v.clone().try_into().ok())
                .unwrap_or_default()
        };
        Some(JobFileStructure {
            fields: string_list("fields"),
            mandatory: string_list("mandatory"),
            job_types: string_list("job_types"),
            token: section
                .get("token")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// A job file is valid iff every mandatory name is present and non-null.
    pub fn validate_job_file(&self, job: &serde_json::Value, co_chain: &str) -> bool {
        let structure = match self.job_file_structure(co_chain) {
            Some(structure) => structure,
            None => return false,
        };
        structure.mandatory.iter().all(|field| {
            job.get(field)
                .map(|value| !value.is_null())
                .unwrap_or(false)
        })
    }
}
