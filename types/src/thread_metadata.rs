// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{epoch::EpochHandler, network_parameters::NetworkParameters};
use modulr_crypto::HashValue;
use serde::{Deserialize, Serialize};

/// Version sentinel meaning "no state has ever been persisted".
pub const UNINITIALIZED_CORE_VERSION: i64 = -1;

/// Bookkeeping for the block-generation worker: where the next block goes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GenerationThreadMetadata {
    pub epoch_full_id: String,
    pub prev_hash: HashValue,
    pub next_index: u64,
}

impl GenerationThreadMetadata {
    /// Genesis shape: `H("0"·64 ‖ network_id) # -1`, zero prev hash, index 0.
    pub fn genesis(network_id: &str) -> Self {
        let seed = format!("{}{}", HashValue::zero().to_hex(), network_id);
        Self {
            epoch_full_id: format!("{}#-1", HashValue::sha256_of(seed.as_bytes()).to_hex()),
            prev_hash: HashValue::zero(),
            next_index: 0,
        }
    }
}

/// Bookkeeping for the approvement worker: the epoch being voted on plus the
/// network parameters it was opened with.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ApprovementThreadMetadata {
    pub core_major_version: i64,
    pub network_parameters: NetworkParameters,
    pub epoch: EpochHandler,
}

impl ApprovementThreadMetadata {
    pub fn pre_genesis() -> Self {
        Self {
            core_major_version: UNINITIALIZED_CORE_VERSION,
            network_parameters: NetworkParameters::default(),
            epoch: EpochHandler::pre_genesis(),
        }
    }

    pub fn is_uninitialized(&self) -> bool {
        self.core_major_version == UNINITIALIZED_CORE_VERSION
    }

    /// A node whose persisted state claims a newer core version than the
    /// running binary must not participate.
    pub fn is_core_version_old(&self, running_version: i64) -> bool {
        self.core_major_version > running_version
    }
}
