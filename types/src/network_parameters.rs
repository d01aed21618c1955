// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Per-epoch network parameters fixed at epoch start. Field names follow the
/// on-chain spelling.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetworkParameters {
    /// Total epoch duration in milliseconds.
    #[serde(rename = "EPOCH_TIME")]
    pub epoch_time: u64,
    /// Tenure of a single leader in milliseconds.
    #[serde(rename = "LEADERSHIP_TIMEFRAME")]
    pub leadership_timeframe: u64,
}

impl Default for NetworkParameters {
    fn default() -> Self {
        Self {
            epoch_time: 120_000,
            leadership_timeframe: 10_000,
        }
    }
}
