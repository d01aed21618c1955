// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{account::AccountId, network_parameters::NetworkParameters, quorum::quorum_majority};
use modulr_crypto::HashValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fixed-membership consensus round. The handler is immutable for readers;
/// only the epoch-rollover task replaces it, handing out fresh snapshots.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EpochHandler {
    /// Sequential epoch number; the pre-genesis epoch is `-1`.
    pub id: i64,
    /// Seed hash the epoch was derived from.
    pub hash: HashValue,
    pub pools_registry: BTreeSet<AccountId>,
    /// Ordered members authorized to sign proofs this epoch.
    pub quorum: Vec<AccountId>,
    pub leaders_sequence: Vec<AccountId>,
    /// Epoch start, unix milliseconds.
    pub start_timestamp: u64,
    pub current_leader_index: usize,
}

impl EpochHandler {
    /// The pre-genesis handler every node boots with before state sync.
    pub fn pre_genesis() -> Self {
        Self {
            id: -1,
            hash: HashValue::zero(),
            pools_registry: BTreeSet::new(),
            quorum: Vec::new(),
            leaders_sequence: Vec::new(),
            start_timestamp: 0,
            current_leader_index: 0,
        }
    }

    /// `H(hash ‖ network_id) # id`, the globally unique epoch identifier.
    pub fn epoch_full_id(&self, network_id: &str) -> String {
        let digest =
            HashValue::sha256_of(format!("{}{}", self.hash.to_hex(), network_id).as_bytes());
        format!("{}#{}", digest.to_hex(), self.id)
    }

    pub fn majority(&self) -> usize {
        quorum_majority(self.quorum.len())
    }

    pub fn leader_at(&self, position: usize) -> Option<&AccountId> {
        self.leaders_sequence.get(position)
    }

    pub fn current_leader(&self) -> Option<&AccountId> {
        self.leader_at(self.current_leader_index)
    }

    pub fn is_quorum_member(&self, id: &AccountId) -> bool {
        self.quorum.iter().any(|member| member == id)
    }

    /// Start of leader `k`'s tenure in unix milliseconds.
    pub fn leader_tenure_start(&self, position: usize, params: &NetworkParameters) -> u64 {
        self.start_timestamp + position as u64 * params.leadership_timeframe
    }

    /// A leader's time is out once the next tenure begins.
    pub fn time_is_out_for_current_leader(&self, now_ms: u64, params: &NetworkParameters) -> bool {
        now_ms >= self.leader_tenure_start(self.current_leader_index + 1, params)
    }

    pub fn has_next_leader(&self) -> bool {
        self.current_leader_index + 1 < self.leaders_sequence.len()
    }

    /// Whether the epoch window is still open.
    pub fn is_fresh(&self, now_ms: u64, params: &NetworkParameters) -> bool {
        self.start_timestamp + params.epoch_time > now_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn member(byte: u8) -> AccountId {
        AccountId::from_str(&hex::encode([byte; 32])).unwrap()
    }

    fn handler_with_quorum(n: u8) -> EpochHandler {
        let members: Vec<_> = (0..n).map(member).collect();
        EpochHandler {
            id: 0,
            hash: HashValue::sha256_of(b"seed"),
            pools_registry: members.iter().cloned().collect(),
            quorum: members.clone(),
            leaders_sequence: members,
            start_timestamp: 1_000_000,
            current_leader_index: 0,
        }
    }

    #[test]
    fn test_epoch_full_id_shape() {
        let handler = handler_with_quorum(4);
        let full_id = handler.epoch_full_id("testnet");
        let (digest, id) = full_id.split_once('#').unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(id, "0");
    }

    #[test]
    fn test_leader_timeout_boundary() {
        let handler = handler_with_quorum(4);
        let params = NetworkParameters {
            epoch_time: 8_000,
            leadership_timeframe: 2_000,
        };
        // Tenure of leader 0 is [start, start + 2000).
        assert!(!handler.time_is_out_for_current_leader(1_001_999, &params));
        assert!(handler.time_is_out_for_current_leader(1_002_000, &params));
    }

    #[test]
    fn test_freshness_window() {
        let handler = handler_with_quorum(4);
        let params = NetworkParameters {
            epoch_time: 8_000,
            leadership_timeframe: 2_000,
        };
        assert!(handler.is_fresh(1_007_999, &params));
        assert!(!handler.is_fresh(1_008_000, &params));
    }

    #[test]
    fn test_pre_genesis_has_no_leaders() {
        let handler = EpochHandler::pre_genesis();
        assert_eq!(handler.id, -1);
        assert!(handler.current_leader().is_none());
        assert!(!handler.has_next_leader());
    }
}
