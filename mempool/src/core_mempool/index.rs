// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use modulr_crypto::HashValue;
use modulr_types::account::AccountId;
use std::cmp::Ordering;

/// Ordering key of the stored `(fee desc, arrival asc)` secondary index.
/// Iterating the index ascending yields highest fee first, ties broken by
/// arrival order so earlier submissions win. This is the storage index
/// only; the block drain order layers per-creator nonce eligibility on top
/// in `CoreMempool::get_batch`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PriorityKey {
    pub fee: u64,
    pub arrival: u64,
    pub creator: AccountId,
    pub hash: HashValue,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fee
            .cmp(&self.fee)
            .then_with(|| self.arrival.cmp(&other.arrival))
            .then_with(|| self.creator.cmp(&other.creator))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
