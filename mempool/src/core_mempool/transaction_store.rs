// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::core_mempool::index::PriorityKey;
use modulr_crypto::HashValue;
use modulr_types::{account::AccountId, transaction::Transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A transaction with its bookkeeping.
#[derive(Clone, Debug)]
pub(crate) struct MempoolTransaction {
    pub txn: Transaction,
    pub hash: HashValue,
    pub arrival: u64,
}

/// Backing storage plus the secondary indices:
/// - by hash (primary),
/// - by `(creator, nonce)`,
/// - by `(fee desc, arrival asc)` for block assembly,
/// - by arrival for LRU eviction.
#[derive(Debug, Default)]
pub(crate) struct TransactionStore {
    by_hash: HashMap<HashValue, MempoolTransaction>,
    by_creator: BTreeMap<AccountId, BTreeMap<u64, HashValue>>,
    priority_index: BTreeSet<PriorityKey>,
    lru_index: BTreeMap<u64, HashValue>,
}

impl TransactionStore {
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn contains(&self, hash: &HashValue) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &HashValue) -> Option<&MempoolTransaction> {
        self.by_hash.get(hash)
    }

    /// Pending nonces of `creator`, ascending.
    pub fn pending_nonces(&self, creator: &AccountId) -> Option<&BTreeMap<u64, HashValue>> {
        self.by_creator.get(creator)
    }

    /// Count of contiguous pending transactions for `creator`.
    pub fn pending_count(&self, creator: &AccountId) -> u64 {
        self.by_creator
            .get(creator)
            .map_or(0, |nonces| nonces.len() as u64)
    }

    pub fn insert(&mut self, txn: MempoolTransaction) {
        self.priority_index.insert(PriorityKey {
            fee: txn.txn.fee,
            arrival: txn.arrival,
            creator: txn.txn.creator.clone(),
            hash: txn.hash,
        });
        self.lru_index.insert(txn.arrival, txn.hash);
        self.by_creator
            .entry(txn.txn.creator.clone())
            .or_insert_with(BTreeMap::new)
            .insert(txn.txn.nonce, txn.hash);
        self.by_hash.insert(txn.hash, txn);
    }

    pub fn remove(&mut self, hash: &HashValue) -> Option<MempoolTransaction> {
        let txn = self.by_hash.remove(hash)?;
        self.priority_index.remove(&PriorityKey {
            fee: txn.txn.fee,
            arrival: txn.arrival,
            creator: txn.txn.creator.clone(),
            hash: txn.hash,
        });
        self.lru_index.remove(&txn.arrival);
        if let Some(nonces) = self.by_creator.get_mut(&txn.txn.creator) {
            nonces.remove(&txn.txn.nonce);
            if nonces.is_empty() {
                self.by_creator.remove(&txn.txn.creator);
            }
        }
        Some(txn)
    }

    pub fn remove_by_creator_nonce(&mut self, creator: &AccountId, nonce: u64) -> bool {
        let hash = match self.by_creator.get(creator).and_then(|n| n.get(&nonce)) {
            Some(hash) => *hash,
            None => return false,
        };
        self.remove(&hash).is_some()
    }

    /// Oldest transaction that is not the lowest outstanding nonce of its
    /// creator. Those are the only legal eviction victims: evicting a
    /// creator's lowest pending nonce would strand everything behind it.
    pub fn lru_evictable(&self) -> Option<HashValue> {
        for hash in self.lru_index.values() {
            let txn = &self.by_hash[hash];
            let lowest = self
                .by_creator
                .get(&txn.txn.creator)
                .and_then(|nonces| nonces.keys().next().copied());
            if lowest != Some(txn.txn.nonce) {
                return Some(*hash);
            }
        }
        None
    }

    pub fn priority_iter(&self) -> impl Iterator<Item = &PriorityKey> {
        self.priority_index.iter()
    }
}
