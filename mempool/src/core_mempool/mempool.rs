// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::core_mempool::transaction_store::{MempoolTransaction, TransactionStore};
use modulr_crypto::CryptoHandler;
use modulr_logger::prelude::*;
use modulr_types::{account::AccountId, transaction::Transaction};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

/// Result of an admission attempt.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum AddStatus {
    Accepted,
    Duplicate,
    InvalidSignature,
    /// The nonce is not the creator's next expected one.
    InvalidNonce {
        expected: u64,
    },
    FeeBelowMinimum {
        minimum: u64,
    },
    /// Capacity reached and every resident transaction is protected.
    Full,
}

/// The bounded pending-transaction store.
pub struct CoreMempool {
    store: TransactionStore,
    /// Committed nonce base per creator, advanced on block commit.
    sequence_numbers: HashMap<AccountId, u64>,
    handler: Arc<dyn CryptoHandler>,
    capacity: usize,
    min_fee: u64,
    arrival_counter: u64,
}

impl CoreMempool {
    pub fn new(capacity: usize, min_fee: u64, handler: Arc<dyn CryptoHandler>) -> Self {
        Self {
            store: TransactionStore::default(),
            sequence_numbers: HashMap::new(),
            handler,
            capacity,
            min_fee,
            arrival_counter: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }

    /// Next nonce this creator must use: committed base plus pending run.
    pub fn expected_nonce(&self, creator: &AccountId) -> u64 {
        self.sequence_numbers.get(creator).copied().unwrap_or(0)
            + self.store.pending_count(creator)
    }

    /// Admission: signature, exact-next nonce, minimum fee, capacity.
    pub fn add_txn(&mut self, txn: Transaction) -> AddStatus {
        let hash = match txn.hash() {
            Ok(hash) => hash,
            Err(_) => return AddStatus::InvalidSignature,
        };
        if self.store.contains(&hash) {
            return AddStatus::Duplicate;
        }
        if txn.verify_signature(self.handler.as_ref()).is_err() {
            return AddStatus::InvalidSignature;
        }
        let expected = self.expected_nonce(&txn.creator);
        if txn.nonce != expected {
            return AddStatus::InvalidNonce { expected };
        }
        if txn.fee < self.min_fee {
            return AddStatus::FeeBelowMinimum {
                minimum: self.min_fee,
            };
        }
        if self.store.len() >= self.capacity && !self.evict_one() {
            return AddStatus::Full;
        }

        self.arrival_counter += 1;
        self.store.insert(MempoolTransaction {
            txn,
            hash,
            arrival: self.arrival_counter,
        });
        AddStatus::Accepted
    }

    /// Up to `max_count` transactions in the drain order `(fee desc, nonce
    /// asc, creator)`: highest eligible fee first, where a transaction only
    /// becomes eligible once every lower nonce of its creator has been
    /// taken. A literal global fee sort cannot hold across a creator's
    /// nonce run, so eligibility sweeps repeat until the batch is full or
    /// no transaction unblocks. Entries are not removed; commit does that.
    pub fn get_batch(&self, max_count: usize) -> Vec<Transaction> {
        let mut batch = Vec::new();
        // Per-creator count of already picked transactions; a transaction is
        // eligible once every lower pending nonce of its creator is picked.
        let mut picked: HashMap<AccountId, u64> = HashMap::new();
        let mut made_progress = true;
        while batch.len() < max_count && made_progress {
            made_progress = false;
            for key in self.store.priority_iter() {
                if batch.len() >= max_count {
                    break;
                }
                let txn = match self.store.get(&key.hash) {
                    Some(txn) => &txn.txn,
                    None => continue,
                };
                let taken = picked.get(&txn.creator).copied().unwrap_or(0);
                let base = self.sequence_numbers.get(&txn.creator).copied().unwrap_or(0);
                if txn.nonce == base + taken {
                    picked.insert(txn.creator.clone(), taken + 1);
                    batch.push(txn.clone());
                    made_progress = true;
                }
                // Higher nonces stay blocked until the next sweep picks
                // their predecessors.
            }
        }
        batch
    }

    /// Drops a committed transaction and advances the creator's base.
    pub fn commit_transaction(&mut self, creator: &AccountId, nonce: u64) {
        self.store.remove_by_creator_nonce(creator, nonce);
        let base = self.sequence_numbers.entry(creator.clone()).or_insert(0);
        if nonce >= *base {
            *base = nonce + 1;
        }
    }

    /// Marks the creator's committed base without touching pending entries,
    /// used when catching up from persisted state.
    pub fn set_sequence_number(&mut self, creator: &AccountId, next_nonce: u64) {
        self.sequence_numbers.insert(creator.clone(), next_nonce);
    }

    fn evict_one(&mut self) -> bool {
        match self.store.lru_evictable() {
            Some(victim) => {
                debug!(victim = %victim, "Mempool full, evicting by LRU");
                self.store.remove(&victim).is_some()
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modulr_crypto::Ed25519Handler;
    use modulr_types::{
        account::AccountId,
        transaction::{SigType, Transaction, TxType},
    };
    use std::collections::BTreeMap;

    struct TestAccount {
        pair: modulr_crypto::KeyPair,
        id: AccountId,
    }

    fn account() -> TestAccount {
        let handler = Ed25519Handler::new();
        let pair = handler.generate_keys().unwrap();
        let id = AccountId::from_public_key(&pair.public);
        TestAccount { pair, id }
    }

    fn transfer(from: &TestAccount, nonce: u64, fee: u64) -> Transaction {
        let handler = Ed25519Handler::new();
        let mut payload = BTreeMap::new();
        payload.insert("to".to_string(), serde_json::json!("ab".repeat(32)));
        payload.insert("amount".to_string(), serde_json::json!(1u64));
        let mut txn = Transaction {
            v: 1,
            fee,
            creator: from.id.clone(),
            sig: String::new(),
            tx_type: TxType::Transfer,
            sig_type: SigType::Ed25519,
            nonce,
            payload,
        };
        txn.sign(&handler, &from.pair.private).unwrap();
        txn
    }

    fn mempool(capacity: usize) -> CoreMempool {
        CoreMempool::new(capacity, 1, Arc::new(Ed25519Handler::new()))
    }

    #[test]
    fn test_ordering_fee_then_nonce() {
        let mut pool = mempool(100);
        let alice = account();
        let bob = account();

        // Alice's low-fee nonce 0 gates her high-fee nonce 1.
        assert_eq!(pool.add_txn(transfer(&alice, 0, 2)), AddStatus::Accepted);
        assert_eq!(pool.add_txn(transfer(&alice, 1, 50)), AddStatus::Accepted);
        assert_eq!(pool.add_txn(transfer(&bob, 0, 10)), AddStatus::Accepted);

        let batch = pool.get_batch(10);
        assert_eq!(batch.len(), 3);
        // Bob's 10 leads; Alice's 50 only becomes eligible after her 2.
        assert_eq!(batch[0].creator, bob.id);
        assert_eq!(batch[1].creator, alice.id);
        assert_eq!(batch[1].nonce, 0);
        assert_eq!(batch[2].nonce, 1);
    }

    #[test]
    fn test_nonce_gap_rejected() {
        let mut pool = mempool(100);
        let alice = account();
        assert_eq!(
            pool.add_txn(transfer(&alice, 5, 10)),
            AddStatus::InvalidNonce { expected: 0 }
        );
        assert_eq!(pool.add_txn(transfer(&alice, 0, 10)), AddStatus::Accepted);
        assert_eq!(
            pool.add_txn(transfer(&alice, 2, 10)),
            AddStatus::InvalidNonce { expected: 1 }
        );
    }

    #[test]
    fn test_stale_nonce_after_commit() {
        let mut pool = mempool(100);
        let alice = account();
        pool.add_txn(transfer(&alice, 0, 10));
        pool.commit_transaction(&alice.id, 0);
        assert_eq!(
            pool.add_txn(transfer(&alice, 0, 10)),
            AddStatus::InvalidNonce { expected: 1 }
        );
        assert_eq!(pool.add_txn(transfer(&alice, 1, 10)), AddStatus::Accepted);
    }

    #[test]
    fn test_signature_and_fee_gates() {
        let mut pool = mempool(100);
        let alice = account();
        let mut tampered = transfer(&alice, 0, 10);
        tampered.fee += 1;
        assert_eq!(pool.add_txn(tampered), AddStatus::InvalidSignature);
        assert_eq!(
            pool.add_txn(transfer(&alice, 0, 0)),
            AddStatus::FeeBelowMinimum { minimum: 1 }
        );
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut pool = mempool(100);
        let alice = account();
        let txn = transfer(&alice, 0, 10);
        assert_eq!(pool.add_txn(txn.clone()), AddStatus::Accepted);
        assert_eq!(pool.add_txn(txn), AddStatus::Duplicate);
    }

    #[test]
    fn test_eviction_skips_lowest_outstanding() {
        let mut pool = mempool(2);
        let alice = account();
        // Two from Alice: nonce 0 is protected, nonce 1 is evictable.
        pool.add_txn(transfer(&alice, 0, 10));
        pool.add_txn(transfer(&alice, 1, 10));

        let bob = account();
        assert_eq!(pool.add_txn(transfer(&bob, 0, 10)), AddStatus::Accepted);
        assert_eq!(pool.len(), 2);
        // Alice's nonce 1 was the victim; her nonce 0 survived.
        assert_eq!(pool.expected_nonce(&alice.id), 1);
    }

    #[test]
    fn test_full_of_protected_transactions() {
        let mut pool = mempool(2);
        // Two creators, one protected transaction each.
        pool.add_txn(transfer(&account(), 0, 10));
        pool.add_txn(transfer(&account(), 0, 10));
        assert_eq!(pool.add_txn(transfer(&account(), 0, 10)), AddStatus::Full);
    }
}
