// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{block_id, Author, BlockIndex, EpochFullId},
    proofs::{AggregatedEpochFinalizationProof, AggregatedLeaderRotationProof},
};
use anyhow::{ensure, Result};
use modulr_crypto::{CryptoHandler, HashValue};
use modulr_types::{canonical::to_canonical_json, transaction::Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transactions whose execution was deferred from an earlier epoch, carried
/// opaquely and re-broadcast with the first block of the next epoch.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DelayedTxsBatch {
    pub epoch_index: i64,
    pub delayed_transactions: Vec<BTreeMap<String, serde_json::Value>>,
    pub proofs: BTreeMap<Author, String>,
}

/// Everything a block carries besides its transactions. The first block of
/// an epoch proves the previous epoch closed (AEFP) and accounts for every
/// silent leader it took over from (ALRPs).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExtraData {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rest: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aefp_for_previous_epoch: Option<AggregatedEpochFinalizationProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delayed_txs_batch: Option<DelayedTxsBatch>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregated_leaders_rotation_proofs: BTreeMap<Author, AggregatedLeaderRotationProof>,
}

/// One position in the total order. `index` is epoch-local; `prev_hash`
/// links to the previous block of the same epoch or to the zero hash for
/// the epoch's first block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub creator: Author,
    /// Creation time, unix milliseconds.
    pub time: u64,
    pub epoch: EpochFullId,
    pub transactions: Vec<Transaction>,
    pub extra_data: ExtraData,
    pub index: BlockIndex,
    pub prev_hash: HashValue,
    pub sig: String,
}

impl Block {
    /// `H(creator ‖ time ‖ canonical(transactions) ‖ network_id ‖ epoch ‖
    /// index ‖ prev_hash)`. The signature covers exactly this digest.
    pub fn get_hash(&self, network_id: &str) -> Result<HashValue> {
        let transactions = to_canonical_json(&self.transactions)?;
        let data = format!(
            "{}{}{}{}{}{}{}",
            self.creator,
            self.time,
            transactions,
            network_id,
            self.epoch,
            self.index,
            self.prev_hash.to_hex(),
        );
        Ok(HashValue::sha256_of(data.as_bytes()))
    }

    pub fn block_id(&self) -> String {
        block_id(&self.epoch, self.index)
    }

    pub fn sign(
        &mut self,
        handler: &dyn CryptoHandler,
        private: &[u8],
        network_id: &str,
    ) -> Result<()> {
        let digest = self.get_hash(network_id)?;
        let sig = handler
            .sign(private, digest.as_slice())
            .map_err(|e| anyhow::anyhow!("block signing failed: {}", e))?;
        self.sig = hex::encode(sig);
        Ok(())
    }

    pub fn verify_signature(&self, handler: &dyn CryptoHandler, network_id: &str) -> Result<()> {
        let digest = self.get_hash(network_id)?;
        let public = self.creator.to_bytes()?;
        let sig = hex::decode(&self.sig)?;
        ensure!(
            handler.verify(&public, digest.as_slice(), &sig),
            "block {} signature does not verify for creator {}",
            self.block_id(),
            self.creator.short_str(),
        );
        Ok(())
    }

    /// Whether this is the epoch's first block, which must link to the
    /// distinguished zero hash.
    pub fn is_first_in_epoch(&self) -> bool {
        self.index == 0
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod block_test_utils {
    use super::*;
    use modulr_crypto::{Ed25519Handler, KeyPair};
    use modulr_types::account::AccountId;

    pub const TEST_NETWORK_ID: &str = "modulr-testnet";

    pub fn signer() -> (KeyPair, AccountId) {
        let handler = Ed25519Handler::new();
        let pair = handler.generate_keys().unwrap();
        let id = AccountId::from_public_key(&pair.public);
        (pair, id)
    }

    pub fn signed_block_at(
        creator_pair: &KeyPair,
        creator: &AccountId,
        epoch: &str,
        index: u64,
        prev_hash: HashValue,
        transactions: Vec<Transaction>,
    ) -> Block {
        let handler = Ed25519Handler::new();
        let mut block = Block {
            creator: creator.clone(),
            time: 1_700_000_000_000 + index,
            epoch: epoch.to_string(),
            transactions,
            extra_data: ExtraData::default(),
            index,
            prev_hash,
            sig: String::new(),
        };
        block
            .sign(&handler, &creator_pair.private, TEST_NETWORK_ID)
            .unwrap();
        block
    }
}
