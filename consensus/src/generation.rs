// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Leader-side block production: drain a bounded prefix of the mempool,
//! assemble, sign, advance the generation thread. The first block a leader
//! produces carries the proofs that justify its tenure.

use anyhow::Result;
use modulr_consensus_types::{
    block::{Block, DelayedTxsBatch, ExtraData},
    common::Author,
    proofs::{AggregatedEpochFinalizationProof, AggregatedLeaderRotationProof},
};
use modulr_crypto::CryptoHandler;
use modulr_logger::prelude::*;
use modulr_mempool::CoreMempool;
use modulr_types::thread_metadata::GenerationThreadMetadata;
use std::{collections::BTreeMap, sync::Arc};

pub struct BlockGenerator {
    author: Author,
    private_key: Vec<u8>,
    handler: Arc<dyn CryptoHandler>,
    network_id: String,
    max_block_size: usize,
}

impl BlockGenerator {
    pub fn new(
        author: Author,
        private_key: Vec<u8>,
        handler: Arc<dyn CryptoHandler>,
        network_id: impl Into<String>,
        max_block_size: usize,
    ) -> Self {
        Self {
            author,
            private_key,
            handler,
            network_id: network_id.into(),
            max_block_size,
        }
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    /// The extra data a leader's first block must carry: the AEFP that
    /// closed the previous epoch (unless already on chain), one ALRP per
    /// leader skipped on the way to this tenure, and any delayed batch.
    pub fn first_block_extra_data(
        aefp_for_previous_epoch: Option<AggregatedEpochFinalizationProof>,
        rotation_proofs: BTreeMap<Author, AggregatedLeaderRotationProof>,
        delayed_txs_batch: Option<DelayedTxsBatch>,
    ) -> ExtraData {
        ExtraData {
            rest: BTreeMap::new(),
            aefp_for_previous_epoch,
            delayed_txs_batch,
            aggregated_leaders_rotation_proofs: rotation_proofs,
        }
    }

    /// Assembles and signs the next block, advancing the generation thread
    /// only after the block exists. Admission already rejected stale nonces
    /// and bad signatures; the drain is ordered `(fee desc, nonce asc)`.
    pub fn generate_block(
        &self,
        generation: &mut GenerationThreadMetadata,
        mempool: &mut CoreMempool,
        extra_data: ExtraData,
        now_ms: u64,
    ) -> Result<Block> {
        let transactions = mempool.get_batch(self.max_block_size);
        let mut block = Block {
            creator: self.author.clone(),
            time: now_ms,
            epoch: generation.epoch_full_id.clone(),
            transactions,
            extra_data,
            index: generation.next_index,
            prev_hash: generation.prev_hash,
            sig: String::new(),
        };
        block.sign(self.handler.as_ref(), &self.private_key, &self.network_id)?;

        let block_hash = block.get_hash(&self.network_id)?;
        generation.prev_hash = block_hash;
        generation.next_index += 1;

        debug!(
            block_id = %block.block_id(),
            txs = block.transactions.len() as u64,
            "Generated candidate block"
        );
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modulr_crypto::{Ed25519Handler, HashValue};
    use modulr_types::{account::AccountId, transaction::test_helpers::signed_transfer};

    fn generator() -> (BlockGenerator, Ed25519Handler) {
        let handler = Ed25519Handler::new();
        let pair = handler.generate_keys().unwrap();
        let author = AccountId::from_public_key(&pair.public);
        (
            BlockGenerator::new(
                author,
                pair.private,
                Arc::new(Ed25519Handler::new()),
                "modulr-testnet",
                2,
            ),
            handler,
        )
    }

    fn empty_mempool() -> CoreMempool {
        CoreMempool::new(100, 1, Arc::new(Ed25519Handler::new()))
    }

    #[test]
    fn test_blocks_chain_through_generation_thread() {
        let (generator, handler) = generator();
        let mut generation = GenerationThreadMetadata::genesis("modulr-testnet");
        let mut mempool = empty_mempool();

        let first = generator
            .generate_block(&mut generation, &mut mempool, ExtraData::default(), 1_000)
            .unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.prev_hash, HashValue::zero());
        first.verify_signature(&handler, "modulr-testnet").unwrap();

        let second = generator
            .generate_block(&mut generation, &mut mempool, ExtraData::default(), 2_000)
            .unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(
            second.prev_hash,
            first.get_hash("modulr-testnet").unwrap()
        );
    }

    #[test]
    fn test_drain_respects_block_size_bound() {
        let (generator, _) = generator();
        let mut generation = GenerationThreadMetadata::genesis("modulr-testnet");
        let mut mempool = empty_mempool();
        for _ in 0..5 {
            let (txn, _) = signed_transfer(0, 10);
            assert_eq!(
                mempool.add_txn(txn),
                modulr_mempool::AddStatus::Accepted
            );
        }
        let block = generator
            .generate_block(&mut generation, &mut mempool, ExtraData::default(), 1_000)
            .unwrap();
        assert_eq!(block.transactions.len(), 2);
    }
}
