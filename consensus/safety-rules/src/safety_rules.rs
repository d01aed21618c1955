// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::Error,
    persistent_storage::{PersistentSafetyStorage, VoteRecord},
};
use modulr_consensus_types::{
    block::Block,
    common::Author,
    vote::{finalization_vote_digest, FinalizationVote},
};
use modulr_crypto::CryptoHandler;
use modulr_logger::prelude::*;
use std::sync::Arc;

/// Signs finalization votes under the single-vote latch.
pub struct SafetyRules {
    author: Author,
    private_key: Vec<u8>,
    handler: Arc<dyn CryptoHandler>,
    storage: PersistentSafetyStorage,
    network_id: String,
}

impl SafetyRules {
    pub fn new(
        author: Author,
        private_key: Vec<u8>,
        handler: Arc<dyn CryptoHandler>,
        storage: PersistentSafetyStorage,
        network_id: impl Into<String>,
    ) -> Self {
        Self {
            author,
            private_key,
            handler,
            storage,
            network_id: network_id.into(),
        }
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    /// Produces this member's signature over `(prev_block_hash, block_id,
    /// block_hash)` for a structurally verified candidate block.
    ///
    /// The latch is consulted and persisted before signing: a second call
    /// for the same position re-signs only the identical hash, any other
    /// hash is refused as equivocation regardless of what the caller
    /// already verified.
    pub fn construct_and_sign_vote(&self, block: &Block) -> Result<FinalizationVote, Error> {
        let block_id = block.block_id();
        let block_hash = block
            .get_hash(&self.network_id)
            .map_err(|e| Error::InternalStorage(format!("hashing candidate: {:#}", e)))?;

        block
            .verify_signature(self.handler.as_ref(), &self.network_id)
            .map_err(|_| Error::InvalidBlockSignature {
                block_id: block_id.clone(),
            })?;

        match self.storage.get_vote(&block_id)? {
            Some(existing) if existing.block_hash == block_hash => {
                // Crash-recovery path: the vote was latched but may never
                // have reached the leader. Re-signing the same hash is safe.
                debug!(block_id = %block_id, "Re-signing an already latched vote");
            }
            Some(existing) => {
                error!(
                    block_id = %block_id,
                    voted_hash = %existing.block_hash,
                    requested_hash = %block_hash,
                    "Refusing to equivocate"
                );
                return Err(Error::EquivocatingVote {
                    block_id,
                    voted_hash: existing.block_hash.to_hex(),
                    requested_hash: block_hash.to_hex(),
                });
            }
            None => {
                let last_voted_time = self.storage.last_voted_time()?;
                if last_voted_time != 0 && block.time <= last_voted_time {
                    return Err(Error::NonMonotonicTimestamp {
                        block_time: block.time,
                        last_voted_time,
                    });
                }
                // Persist before the signature can leave the process.
                self.storage.record_vote(
                    &block_id,
                    VoteRecord {
                        block_hash,
                        block_time: block.time,
                    },
                )?;
                self.storage.set_last_voted_time(block.time)?;
            }
        }

        let digest = finalization_vote_digest(&block.prev_hash, &block_id, &block_hash);
        let sig = self
            .handler
            .sign(&self.private_key, digest.as_slice())
            .map_err(|e| Error::SigningFailure(e.to_string()))?;

        Ok(FinalizationVote {
            voter: self.author.clone(),
            prev_block_hash: block.prev_hash,
            block_id,
            block_hash,
            sig: hex::encode(sig),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modulr_consensus_types::block::block_test_utils::{
        signed_block_at, signer, TEST_NETWORK_ID,
    };
    use modulr_crypto::{Ed25519Handler, HashValue};

    fn voter() -> SafetyRules {
        let handler = Ed25519Handler::new();
        let pair = handler.generate_keys().unwrap();
        let author = Author::from_public_key(&pair.public);
        SafetyRules::new(
            author,
            pair.private.clone(),
            Arc::new(handler),
            PersistentSafetyStorage::in_memory(),
            TEST_NETWORK_ID,
        )
    }

    #[test]
    fn test_vote_and_revote_same_block() {
        let rules = voter();
        let (pair, creator) = signer();
        let block = signed_block_at(&pair, &creator, "e#0", 0, HashValue::zero(), vec![]);

        let vote = rules.construct_and_sign_vote(&block).unwrap();
        let again = rules.construct_and_sign_vote(&block).unwrap();
        assert_eq!(vote, again);
        vote.verify(&Ed25519Handler::new()).unwrap();
    }

    #[test]
    fn test_second_block_at_same_index_is_equivocation() {
        let rules = voter();
        let (pair, creator) = signer();
        let block = signed_block_at(&pair, &creator, "e#0", 0, HashValue::zero(), vec![]);
        rules.construct_and_sign_vote(&block).unwrap();

        // Same position, different contents.
        let mut conflicting =
            signed_block_at(&pair, &creator, "e#0", 0, HashValue::zero(), vec![]);
        conflicting.time += 1;
        let handler = Ed25519Handler::new();
        conflicting
            .sign(&handler, &pair.private, TEST_NETWORK_ID)
            .unwrap();

        let err = rules.construct_and_sign_vote(&conflicting).unwrap_err();
        assert!(matches!(err, Error::EquivocatingVote { .. }));
    }

    #[test]
    fn test_tampered_block_signature_rejected() {
        let rules = voter();
        let (pair, creator) = signer();
        let mut block = signed_block_at(&pair, &creator, "e#0", 0, HashValue::zero(), vec![]);
        block.time += 1; // invalidates the creator signature
        let err = rules.construct_and_sign_vote(&block).unwrap_err();
        assert!(matches!(err, Error::InvalidBlockSignature { .. }));
    }

    #[test]
    fn test_timestamps_must_advance() {
        let rules = voter();
        let (pair, creator) = signer();
        let first = signed_block_at(&pair, &creator, "e#0", 1, HashValue::zero(), vec![]);
        rules.construct_and_sign_vote(&first).unwrap();

        // An older index arriving later carries an older timestamp.
        let stale = signed_block_at(&pair, &creator, "e#0", 0, HashValue::zero(), vec![]);
        let err = rules.construct_and_sign_vote(&stale).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicTimestamp { .. }));
    }

    #[test]
    fn test_latch_survives_on_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(
            modulr_kvdb::DB::open(dir.path(), "safety", vec![crate::VOTING_STATS_CF]).unwrap(),
        );
        let handler = Ed25519Handler::new();
        let pair = handler.generate_keys().unwrap();
        let author = Author::from_public_key(&pair.public);

        let (creator_pair, creator) = signer();
        let block = signed_block_at(&creator_pair, &creator, "e#0", 0, HashValue::zero(), vec![]);
        let mut conflicting =
            signed_block_at(&creator_pair, &creator, "e#0", 0, HashValue::zero(), vec![]);
        conflicting.time += 1;
        conflicting
            .sign(&handler, &creator_pair.private, TEST_NETWORK_ID)
            .unwrap();

        {
            let rules = SafetyRules::new(
                author.clone(),
                pair.private.clone(),
                Arc::new(Ed25519Handler::new()),
                PersistentSafetyStorage::on_disk(db.clone()),
                TEST_NETWORK_ID,
            );
            rules.construct_and_sign_vote(&block).unwrap();
        }

        // A restarted process must still refuse the conflicting block.
        let rules = SafetyRules::new(
            author,
            pair.private,
            Arc::new(Ed25519Handler::new()),
            PersistentSafetyStorage::on_disk(db),
            TEST_NETWORK_ID,
        );
        let err = rules.construct_and_sign_vote(&conflicting).unwrap_err();
        assert!(matches!(err, Error::EquivocatingVote { .. }));
    }
}
