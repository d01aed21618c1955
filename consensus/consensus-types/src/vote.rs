// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::common::{Author, BlockIndex};
use anyhow::{ensure, Result};
use modulr_crypto::{CryptoHandler, HashValue};
use serde::{Deserialize, Serialize};

/// Digest a finalization vote signs: the triple that pins a block to its
/// position and its predecessor.
pub fn finalization_vote_digest(
    prev_block_hash: &HashValue,
    block_id: &str,
    block_hash: &HashValue,
) -> HashValue {
    let message = format!(
        "{}:{}:{}",
        prev_block_hash.to_hex(),
        block_id,
        block_hash.to_hex()
    );
    HashValue::sha256_of(message.as_bytes())
}

/// Digest a rotation vote signs: the evidence that a leader went silent.
pub fn rotation_vote_digest(
    epoch_full_id: &str,
    leader: &Author,
    first_block_hash: &HashValue,
    skip_index: BlockIndex,
    skip_hash: &HashValue,
) -> HashValue {
    let message = format!(
        "{}:{}:{}:{}:{}",
        epoch_full_id,
        leader,
        first_block_hash.to_hex(),
        skip_index,
        skip_hash.to_hex()
    );
    HashValue::sha256_of(message.as_bytes())
}

/// Digest an epoch-finalization vote signs: the epoch tail commitment.
pub fn epoch_finalization_digest(
    epoch_full_id: &str,
    last_leader: u64,
    last_index: BlockIndex,
    last_hash: &HashValue,
    hash_of_first_block_by_last_leader: &HashValue,
) -> HashValue {
    let message = format!(
        "{}:{}:{}:{}:{}",
        epoch_full_id,
        last_leader,
        last_index,
        last_hash.to_hex(),
        hash_of_first_block_by_last_leader.to_hex()
    );
    HashValue::sha256_of(message.as_bytes())
}

/// A quorum member's signature over one candidate block.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FinalizationVote {
    pub voter: Author,
    pub prev_block_hash: HashValue,
    pub block_id: String,
    pub block_hash: HashValue,
    pub sig: String,
}

impl FinalizationVote {
    pub fn verify(&self, handler: &dyn CryptoHandler) -> Result<()> {
        let digest =
            finalization_vote_digest(&self.prev_block_hash, &self.block_id, &self.block_hash);
        let public = self.voter.to_bytes()?;
        let sig = hex::decode(&self.sig)?;
        ensure!(
            handler.verify(&public, digest.as_slice(), &sig),
            "finalization vote by {} does not verify",
            self.voter.short_str()
        );
        Ok(())
    }
}

/// A quorum member's attestation that `leader` produced nothing past
/// `skip_index` within its tenure.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RotationVote {
    pub voter: Author,
    pub epoch_full_id: String,
    pub leader: Author,
    pub first_block_hash: HashValue,
    pub skip_index: BlockIndex,
    pub skip_hash: HashValue,
    pub sig: String,
}

impl RotationVote {
    pub fn verify(&self, handler: &dyn CryptoHandler) -> Result<()> {
        let digest = rotation_vote_digest(
            &self.epoch_full_id,
            &self.leader,
            &self.first_block_hash,
            self.skip_index,
            &self.skip_hash,
        );
        let public = self.voter.to_bytes()?;
        let sig = hex::decode(&self.sig)?;
        ensure!(
            handler.verify(&public, digest.as_slice(), &sig),
            "rotation vote by {} does not verify",
            self.voter.short_str()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digests_are_position_sensitive() {
        let h = HashValue::sha256_of(b"h");
        let a = finalization_vote_digest(&HashValue::zero(), "e#0#1", &h);
        let b = finalization_vote_digest(&HashValue::zero(), "e#0#2", &h);
        assert_ne!(a, b);
    }
}
