// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{Author, BlockIndex},
    vote::{epoch_finalization_digest, finalization_vote_digest, rotation_vote_digest},
};
use anyhow::{bail, ensure, Result};
use modulr_crypto::{CryptoHandler, HashValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn verify_proof_map(
    proofs: &BTreeMap<Author, String>,
    digest: HashValue,
    quorum: &[Author],
    majority: usize,
    handler: &dyn CryptoHandler,
    kind: &str,
) -> Result<()> {
    let mut valid = 0usize;
    for (signer, sig) in proofs {
        if !quorum.contains(signer) {
            bail!("{} carries signer {} outside the quorum", kind, signer.short_str());
        }
        let public = signer.to_bytes()?;
        let sig = hex::decode(sig)?;
        ensure!(
            handler.verify(&public, digest.as_slice(), &sig),
            "{} carries an invalid signature from {}",
            kind,
            signer.short_str(),
        );
        valid += 1;
    }
    ensure!(
        valid >= majority,
        "{} has {} signatures, quorum majority is {}",
        kind,
        valid,
        majority,
    );
    Ok(())
}

/// Aggregated Finalization Proof: a quorum majority saw the same block at
/// the same position. The chain store commits a block on its first valid
/// AFP.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AggregatedFinalizationProof {
    pub prev_block_hash: HashValue,
    /// `epoch_full_id#index`.
    pub block_id: String,
    pub block_hash: HashValue,
    pub proofs: BTreeMap<Author, String>,
}

impl AggregatedFinalizationProof {
    /// Valid iff it carries at least `majority` distinct quorum signatures,
    /// each covering `(prev_block_hash, block_id, block_hash)`.
    pub fn verify(
        &self,
        quorum: &[Author],
        majority: usize,
        handler: &dyn CryptoHandler,
    ) -> Result<()> {
        let digest =
            finalization_vote_digest(&self.prev_block_hash, &self.block_id, &self.block_hash);
        verify_proof_map(&self.proofs, digest, quorum, majority, handler, "AFP")
    }
}

/// Aggregated Epoch Finalization Proof: commits to an epoch's tail and to
/// the first block of its final leader, closing the epoch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEpochFinalizationProof {
    /// Position of the final leader in the epoch's leader sequence.
    pub last_leader: u64,
    pub last_index: BlockIndex,
    pub last_hash: HashValue,
    pub hash_of_first_block_by_last_leader: HashValue,
    pub proofs: BTreeMap<Author, String>,
}

impl AggregatedEpochFinalizationProof {
    pub fn verify(
        &self,
        epoch_full_id: &str,
        quorum: &[Author],
        majority: usize,
        handler: &dyn CryptoHandler,
    ) -> Result<()> {
        let digest = epoch_finalization_digest(
            epoch_full_id,
            self.last_leader,
            self.last_index,
            &self.last_hash,
            &self.hash_of_first_block_by_last_leader,
        );
        verify_proof_map(&self.proofs, digest, quorum, majority, handler, "AEFP")
    }
}

/// Aggregated Leader Rotation Proof: a quorum majority observed no block
/// from a leader past `skip_index` within its tenure, authorizing the next
/// leader to take over. The skipped index stays empty forever.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AggregatedLeaderRotationProof {
    pub first_block_hash: HashValue,
    pub skip_index: BlockIndex,
    pub skip_hash: HashValue,
    pub proofs: BTreeMap<Author, String>,
}

impl AggregatedLeaderRotationProof {
    pub fn verify(
        &self,
        epoch_full_id: &str,
        leader: &Author,
        quorum: &[Author],
        majority: usize,
        handler: &dyn CryptoHandler,
    ) -> Result<()> {
        let digest = rotation_vote_digest(
            epoch_full_id,
            leader,
            &self.first_block_hash,
            self.skip_index,
            &self.skip_hash,
        );
        verify_proof_map(&self.proofs, digest, quorum, majority, handler, "ALRP")
    }
}

/// Highest finalized block a node has observed for one leader, used to
/// answer rotation queries and to seed ALRP skip data. `index` of `-1`
/// means the leader has no finalized block yet.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PoolVotingStat {
    pub index: i64,
    pub hash: HashValue,
    pub afp: Option<AggregatedFinalizationProof>,
}

impl Default for PoolVotingStat {
    fn default() -> Self {
        Self {
            index: -1,
            hash: HashValue::zero(),
            afp: None,
        }
    }
}
