// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Epoch closure and the handoff to a fresh leader sequence. When the final
//! leader's tenure ends and its last block is finalized, quorum members
//! sign the epoch tail; the aggregated proof travels in the next epoch's
//! first block and advances every honest node in lockstep.

use crate::{counters, leader_schedule::derive_leaders_sequence};
use modulr_consensus_types::{
    common::{Author, BlockIndex},
    proofs::AggregatedEpochFinalizationProof,
    vote::epoch_finalization_digest,
};
use modulr_crypto::{CryptoHandler, HashValue};
use modulr_logger::prelude::*;
use modulr_types::{epoch::EpochHandler, network_parameters::NetworkParameters};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RolloverError {
    #[error("epoch vote from {0} is not from a quorum member")]
    NotQuorumMember(String),
    #[error("epoch vote signature from {0} does not verify")]
    BadSignature(String),
    #[error("signing epoch finalization failed: {0}")]
    SigningFailure(String),
}

/// One member's signature over the epoch tail.
#[derive(Clone, Debug)]
pub struct EpochFinalizationVote {
    pub voter: Author,
    pub epoch_full_id: String,
    pub last_leader: u64,
    pub last_index: BlockIndex,
    pub last_hash: HashValue,
    pub hash_of_first_block_by_last_leader: HashValue,
    pub sig: String,
}

pub fn build_epoch_finalization_vote(
    author: &Author,
    private_key: &[u8],
    handler: &dyn CryptoHandler,
    epoch_full_id: &str,
    last_leader: u64,
    last_index: BlockIndex,
    last_hash: HashValue,
    hash_of_first_block_by_last_leader: HashValue,
) -> Result<EpochFinalizationVote, RolloverError> {
    let digest = epoch_finalization_digest(
        epoch_full_id,
        last_leader,
        last_index,
        &last_hash,
        &hash_of_first_block_by_last_leader,
    );
    let sig = handler
        .sign(private_key, digest.as_slice())
        .map_err(|e| RolloverError::SigningFailure(e.to_string()))?;
    Ok(EpochFinalizationVote {
        voter: author.clone(),
        epoch_full_id: epoch_full_id.to_string(),
        last_leader,
        last_index,
        last_hash,
        hash_of_first_block_by_last_leader,
        sig: hex::encode(sig),
    })
}

/// Collects epoch-finalization votes over one agreed tail.
#[derive(Default)]
pub struct RolloverTracker {
    // (tail commitment) -> voter -> sig
    votes: BTreeMap<(String, u64, BlockIndex, HashValue, HashValue), BTreeMap<Author, String>>,
}

impl RolloverTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vote(
        &mut self,
        vote: EpochFinalizationVote,
        quorum: &[Author],
        majority: usize,
        handler: &dyn CryptoHandler,
    ) -> Result<Option<AggregatedEpochFinalizationProof>, RolloverError> {
        if !quorum.contains(&vote.voter) {
            return Err(RolloverError::NotQuorumMember(vote.voter.to_string()));
        }
        let digest = epoch_finalization_digest(
            &vote.epoch_full_id,
            vote.last_leader,
            vote.last_index,
            &vote.last_hash,
            &vote.hash_of_first_block_by_last_leader,
        );
        let public = vote
            .voter
            .to_bytes()
            .map_err(|_| RolloverError::BadSignature(vote.voter.to_string()))?;
        let sig = hex::decode(&vote.sig)
            .map_err(|_| RolloverError::BadSignature(vote.voter.to_string()))?;
        if !handler.verify(&public, digest.as_slice(), &sig) {
            return Err(RolloverError::BadSignature(vote.voter.to_string()));
        }

        let key = (
            vote.epoch_full_id.clone(),
            vote.last_leader,
            vote.last_index,
            vote.last_hash,
            vote.hash_of_first_block_by_last_leader,
        );
        let matching = self.votes.entry(key).or_default();
        matching.insert(vote.voter.clone(), vote.sig.clone());

        if matching.len() >= majority {
            info!(
                epoch = %vote.epoch_full_id,
                last_index = vote.last_index,
                "Assembled AEFP, epoch closed"
            );
            return Ok(Some(AggregatedEpochFinalizationProof {
                last_leader: vote.last_leader,
                last_index: vote.last_index,
                last_hash: vote.last_hash,
                hash_of_first_block_by_last_leader: vote.hash_of_first_block_by_last_leader,
                proofs: matching.clone(),
            }));
        }
        Ok(None)
    }
}

/// Builds the successor epoch: id + 1, a seed hash chained from the closed
/// epoch, and a leader sequence derived deterministically from
/// `(previous hash, network id, epoch seed)`. The registry and quorum carry
/// over; membership changes ride the on-chain registry between epochs.
pub fn next_epoch(
    previous: &EpochHandler,
    network_id: &str,
    epoch_seed: &str,
    params: &NetworkParameters,
) -> EpochHandler {
    let hash = HashValue::sha256_of(
        format!("{}{}{}", previous.hash.to_hex(), network_id, epoch_seed).as_bytes(),
    );
    let leaders_sequence =
        derive_leaders_sequence(&previous.pools_registry, &previous.hash, network_id, epoch_seed);
    let epoch = EpochHandler {
        id: previous.id + 1,
        hash,
        pools_registry: previous.pools_registry.clone(),
        quorum: leaders_sequence.clone(),
        leaders_sequence,
        start_timestamp: previous.start_timestamp + params.epoch_time,
        current_leader_index: 0,
    };
    counters::EPOCH.set(epoch.id);
    counters::CURRENT_EPOCH_QUORUM.set(epoch.quorum.len() as i64);
    epoch
}

#[cfg(test)]
mod tests {
    use super::*;
    use modulr_crypto::{Ed25519Handler, KeyPair};
    use modulr_types::{account::AccountId, quorum::quorum_majority};
    use std::collections::BTreeSet;

    fn members(n: usize) -> Vec<(KeyPair, AccountId)> {
        let handler = Ed25519Handler::new();
        (0..n)
            .map(|_| {
                let pair = handler.generate_keys().unwrap();
                let id = AccountId::from_public_key(&pair.public);
                (pair, id)
            })
            .collect()
    }

    #[test]
    fn test_majority_closes_epoch() {
        let handler = Ed25519Handler::new();
        let quorum_members = members(4);
        let quorum: Vec<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let majority = quorum_majority(4);

        let last_hash = HashValue::sha256_of(b"tail");
        let first_by_last = HashValue::sha256_of(b"first-of-last-leader");

        let mut tracker = RolloverTracker::new();
        let mut aefp = None;
        for (pair, id) in quorum_members.iter().take(majority) {
            let vote = build_epoch_finalization_vote(
                id, &pair.private, &handler, "e#0", 3, 17, last_hash, first_by_last,
            )
            .unwrap();
            if let Some(proof) = tracker.add_vote(vote, &quorum, majority, &handler).unwrap() {
                aefp = Some(proof);
            }
        }
        let aefp = aefp.expect("majority closes the epoch");
        assert_eq!(aefp.last_index, 17);
        aefp.verify("e#0", &quorum, majority, &handler).unwrap();
    }

    #[test]
    fn test_next_epoch_advances_deterministically() {
        let quorum_members = members(5);
        let ids: BTreeSet<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let previous = EpochHandler {
            id: 4,
            hash: HashValue::sha256_of(b"epoch-4"),
            pools_registry: ids.clone(),
            quorum: ids.iter().cloned().collect(),
            leaders_sequence: ids.iter().cloned().collect(),
            start_timestamp: 100_000,
            current_leader_index: 3,
        };
        let params = NetworkParameters {
            epoch_time: 60_000,
            leadership_timeframe: 5_000,
        };

        let a = next_epoch(&previous, "testnet", "seed", &params);
        let b = next_epoch(&previous, "testnet", "seed", &params);
        assert_eq!(a, b);
        assert_eq!(a.id, 5);
        assert_eq!(a.start_timestamp, 160_000);
        assert_eq!(a.current_leader_index, 0);
        assert_eq!(
            a.leaders_sequence.iter().cloned().collect::<BTreeSet<_>>(),
            ids
        );
        assert_ne!(a.hash, previous.hash);
    }
}
