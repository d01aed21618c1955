// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Vote collection. Any validator that gathers a quorum majority of
//! matching finalization votes assembles the AFP and hands it to the chain
//! store; whoever gets there first wins, the result is identical.

use modulr_consensus_types::{
    common::Author,
    proofs::AggregatedFinalizationProof,
    vote::FinalizationVote,
};
use modulr_crypto::{CryptoHandler, HashValue};
use modulr_logger::prelude::*;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("vote from {0} is not from a quorum member")]
    NotQuorumMember(String),
    #[error("vote signature from {0} does not verify")]
    BadSignature(String),
    #[error("quorum member {voter} voted twice for {block_id} with different hashes")]
    ConflictingVote { voter: String, block_id: String },
}

/// Collects finalization votes per `(block_id, block_hash)` until one side
/// reaches the majority.
#[derive(Default)]
pub struct FinalizationTracker {
    // block_id -> block_hash -> voter -> vote
    votes: HashMap<String, HashMap<HashValue, BTreeMap<Author, FinalizationVote>>>,
}

impl FinalizationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests one vote. Returns the assembled AFP the moment the majority
    /// is reached, `None` before that.
    ///
    /// A member signing two different hashes for the same block id is
    /// reported as a conflict; the caller turns that into a
    /// MALICIOUS_BEHAVIOR signal.
    pub fn add_vote(
        &mut self,
        vote: FinalizationVote,
        quorum: &[Author],
        majority: usize,
        handler: &dyn CryptoHandler,
    ) -> Result<Option<AggregatedFinalizationProof>, VoteError> {
        if !quorum.contains(&vote.voter) {
            return Err(VoteError::NotQuorumMember(vote.voter.to_string()));
        }
        vote.verify(handler)
            .map_err(|_| VoteError::BadSignature(vote.voter.to_string()))?;

        let by_hash = self.votes.entry(vote.block_id.clone()).or_default();
        for (hash, votes) in by_hash.iter() {
            if *hash != vote.block_hash && votes.contains_key(&vote.voter) {
                return Err(VoteError::ConflictingVote {
                    voter: vote.voter.to_string(),
                    block_id: vote.block_id.clone(),
                });
            }
        }

        let votes = by_hash.entry(vote.block_hash).or_default();
        votes.insert(vote.voter.clone(), vote.clone());

        if votes.len() >= majority {
            let proofs: BTreeMap<Author, String> = votes
                .iter()
                .map(|(voter, vote)| (voter.clone(), vote.sig.clone()))
                .collect();
            info!(
                block_id = %vote.block_id,
                signatures = proofs.len() as u64,
                "Assembled AFP"
            );
            return Ok(Some(AggregatedFinalizationProof {
                prev_block_hash: vote.prev_block_hash,
                block_id: vote.block_id,
                block_hash: vote.block_hash,
                proofs,
            }));
        }
        Ok(None)
    }

    /// Drops all state for an epoch's block ids once the epoch closes.
    pub fn prune_epoch(&mut self, epoch_full_id: &str) {
        self.votes
            .retain(|block_id, _| !block_id.starts_with(epoch_full_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modulr_consensus_types::vote::finalization_vote_digest;
    use modulr_crypto::{Ed25519Handler, KeyPair};
    use modulr_types::{account::AccountId, quorum::quorum_majority};

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

    fn vote_for(
        pair: &KeyPair,
        id: &AccountId,
        block_id: &str,
        block_hash: HashValue,
    ) -> FinalizationVote {
        let handler = Ed25519Handler::new();
        let digest = finalization_vote_digest(&HashValue::zero(), block_id, &block_hash);
        FinalizationVote {
            voter: id.clone(),
            prev_block_hash: HashValue::zero(),
            block_id: block_id.to_string(),
            block_hash,
            sig: hex::encode(handler.sign(&pair.private, digest.as_slice()).unwrap()),
        }
    }

    #[test]
    fn test_majority_assembles_afp() {
        let handler = Ed25519Handler::new();
        let quorum_members = members(4);
        let quorum: Vec<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let majority = quorum_majority(4);
        let block_hash = HashValue::sha256_of(b"b");

        let mut tracker = FinalizationTracker::new();
        let mut afp = None;
        for (i, (pair, id)) in quorum_members.iter().take(3).enumerate() {
            let result = tracker
                .add_vote(vote_for(pair, id, "e#0#0", block_hash), &quorum, majority, &handler)
                .unwrap();
            if i < 2 {
                assert!(result.is_none());
            } else {
                afp = result;
            }
        }
        let afp = afp.expect("third vote reaches majority of 3");
        assert_eq!(afp.proofs.len(), 3);
        afp.verify(&quorum, majority, &handler).unwrap();
    }

    #[test]
    fn test_duplicate_vote_does_not_double_count() {
        let handler = Ed25519Handler::new();
        let quorum_members = members(4);
        let quorum: Vec<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let majority = quorum_majority(4);
        let block_hash = HashValue::sha256_of(b"b");

        let mut tracker = FinalizationTracker::new();
        let (pair, id) = &quorum_members[0];
        for _ in 0..5 {
            let result = tracker
                .add_vote(vote_for(pair, id, "e#0#0", block_hash), &quorum, majority, &handler)
                .unwrap();
            assert!(result.is_none());
        }
    }

    #[test]
    fn test_conflicting_vote_is_flagged() {
        let handler = Ed25519Handler::new();
        let quorum_members = members(4);
        let quorum: Vec<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let majority = quorum_majority(4);

        let mut tracker = FinalizationTracker::new();
        let (pair, id) = &quorum_members[0];
        tracker
            .add_vote(
                vote_for(pair, id, "e#0#0", HashValue::sha256_of(b"x")),
                &quorum,
                majority,
                &handler,
            )
            .unwrap();
        let err = tracker
            .add_vote(
                vote_for(pair, id, "e#0#0", HashValue::sha256_of(b"y")),
                &quorum,
                majority,
                &handler,
            )
            .unwrap_err();
        assert!(matches!(err, VoteError::ConflictingVote { .. }));
    }

    #[test]
    fn test_outsider_vote_rejected() {
        let handler = Ed25519Handler::new();
        let quorum_members = members(4);
        let quorum: Vec<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let outsider = members(1);

        let mut tracker = FinalizationTracker::new();
        let err = tracker
            .add_vote(
                vote_for(&outsider[0].0, &outsider[0].1, "e#0#0", HashValue::zero()),
                &quorum,
                quorum_majority(4),
                &handler,
            )
            .unwrap_err();
        assert!(matches!(err, VoteError::NotQuorumMember(_)));
    }
}
