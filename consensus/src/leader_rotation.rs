// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Leader rotation. A silent leader is never retried: quorum members who
//! watched its tenure expire with nothing finalized at the next index vote
//! to skip it, and a majority of matching votes becomes the ALRP the next
//! leader must present.

use crate::counters;
use modulr_consensus_types::{
    common::{Author, BlockIndex},
    proofs::{AggregatedLeaderRotationProof, PoolVotingStat},
    vote::{rotation_vote_digest, RotationVote},
};
use modulr_crypto::{CryptoHandler, HashValue};
use modulr_logger::prelude::*;
use modulr_types::{epoch::EpochHandler, network_parameters::NetworkParameters};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("rotation vote from {0} is not from a quorum member")]
    NotQuorumMember(String),
    #[error("rotation vote signature from {0} does not verify")]
    BadSignature(String),
    #[error("signing rotation vote failed: {0}")]
    SigningFailure(String),
}

/// Whether this member should emit a rotation vote right now: the current
/// leader's time is out, a next candidate exists, and nothing by the
/// current leader finalized at the next expected index.
pub fn should_emit_rotation_vote(
    epoch: &EpochHandler,
    params: &NetworkParameters,
    now_ms: u64,
    next_index_finalized: bool,
) -> bool {
    epoch.has_next_leader()
        && epoch.time_is_out_for_current_leader(now_ms, params)
        && !next_index_finalized
}

/// The skip data a member attests to, taken from its local view of the
/// departing leader's finalized blocks.
pub fn skip_data_for_leader(stat: &PoolVotingStat, leader_first_index: BlockIndex) -> (BlockIndex, HashValue) {
    if stat.index < 0 {
        // Nothing finalized under this leader: skip at its starting index
        // with the epoch zero hash.
        (leader_first_index, HashValue::zero())
    } else {
        (stat.index as BlockIndex, stat.hash)
    }
}

pub fn build_rotation_vote(
    author: &Author,
    private_key: &[u8],
    handler: &dyn CryptoHandler,
    epoch_full_id: &str,
    leader: &Author,
    first_block_hash: HashValue,
    skip_index: BlockIndex,
    skip_hash: HashValue,
) -> Result<RotationVote, RotationError> {
    let digest = rotation_vote_digest(epoch_full_id, leader, &first_block_hash, skip_index, &skip_hash);
    let sig = handler
        .sign(private_key, digest.as_slice())
        .map_err(|e| RotationError::SigningFailure(e.to_string()))?;
    Ok(RotationVote {
        voter: author.clone(),
        epoch_full_id: epoch_full_id.to_string(),
        leader: leader.clone(),
        first_block_hash,
        skip_index,
        skip_hash,
        sig: hex::encode(sig),
    })
}

/// Collects rotation votes per `(leader, skip data)` until majority.
#[derive(Default)]
pub struct RotationTracker {
    // (epoch_full_id, leader) -> (first_block_hash, skip_index, skip_hash) -> voter -> sig
    votes: HashMap<(String, Author), HashMap<(HashValue, BlockIndex, HashValue), BTreeMap<Author, String>>>,
}

impl RotationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vote(
        &mut self,
        vote: RotationVote,
        quorum: &[Author],
        majority: usize,
        handler: &dyn CryptoHandler,
    ) -> Result<Option<AggregatedLeaderRotationProof>, RotationError> {
        if !quorum.contains(&vote.voter) {
            return Err(RotationError::NotQuorumMember(vote.voter.to_string()));
        }
        vote.verify(handler)
            .map_err(|_| RotationError::BadSignature(vote.voter.to_string()))?;

        let per_leader = self
            .votes
            .entry((vote.epoch_full_id.clone(), vote.leader.clone()))
            .or_default();
        let matching = per_leader
            .entry((vote.first_block_hash, vote.skip_index, vote.skip_hash))
            .or_default();
        matching.insert(vote.voter.clone(), vote.sig.clone());

        if matching.len() >= majority {
            counters::LEADER_ROTATIONS.inc();
            warn!(
                leader = vote.leader.short_str(),
                skip_index = vote.skip_index,
                "Assembled ALRP, leader will be skipped"
            );
            return Ok(Some(AggregatedLeaderRotationProof {
                first_block_hash: vote.first_block_hash,
                skip_index: vote.skip_index,
                skip_hash: vote.skip_hash,
                proofs: matching.clone(),
            }));
        }
        Ok(None)
    }
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

    fn epoch(members: &[(KeyPair, AccountId)], start: u64) -> EpochHandler {
        let ids: Vec<_> = members.iter().map(|(_, id)| id.clone()).collect();
        EpochHandler {
            id: 0,
            hash: HashValue::sha256_of(b"seed"),
            pools_registry: ids.iter().cloned().collect::<BTreeSet<_>>(),
            quorum: ids.clone(),
            leaders_sequence: ids,
            start_timestamp: start,
            current_leader_index: 0,
        }
    }

    #[test]
    fn test_rotation_trigger_timing() {
        let quorum_members = members(4);
        let epoch = epoch(&quorum_members, 1_000);
        let params = NetworkParameters {
            epoch_time: 8_000,
            leadership_timeframe: 2_000,
        };
        // One millisecond past the tenure end.
        assert!(should_emit_rotation_vote(&epoch, &params, 3_001, false));
        assert!(!should_emit_rotation_vote(&epoch, &params, 2_999, false));
        // A finalized next index means the leader did its job.
        assert!(!should_emit_rotation_vote(&epoch, &params, 3_001, true));
    }

    #[test]
    fn test_silent_leader_skip_data() {
        let stat = PoolVotingStat::default();
        let (skip_index, skip_hash) = skip_data_for_leader(&stat, 0);
        assert_eq!(skip_index, 0);
        assert_eq!(skip_hash, HashValue::zero());

        let productive = PoolVotingStat {
            index: 4,
            hash: HashValue::sha256_of(b"b4"),
            afp: None,
        };
        assert_eq!(
            skip_data_for_leader(&productive, 0),
            (4, HashValue::sha256_of(b"b4"))
        );
    }

    #[test]
    fn test_majority_of_matching_votes_forms_alrp() {
        let handler = Ed25519Handler::new();
        let quorum_members = members(4);
        let quorum: Vec<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let majority = quorum_majority(4);
        let silent_leader = quorum[0].clone();

        let mut tracker = RotationTracker::new();
        let mut alrp = None;
        for (pair, id) in quorum_members.iter().skip(1) {
            let vote = build_rotation_vote(
                id,
                &pair.private,
                &handler,
                "e#0",
                &silent_leader,
                HashValue::zero(),
                0,
                HashValue::zero(),
            )
            .unwrap();
            if let Some(proof) = tracker.add_vote(vote, &quorum, majority, &handler).unwrap() {
                alrp = Some(proof);
            }
        }
        let alrp = alrp.expect("three matching votes reach majority");
        assert_eq!(alrp.skip_index, 0);
        assert_eq!(alrp.proofs.len(), majority);
        alrp.verify("e#0", &silent_leader, &quorum, majority, &handler)
            .unwrap();
    }

    #[test]
    fn test_mismatched_skip_data_does_not_aggregate() {
        let handler = Ed25519Handler::new();
        let quorum_members = members(4);
        let quorum: Vec<_> = quorum_members.iter().map(|(_, id)| id.clone()).collect();
        let majority = quorum_majority(4);
        let silent_leader = quorum[0].clone();

        let mut tracker = RotationTracker::new();
        for (i, (pair, id)) in quorum_members.iter().skip(1).enumerate() {
            // Every voter claims a different skip hash.
            let vote = build_rotation_vote(
                id,
                &pair.private,
                &handler,
                "e#0",
                &silent_leader,
                HashValue::zero(),
                0,
                HashValue::sha256_of(&[i as u8]),
            )
            .unwrap();
            assert!(tracker
                .add_vote(vote, &quorum, majority, &handler)
                .unwrap()
                .is_none());
        }
    }
}
