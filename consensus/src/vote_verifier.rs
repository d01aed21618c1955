// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Stateful candidate-block verification, everything a quorum member checks
//! before asking safety rules for a signature. A rejected candidate is
//! silently ignored: Byzantine leaders earn no vote and no response.

use crate::counters;
use modulr_consensus_types::block::Block;
use modulr_crypto::{CryptoHandler, HashValue};
use modulr_logger::prelude::*;
use modulr_types::{account::AccountId, epoch::EpochHandler, quorum::quorum_majority};
use rayon::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoteRejection {
    #[error("block is for epoch {got}, current epoch is {expected}")]
    WrongEpoch { expected: String, got: String },
    #[error("index {got} does not extend the chain at {expected}")]
    WrongIndex { expected: u64, got: u64 },
    #[error("prev_hash does not link to the finalized predecessor")]
    BrokenLinkage,
    #[error("creator {creator} is not an authorized leader for this position")]
    UnauthorizedCreator { creator: String },
    #[error("leader takeover is missing an ALRP for skipped leader {leader}")]
    MissingRotationProof { leader: String },
    #[error("rotation proof for {leader} does not verify: {reason}")]
    BadRotationProof { leader: String, reason: String },
    #[error("block signature does not verify")]
    BadBlockSignature,
    #[error("block time {got} is not ahead of {min}")]
    StaleTimestamp { min: u64, got: u64 },
    #[error("transaction {index} has an invalid signature")]
    BadTransactionSignature { index: usize },
    #[error("transaction {index} carries nonce {got}, expected {expected}")]
    BadTransactionNonce {
        index: usize,
        expected: u64,
        got: u64,
    },
    #[error("internal: {0}")]
    Internal(String),
}

/// Where verification expects the chain to be.
#[derive(Clone, Debug)]
pub struct VerificationContext {
    /// Hash of the last finalized block in this epoch, or zero.
    pub expected_prev_hash: HashValue,
    /// Index the candidate must occupy.
    pub expected_index: u64,
    /// Last finalized block time; candidates must be strictly ahead.
    pub min_time: u64,
    /// Next expected nonce per creator, from confirmed state.
    pub expected_nonces: HashMap<AccountId, u64>,
}

pub struct CandidateVerifier<H> {
    handler: H,
    network_id: String,
}

impl<H: CryptoHandler> CandidateVerifier<H> {
    pub fn new(handler: H, network_id: impl Into<String>) -> Self {
        Self {
            handler,
            network_id: network_id.into(),
        }
    }

    /// Full §-vote check. On success returns the leader position the block
    /// was produced at (after ALRP-driven advancement).
    pub fn verify_candidate(
        &self,
        epoch: &EpochHandler,
        ctx: &VerificationContext,
        block: &Block,
    ) -> Result<usize, VoteRejection> {
        let result = self.verify_candidate_inner(epoch, ctx, block);
        if let Err(rejection) = &result {
            counters::REJECTED_CANDIDATES.inc();
            warn!(
                block_id = %block.block_id(),
                creator = block.creator.short_str(),
                reason = %rejection,
                "Ignoring invalid candidate block"
            );
        }
        result
    }

    fn verify_candidate_inner(
        &self,
        epoch: &EpochHandler,
        ctx: &VerificationContext,
        block: &Block,
    ) -> Result<usize, VoteRejection> {
        let epoch_full_id = epoch.epoch_full_id(&self.network_id);
        if block.epoch != epoch_full_id {
            return Err(VoteRejection::WrongEpoch {
                expected: epoch_full_id,
                got: block.epoch.clone(),
            });
        }
        if block.index != ctx.expected_index {
            return Err(VoteRejection::WrongIndex {
                expected: ctx.expected_index,
                got: block.index,
            });
        }
        let expected_prev = if block.is_first_in_epoch() {
            HashValue::zero()
        } else {
            ctx.expected_prev_hash
        };
        if block.prev_hash != expected_prev {
            return Err(VoteRejection::BrokenLinkage);
        }

        let position = self.verify_creator_authorization(epoch, block)?;

        if block
            .verify_signature(&self.handler, &self.network_id)
            .is_err()
        {
            return Err(VoteRejection::BadBlockSignature);
        }

        if ctx.min_time != 0 && block.time <= ctx.min_time {
            return Err(VoteRejection::StaleTimestamp {
                min: ctx.min_time,
                got: block.time,
            });
        }

        self.verify_transactions(ctx, block)?;
        Ok(position)
    }

    /// The creator must be the leader at the epoch's current position, or a
    /// later leader that carries a valid ALRP for every leader it skipped.
    fn verify_creator_authorization(
        &self,
        epoch: &EpochHandler,
        block: &Block,
    ) -> Result<usize, VoteRejection> {
        let epoch_full_id = epoch.epoch_full_id(&self.network_id);
        let position = epoch
            .leaders_sequence
            .iter()
            .position(|leader| *leader == block.creator)
            .ok_or_else(|| VoteRejection::UnauthorizedCreator {
                creator: block.creator.to_string(),
            })?;

        if position < epoch.current_leader_index {
            return Err(VoteRejection::UnauthorizedCreator {
                creator: block.creator.to_string(),
            });
        }

        let majority = quorum_majority(epoch.quorum.len());
        for skipped in epoch.current_leader_index..position {
            let leader = &epoch.leaders_sequence[skipped];
            let alrp = block
                .extra_data
                .aggregated_leaders_rotation_proofs
                .get(leader)
                .ok_or_else(|| VoteRejection::MissingRotationProof {
                    leader: leader.to_string(),
                })?;
            alrp.verify(&epoch_full_id, leader, &epoch.quorum, majority, &self.handler)
                .map_err(|e| VoteRejection::BadRotationProof {
                    leader: leader.to_string(),
                    reason: format!("{:#}", e),
                })?;
        }
        Ok(position)
    }

    /// Signature checks fan out over the worker pool; nonce checks are
    /// sequential because they thread per-creator expectations.
    fn verify_transactions(
        &self,
        ctx: &VerificationContext,
        block: &Block,
    ) -> Result<(), VoteRejection> {
        if let Some(index) = block
            .transactions
            .par_iter()
            .enumerate()
            .find_map_first(|(index, txn)| {
                txn.verify_signature(&self.handler).err().map(|_| index)
            })
        {
            return Err(VoteRejection::BadTransactionSignature { index });
        }

        let mut expected = ctx.expected_nonces.clone();
        for (index, txn) in block.transactions.iter().enumerate() {
            let next = expected.entry(txn.creator.clone()).or_insert(0);
            if txn.nonce != *next {
                return Err(VoteRejection::BadTransactionNonce {
                    index,
                    expected: *next,
                    got: txn.nonce,
                });
            }
            *next += 1;
        }
        Ok(())
    }
}

/// Two valid leader signatures over distinct blocks at the same position:
/// the evidence a MALICIOUS_BEHAVIOR signal is built from.
pub fn detect_leader_equivocation(
    handler: &dyn CryptoHandler,
    network_id: &str,
    a: &Block,
    b: &Block,
) -> Option<AccountId> {
    if a.creator != b.creator || a.epoch != b.epoch || a.index != b.index {
        return None;
    }
    let hash_a = a.get_hash(network_id).ok()?;
    let hash_b = b.get_hash(network_id).ok()?;
    if hash_a == hash_b {
        return None;
    }
    if a.verify_signature(handler, network_id).is_ok()
        && b.verify_signature(handler, network_id).is_ok()
    {
        counters::EQUIVOCATIONS_DETECTED.inc();
        error!(
            creator = a.creator.short_str(),
            block_id = %a.block_id(),
            "Leader signed two distinct blocks at the same position"
        );
        return Some(a.creator.clone());
    }
    None
}
