// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use byteorder::{BigEndian, ByteOrder};
use modulr_crypto::HashValue;
use modulr_logger::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Bytes of sector content a responder must hash.
pub const SLICE_LENGTH: u64 = 25;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ChallengeError {
    #[error("sector {0} is smaller than one challenge slice")]
    SectorTooSmall(String),
    #[error("no partner outside the replica set of sector {0} can act as challenger")]
    NoEligibleChallenger(String),
    #[error("challenge for sector {0} needs at least one responder")]
    NoResponders(String),
}

/// A drawn challenge: who asks, who answers, and which slice.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSpec {
    pub challenge_id: String,
    pub sector_id: String,
    pub challenger: String,
    pub offset: u64,
    pub length: u64,
    pub responders: Vec<String>,
}

/// Where slice bytes come from. Implementations must return the same bytes
/// for the same `(offset, length)` on every honest replica.
pub trait SliceSource {
    fn read_slice(&self, offset: u64, length: u64) -> Vec<u8>;

    fn slice_hash(&self, offset: u64, length: u64) -> HashValue {
        HashValue::sha256_of(&self.read_slice(offset, length))
    }
}

impl SliceSource for &[u8] {
    fn read_slice(&self, offset: u64, length: u64) -> Vec<u8> {
        let start = (offset as usize).min(self.len());
        let end = (offset.saturating_add(length) as usize).min(self.len());
        self[start..end].to_vec()
    }
}

/// Draws the challenge for `sector_id` at a block height. Everything is a
/// pure function of `H(block_hash ‖ sector_id)`, so every honest node draws
/// the same challenger and offset without coordination. A partner holding
/// the sector is never drawn as its challenger.
pub fn draw_challenge(
    block_hash: &HashValue,
    sector_id: &str,
    sector_size: u64,
    holders: &[String],
    partner_pool: &[String],
) -> Result<ChallengeSpec, ChallengeError> {
    if sector_size <= SLICE_LENGTH {
        return Err(ChallengeError::SectorTooSmall(sector_id.to_string()));
    }
    if holders.is_empty() {
        return Err(ChallengeError::NoResponders(sector_id.to_string()));
    }
    let candidates: Vec<&String> = partner_pool
        .iter()
        .filter(|partner| !holders.contains(partner))
        .collect();
    if candidates.is_empty() {
        return Err(ChallengeError::NoEligibleChallenger(sector_id.to_string()));
    }

    let seed = HashValue::sha256_of(format!("{}{}", block_hash.to_hex(), sector_id).as_bytes());
    let seed_bytes = seed.as_slice();
    let offset = BigEndian::read_u64(&seed_bytes[0..8]) % (sector_size - SLICE_LENGTH);
    let challenger_draw = BigEndian::read_u64(&seed_bytes[8..16]) as usize % candidates.len();

    Ok(ChallengeSpec {
        challenge_id: format!("challenge-{}-{}", seed.to_hex(), sector_id),
        sector_id: sector_id.to_string(),
        challenger: candidates[challenger_draw].clone(),
        offset,
        length: SLICE_LENGTH,
        responders: holders.to_vec(),
    })
}

/// Result of comparing all responder hashes for one challenge.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RoundOutcome {
    /// Every replica returned the same hash; nothing escalates.
    Unanimous { hash: HashValue },
    /// Replicas disagree; the minority side is suspected faulty.
    Mismatch {
        groups: BTreeMap<String, Vec<String>>,
        suspected_faulty: Vec<String>,
    },
}

/// Groups responders by the hash they returned. The largest agreement group
/// is presumed honest; everyone outside it is suspected. A tie for the
/// largest group leaves no presumption, so all responders escalate.
pub fn compare_responses(responses: &BTreeMap<String, HashValue>) -> RoundOutcome {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (responder, hash) in responses {
        groups
            .entry(hash.to_hex())
            .or_insert_with(Vec::new)
            .push(responder.clone());
    }

    if groups.len() == 1 {
        let hash = responses.values().next().copied().expect("non-empty group");
        return RoundOutcome::Unanimous { hash };
    }

    let max_size = groups.values().map(Vec::len).max().unwrap_or(0);
    let tied = groups.values().filter(|g| g.len() == max_size).count() > 1;
    let suspected_faulty: Vec<String> = groups
        .values()
        .filter(|group| tied || group.len() < max_size)
        .flatten()
        .cloned()
        .collect();

    RoundOutcome::Mismatch {
        groups,
        suspected_faulty,
    }
}

/// What the challenger ships to a validator after a mismatch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub challenge_id: String,
    pub sector_id: String,
    pub reporter: String,
    pub offset: u64,
    pub length: u64,
    /// Challenge timestamp, unix milliseconds; the validator reconstructs
    /// sector state as of this instant.
    pub timestamp: u64,
    pub groups: BTreeMap<String, Vec<String>>,
    pub suspected_faulty: Vec<String>,
}

impl Escalation {
    /// Packages a mismatch outcome. Returns `None` for unanimous rounds.
    pub fn from_outcome(
        spec: &ChallengeSpec,
        outcome: &RoundOutcome,
        timestamp: u64,
    ) -> Option<Self> {
        match outcome {
            RoundOutcome::Unanimous { .. } => None,
            RoundOutcome::Mismatch {
                groups,
                suspected_faulty,
            } => {
                warn!(
                    challenge_id = %spec.challenge_id,
                    sector_id = %spec.sector_id,
                    suspected = suspected_faulty.len() as u64,
                    "Replica disagreement, escalating to validator"
                );
                Some(Self {
                    challenge_id: spec.challenge_id.clone(),
                    sector_id: spec.sector_id.clone(),
                    reporter: spec.challenger.clone(),
                    offset: spec.offset,
                    length: spec.length,
                    timestamp,
                    groups: groups.clone(),
                    suspected_faulty: suspected_faulty.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partners(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_draw_is_deterministic() {
        let block_hash = HashValue::sha256_of(b"block-7");
        let holders = partners(&["A", "B", "C"]);
        let pool = partners(&["A", "B", "C", "D", "E"]);
        let first = draw_challenge(&block_hash, "sector_X1", 1 << 32, &holders, &pool).unwrap();
        let second = draw_challenge(&block_hash, "sector_X1", 1 << 32, &holders, &pool).unwrap();
        assert_eq!(first, second);
        assert!(first.offset < (1 << 32) - SLICE_LENGTH);
    }

    #[test]
    fn test_challenger_never_holds_the_sector() {
        let holders = partners(&["A", "B", "C"]);
        let pool = partners(&["A", "B", "C", "D", "E"]);
        for i in 0..50u32 {
            let block_hash = HashValue::sha256_of(&i.to_be_bytes());
            let spec =
                draw_challenge(&block_hash, "sector_X1", 1 << 32, &holders, &pool).unwrap();
            assert!(!holders.contains(&spec.challenger));
        }
    }

    #[test]
    fn test_no_outside_partner_is_an_error() {
        let holders = partners(&["A", "B"]);
        let pool = partners(&["A", "B"]);
        assert_eq!(
            draw_challenge(&HashValue::zero(), "s", 1 << 20, &holders, &pool),
            Err(ChallengeError::NoEligibleChallenger("s".to_string()))
        );
    }

    #[test]
    fn test_unanimous_round() {
        let hash = HashValue::sha256_of(b"slice");
        let mut responses = BTreeMap::new();
        for name in ["A", "B", "C"] {
            responses.insert(name.to_string(), hash);
        }
        assert_eq!(
            compare_responses(&responses),
            RoundOutcome::Unanimous { hash }
        );
    }

    #[test]
    fn test_minority_is_suspected() {
        let good = HashValue::sha256_of(b"slice");
        let bad = HashValue::sha256_of(b"corrupt");
        let mut responses = BTreeMap::new();
        responses.insert("A".to_string(), good);
        responses.insert("B".to_string(), bad);
        responses.insert("C".to_string(), good);
        match compare_responses(&responses) {
            RoundOutcome::Mismatch {
                suspected_faulty, ..
            } => assert_eq!(suspected_faulty, vec!["B".to_string()]),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_tied_groups_suspect_everyone() {
        let mut responses = BTreeMap::new();
        responses.insert("A".to_string(), HashValue::sha256_of(b"x"));
        responses.insert("B".to_string(), HashValue::sha256_of(b"y"));
        match compare_responses(&responses) {
            RoundOutcome::Mismatch {
                suspected_faulty, ..
            } => assert_eq!(suspected_faulty.len(), 2),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_slice_source_clamps_at_end() {
        let content: &[u8] = b"short";
        assert_eq!(content.read_slice(3, 10), b"rt".to_vec());
        assert_eq!(content.read_slice(99, 10), Vec::<u8>::new());
    }
}
