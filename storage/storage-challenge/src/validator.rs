// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::partner::{Escalation, SliceSource};
use modulr_crypto::HashValue;
use modulr_logger::prelude::*;
use modulr_sector_manager::SectorManager;
use modulr_types::{
    account::AccountId,
    reliability_signal::ReliabilitySignal,
    transaction::{SigType, Transaction, TxType},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The validator's ruling for one accused partner.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub user: String,
    pub signal: ReliabilitySignal,
    pub job_id: String,
}

/// Outcome of adjudicating one escalation: a verdict per accused partner
/// plus one for the reporter.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Adjudication {
    pub challenge_id: String,
    pub sector_id: String,
    pub expected_hash: HashValue,
    pub verdicts: Vec<Verdict>,
}

/// Validator-side enforcement. The validator never trusts either side of a
/// dispute: it replays the sector's mutation log to the challenge timestamp
/// and recomputes the slice hash itself.
#[derive(Debug)]
pub struct ValidatorChallenger {
    validator_id: AccountId,
}

impl ValidatorChallenger {
    pub fn new(validator_id: AccountId) -> Self {
        Self { validator_id }
    }

    pub fn validator_id(&self) -> &AccountId {
        &self.validator_id
    }

    /// Credits every responder of a unanimous round. No reporter signal is
    /// issued, nothing was disputed.
    pub fn acknowledge_success(
        &self,
        spec: &crate::partner::ChallengeSpec,
        agreed_hash: HashValue,
    ) -> Adjudication {
        let verdicts = spec
            .responders
            .iter()
            .map(|responder| Verdict {
                user: responder.clone(),
                signal: ReliabilitySignal::ChallengeSucceeded,
                job_id: spec.challenge_id.clone(),
            })
            .collect();
        Adjudication {
            challenge_id: spec.challenge_id.clone(),
            sector_id: spec.sector_id.clone(),
            expected_hash: agreed_hash,
            verdicts,
        }
    }

    /// Settles an escalated challenge. `reported` carries the hash each
    /// responder originally returned.
    pub fn adjudicate(
        &self,
        escalation: &Escalation,
        sector: &SectorManager,
        reported: &BTreeMap<String, HashValue>,
    ) -> Adjudication {
        let state = sector.get_state_at(escalation.timestamp);
        let content = SectorManager::flat_encoding(&state);
        let expected_hash = content
            .as_bytes()
            .slice_hash(escalation.offset, escalation.length);

        let mut verdicts = Vec::new();
        let mut any_failed = false;
        for accused in &escalation.suspected_faulty {
            let matched = reported.get(accused) == Some(&expected_hash);
            if !matched {
                any_failed = true;
            }
            verdicts.push(Verdict {
                user: accused.clone(),
                signal: if matched {
                    ReliabilitySignal::ChallengeSucceeded
                } else {
                    ReliabilitySignal::ChallengeFailed
                },
                job_id: escalation.challenge_id.clone(),
            });
        }

        // The reporter is judged by whether the escalation was warranted.
        verdicts.push(Verdict {
            user: escalation.reporter.clone(),
            signal: if any_failed {
                ReliabilitySignal::ValidatorUpheldReport
            } else {
                ReliabilitySignal::ValidatorDismissedReport
            },
            job_id: escalation.challenge_id.clone(),
        });

        info!(
            challenge_id = %escalation.challenge_id,
            sector_id = %escalation.sector_id,
            upheld = any_failed,
            accused = escalation.suspected_faulty.len() as u64,
            "Adjudicated storage challenge"
        );

        Adjudication {
            challenge_id: escalation.challenge_id.clone(),
            sector_id: escalation.sector_id.clone(),
            expected_hash,
            verdicts,
        }
    }
}

impl Adjudication {
    /// Renders the verdicts as unsigned zero-value transactions from the
    /// validator, ready to be signed and admitted to the mempool so the
    /// reliability updates ride the ordered stream.
    pub fn into_transactions(self, creator: AccountId, first_nonce: u64) -> Vec<Transaction> {
        self.verdicts
            .into_iter()
            .enumerate()
            .map(|(i, verdict)| {
                let mut payload = BTreeMap::new();
                payload.insert("user".to_string(), serde_json::json!(verdict.user));
                payload.insert("job_id".to_string(), serde_json::json!(verdict.job_id));
                payload.insert("signal".to_string(), serde_json::json!(verdict.signal));
                payload.insert("reporter".to_string(), serde_json::Value::Null);
                Transaction {
                    v: 1,
                    fee: 0,
                    creator: creator.clone(),
                    sig: String::new(),
                    tx_type: TxType::ReliabilitySignal,
                    sig_type: SigType::Ed25519,
                    nonce: first_nonce + i as u64,
                    payload,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partner::{compare_responses, RoundOutcome};
    use modulr_reliability::{ReliabilityEngine, SignalOutcome};
    use modulr_sector_manager::{Mutation, MutationAction};

    fn challenged_sector() -> SectorManager {
        let mut sector = SectorManager::new("sector_X1", 4 * 1024 * 1024 * 1024);
        sector
            .apply_mutation(Mutation {
                job_id: "job-001".to_string(),
                timestamp: 1_000,
                user: "@bob".to_string(),
                action: MutationAction::Write,
                affected: vec!["a.txt".to_string(), "b.txt".to_string()],
            })
            .unwrap();
        sector
    }

    fn honest_hash(sector: &SectorManager, at: u64, offset: u64, length: u64) -> HashValue {
        let content = SectorManager::flat_encoding(&sector.get_state_at(at));
        content.as_bytes().slice_hash(offset, length)
    }

    fn escalation_for(
        sector: &SectorManager,
        responses: &BTreeMap<String, HashValue>,
    ) -> Escalation {
        let outcome = compare_responses(responses);
        let (groups, suspected_faulty) = match outcome {
            RoundOutcome::Mismatch {
                groups,
                suspected_faulty,
            } => (groups, suspected_faulty),
            other => panic!("expected mismatch, got {:?}", other),
        };
        Escalation {
            challenge_id: "CHAL-0001".to_string(),
            sector_id: sector.sector_id.clone(),
            reporter: "@PartnerA".to_string(),
            offset: 4,
            length: 8,
            timestamp: 1_500,
            groups,
            suspected_faulty,
        }
    }

    #[test]
    fn test_corrupt_replica_fails_and_report_upheld() {
        let sector = challenged_sector();
        let good = honest_hash(&sector, 1_500, 4, 8);
        let bad = HashValue::from_hex(&format!("badf00d{}", &good.to_hex()[7..])).unwrap();

        let mut responses = BTreeMap::new();
        responses.insert("@PartnerB".to_string(), bad);
        responses.insert("@PartnerC".to_string(), good);
        responses.insert("@PartnerD".to_string(), good);

        let escalation = escalation_for(&sector, &responses);
        let validator = ValidatorChallenger::new(AccountId::from(HashValue::sha256_of(b"v")));
        let adjudication = validator.adjudicate(&escalation, &sector, &responses);

        assert_eq!(adjudication.expected_hash, good);
        let mut engine = ReliabilityEngine::default();
        for verdict in &adjudication.verdicts {
            let outcome =
                engine.apply_signal(&verdict.user, verdict.signal, &verdict.job_id, None);
            assert!(matches!(outcome, SignalOutcome::Applied(_)));
        }
        // -15 at level 1 floors at 0 XP; the upheld reporter gains 25.
        assert_eq!(engine.xp("@PartnerB"), 0);
        assert_eq!(engine.xp("@PartnerA"), 25);
    }

    #[test]
    fn test_false_report_is_dismissed() {
        let sector = challenged_sector();
        let good = honest_hash(&sector, 1_500, 4, 8);

        // Two replicas agree on a different (stale) hash; the lone honest
        // responder lands in the minority and gets accused.
        let stale = HashValue::sha256_of(b"stale-state");
        let mut responses = BTreeMap::new();
        responses.insert("@PartnerB".to_string(), good);
        responses.insert("@PartnerC".to_string(), stale);
        responses.insert("@PartnerD".to_string(), stale);

        let escalation = escalation_for(&sector, &responses);
        assert_eq!(escalation.suspected_faulty, vec!["@PartnerB".to_string()]);

        let validator = ValidatorChallenger::new(AccountId::from(HashValue::sha256_of(b"v")));
        let adjudication = validator.adjudicate(&escalation, &sector, &responses);

        // The accused actually matched the validator's recomputation.
        assert_eq!(
            adjudication.verdicts[0].signal,
            ReliabilitySignal::ChallengeSucceeded
        );
        assert_eq!(
            adjudication.verdicts.last().unwrap().signal,
            ReliabilitySignal::ValidatorDismissedReport
        );
    }

    /// A replica that answers challenges by materializing slices of an
    /// enormous uniform sector without holding it in memory.
    struct UniformSector {
        byte: u8,
        size: u64,
    }

    impl SliceSource for UniformSector {
        fn read_slice(&self, offset: u64, length: u64) -> Vec<u8> {
            let start = offset.min(self.size);
            let end = offset.saturating_add(length).min(self.size);
            vec![self.byte; (end - start) as usize]
        }
    }

    #[test]
    fn test_unanimous_round_rewards_every_responder() {
        use crate::partner::{draw_challenge, ChallengeSpec};

        // 4 GiB of 'A'; every replica hashes the same 32-byte slice.
        let replica = UniformSector {
            byte: b'A',
            size: 4 * 1024 * 1024 * 1024,
        };
        let agreed = replica.slice_hash(123_456, 32);
        assert_eq!(agreed, HashValue::sha256_of(&[b'A'; 32]));

        let holders: Vec<String> = ["@PartnerB", "@PartnerC", "@PartnerD"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let pool: Vec<String> = ["@PartnerA", "@PartnerB", "@PartnerC", "@PartnerD"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let spec: ChallengeSpec = draw_challenge(
            &HashValue::sha256_of(b"block"),
            "sector_X1",
            replica.size,
            &holders,
            &pool,
        )
        .unwrap();

        let mut responses = BTreeMap::new();
        for holder in &holders {
            responses.insert(holder.clone(), replica.slice_hash(spec.offset, spec.length));
        }
        let outcome = compare_responses(&responses);
        assert!(matches!(outcome, RoundOutcome::Unanimous { .. }));
        assert!(Escalation::from_outcome(&spec, &outcome, 1_500).is_none());

        let validator = ValidatorChallenger::new(AccountId::from(HashValue::sha256_of(b"v")));
        let adjudication =
            validator.acknowledge_success(&spec, replica.slice_hash(spec.offset, spec.length));

        let mut engine = ReliabilityEngine::default();
        for verdict in &adjudication.verdicts {
            engine.apply_signal(&verdict.user, verdict.signal, &verdict.job_id, None);
        }
        for holder in &holders {
            assert_eq!(engine.xp(holder), 10);
        }
    }

    #[test]
    fn test_verdicts_become_zero_value_transactions() {
        let sector = challenged_sector();
        let good = honest_hash(&sector, 1_500, 4, 8);
        let bad = HashValue::sha256_of(b"junk");
        let mut responses = BTreeMap::new();
        responses.insert("@PartnerB".to_string(), bad);
        responses.insert("@PartnerC".to_string(), good);
        responses.insert("@PartnerD".to_string(), good);

        let escalation = escalation_for(&sector, &responses);
        let validator = ValidatorChallenger::new(AccountId::from(HashValue::sha256_of(b"v")));
        let adjudication = validator.adjudicate(&escalation, &sector, &responses);
        let creator = AccountId::from(HashValue::sha256_of(b"v"));
        let txs = adjudication.into_transactions(creator, 7);

        assert_eq!(txs.len(), 2);
        assert!(txs.iter().all(|tx| tx.fee == 0));
        assert_eq!(txs[0].nonce, 7);
        assert_eq!(txs[1].nonce, 8);
        assert!(txs
            .iter()
            .all(|tx| tx.tx_type == TxType::ReliabilitySignal));
    }
}
