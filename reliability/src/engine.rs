// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::profile::{ReliabilityProfile, SignalEvent};
use modulr_logger::prelude::*;
use modulr_types::reliability_signal::ReliabilitySignal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default bound of the per-user history ring.
pub const DEFAULT_MAX_HISTORY: usize = 25;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    DuplicateJobId,
}

/// Result of feeding one signal through the engine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignalOutcome {
    Applied(SignalEvent),
    Ignored {
        user: String,
        job_id: String,
        reason: IgnoreReason,
    },
}

/// Owns every profile. Single writer: only the task consuming confirmed
/// reliability-signal transactions calls [`apply_signal`].
///
/// [`apply_signal`]: ReliabilityEngine::apply_signal
#[derive(Debug)]
pub struct ReliabilityEngine {
    profiles: BTreeMap<String, ReliabilityProfile>,
    max_history: usize,
}

impl Default for ReliabilityEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ReliabilityEngine {
    pub fn new(max_history: usize) -> Self {
        Self {
            profiles: BTreeMap::new(),
            max_history,
        }
    }

    /// Ensures a profile exists, at level 1 with zero XP.
    pub fn initialize_user(&mut self, user: &str) -> &ReliabilityProfile {
        self.profiles
            .entry(user.to_string())
            .or_insert_with(|| ReliabilityProfile::new(user))
    }

    /// Applies one consensus-confirmed signal. A `(user, job_id)` pair moves
    /// XP at most once; replays return the `Ignored` sentinel unchanged.
    pub fn apply_signal(
        &mut self,
        user: &str,
        signal: ReliabilitySignal,
        job_id: &str,
        reporter: Option<&str>,
    ) -> SignalOutcome {
        self.initialize_user(user);
        let max_history = self.max_history;
        let profile = self
            .profiles
            .get_mut(user)
            .expect("profile initialized above");

        if profile.has_seen_job(job_id) {
            debug!(user = user, job_id = job_id, "Duplicate job id, signal ignored");
            return SignalOutcome::Ignored {
                user: user.to_string(),
                job_id: job_id.to_string(),
                reason: IgnoreReason::DuplicateJobId,
            };
        }

        let event = profile.apply(signal, job_id, reporter.map(String::from), max_history);
        info!(
            user = user,
            job_id = job_id,
            signal = %signal,
            new_xp = event.new_xp,
            new_level = event.new_level,
            "Applied reliability signal"
        );
        SignalOutcome::Applied(event)
    }

    pub fn profile(&self, user: &str) -> Option<&ReliabilityProfile> {
        self.profiles.get(user)
    }

    pub fn level(&self, user: &str) -> u32 {
        self.profiles.get(user).map_or(1, |p| p.level())
    }

    pub fn xp(&self, user: &str) -> i64 {
        self.profiles.get(user).map_or(0, |p| p.xp())
    }

    /// Admission gate: a peer may enrol iff its score is at or above the
    /// run-rules floor.
    pub fn meets_threshold(&self, user: &str, min_score: i64) -> bool {
        self.profiles
            .get(user)
            .map_or(ReliabilityProfile::new(user).admission_score() >= min_score, |p| {
                p.admission_score() >= min_score
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_duplicate_job_is_ignored_and_state_unchanged() {
        let mut engine = ReliabilityEngine::default();
        let first = engine.apply_signal("@Bob", ReliabilitySignal::ChallengeFailed, "J1", None);
        assert!(matches!(first, SignalOutcome::Applied(_)));
        let xp_after_first = engine.xp("@Bob");
        let level_after_first = engine.level("@Bob");

        let second = engine.apply_signal("@Bob", ReliabilitySignal::ChallengeFailed, "J1", None);
        assert_eq!(
            second,
            SignalOutcome::Ignored {
                user: "@Bob".to_string(),
                job_id: "J1".to_string(),
                reason: IgnoreReason::DuplicateJobId,
            }
        );
        assert_eq!(engine.xp("@Bob"), xp_after_first);
        assert_eq!(engine.level("@Bob"), level_after_first);
    }

    #[test]
    fn test_same_job_different_users_both_apply() {
        let mut engine = ReliabilityEngine::default();
        let a = engine.apply_signal("@A", ReliabilitySignal::ChallengeSucceeded, "J1", None);
        let b = engine.apply_signal("@B", ReliabilitySignal::ChallengeSucceeded, "J1", None);
        assert!(matches!(a, SignalOutcome::Applied(_)));
        assert!(matches!(b, SignalOutcome::Applied(_)));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut engine = ReliabilityEngine::new(3);
        for i in 0..10 {
            engine.apply_signal(
                "@Bob",
                ReliabilitySignal::ChallengeSucceeded,
                &format!("J{}", i),
                Some("@Alice"),
            );
        }
        let profile = engine.profile("@Bob").unwrap();
        let history: Vec<_> = profile.history().collect();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].job_id, "J7");
        assert_eq!(history[2].job_id, "J9");
    }

    #[test]
    fn test_malicious_behavior_drops_fast() {
        let mut engine = ReliabilityEngine::default();
        engine.apply_signal("@Bob", ReliabilitySignal::SubscriptionPurchased, "J1", None);
        let level_before = engine.level("@Bob");
        engine.apply_signal("@Bob", ReliabilitySignal::MaliciousBehavior, "J2", None);
        assert!(engine.level("@Bob") < level_before || engine.xp("@Bob") < 100);
    }

    #[test]
    fn test_admission_gate() {
        let mut engine = ReliabilityEngine::default();
        engine.initialize_user("@Fresh");
        // Level 1, 0 XP: score 10.
        assert!(engine.meets_threshold("@Fresh", 10));
        assert!(!engine.meets_threshold("@Fresh", 420));
        // An unknown user is scored as a fresh profile.
        assert!(!engine.meets_threshold("@Nobody", 420));
    }

    proptest! {
        /// Any signal sequence keeps profiles inside the valid band.
        #[test]
        fn test_state_stays_in_band(
            seed_signals in prop::collection::vec(0usize..7, 0..40),
        ) {
            let all = [
                ReliabilitySignal::ChallengeSucceeded,
                ReliabilitySignal::ChallengeFailed,
                ReliabilitySignal::MaliciousBehavior,
                ReliabilitySignal::ValidatorUpheldReport,
                ReliabilitySignal::ValidatorDismissedReport,
                ReliabilitySignal::UsernamePurchased,
                ReliabilitySignal::SubscriptionPurchased,
            ];
            let mut engine = ReliabilityEngine::default();
            for (i, idx) in seed_signals.iter().enumerate() {
                engine.apply_signal("@P", all[*idx], &format!("seed-{}", i), None);
            }
            let level = engine.level("@P");
            let xp = engine.xp("@P");
            prop_assert!((1..=100).contains(&level));
            prop_assert!(xp >= 0);
            prop_assert!(xp < crate::xp_requirement(level));
        }
    }
}
