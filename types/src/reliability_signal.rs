// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Consensus-confirmed events that move a reliability score. The deltas are
/// protocol constants; changing them is a network upgrade.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReliabilitySignal {
    ChallengeSucceeded,
    ChallengeFailed,
    MaliciousBehavior,
    ValidatorUpheldReport,
    ValidatorDismissedReport,
    UsernamePurchased,
    SubscriptionPurchased,
}

impl ReliabilitySignal {
    pub fn xp_delta(self) -> i64 {
        match self {
            ReliabilitySignal::ChallengeSucceeded => 10,
            ReliabilitySignal::ChallengeFailed => -15,
            ReliabilitySignal::MaliciousBehavior => -100,
            ReliabilitySignal::ValidatorUpheldReport => 25,
            ReliabilitySignal::ValidatorDismissedReport => -5,
            ReliabilitySignal::UsernamePurchased => 250,
            ReliabilitySignal::SubscriptionPurchased => 500,
        }
    }
}

impl fmt::Display for ReliabilitySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReliabilitySignal::ChallengeSucceeded => "CHALLENGE_SUCCEEDED",
            ReliabilitySignal::ChallengeFailed => "CHALLENGE_FAILED",
            ReliabilitySignal::MaliciousBehavior => "MALICIOUS_BEHAVIOR",
            ReliabilitySignal::ValidatorUpheldReport => "VALIDATOR_UPHELD_REPORT",
            ReliabilitySignal::ValidatorDismissedReport => "VALIDATOR_DISMISSED_REPORT",
            ReliabilitySignal::UsernamePurchased => "USERNAME_PURCHASED",
            ReliabilitySignal::SubscriptionPurchased => "SUBSCRIPTION_PURCHASED",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normative_deltas() {
        assert_eq!(ReliabilitySignal::ChallengeSucceeded.xp_delta(), 10);
        assert_eq!(ReliabilitySignal::ChallengeFailed.xp_delta(), -15);
        assert_eq!(ReliabilitySignal::MaliciousBehavior.xp_delta(), -100);
        assert_eq!(ReliabilitySignal::ValidatorUpheldReport.xp_delta(), 25);
        assert_eq!(ReliabilitySignal::ValidatorDismissedReport.xp_delta(), -5);
        assert_eq!(ReliabilitySignal::UsernamePurchased.xp_delta(), 250);
        assert_eq!(ReliabilitySignal::SubscriptionPurchased.xp_delta(), 500);
    }

    #[test]
    fn test_wire_spelling() {
        let json = serde_json::to_string(&ReliabilitySignal::ChallengeFailed).unwrap();
        assert_eq!(json, "\"CHALLENGE_FAILED\"");
    }
}
