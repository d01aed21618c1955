// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The safety-critical slice of voting, kept deliberately small.
//!
//! A quorum member must never sign two distinct blocks at the same
//! `(epoch_full_id, index)`. That rule is enforced here and nowhere else:
//! the voted hash is persisted to the `FINALIZATION_VOTING_STATS` namespace
//! before any signature leaves the process, so a crash between persist and
//! send can at worst re-send the same vote. Everything stateful about
//! proposal validity (leader authorization, linkage, transaction checks)
//! belongs to the round logic above; by the time a block reaches
//! [`SafetyRules::construct_and_sign_vote`] it is structurally trusted.

mod error;
mod persistent_storage;
mod safety_rules;

pub use error::Error;
pub use persistent_storage::{PersistentSafetyStorage, VoteRecord, VOTING_STATS_CF};
pub use safety_rules::SafetyRules;
