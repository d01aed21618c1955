// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The two-tier storage challenge protocol.
//!
//! Partners cheaply police each other first: a deterministically drawn
//! challenger asks every replica holder for the hash of the same small
//! slice, and only disagreement escalates to a validator. The validator
//! reconstructs the expected sector state from the mutation log, recomputes
//! the slice hash itself and settles the dispute through reliability
//! signals, emitted as zero-value transactions so they enter the same total
//! order as everything else.

mod partner;
mod validator;

pub use partner::{
    compare_responses, draw_challenge, ChallengeError, ChallengeSpec, Escalation, RoundOutcome,
    SliceSource, SLICE_LENGTH,
};
pub use validator::{Adjudication, ValidatorChallenger, Verdict};
