// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

pub static EPOCH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("modulr_consensus_epoch", "Current epoch id").unwrap()
});

pub static CURRENT_EPOCH_QUORUM: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "modulr_consensus_current_epoch_quorum",
        "Quorum size of the current epoch"
    )
    .unwrap()
});

pub static COMMITTED_BLOCKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "modulr_consensus_committed_blocks",
        "Blocks committed with a valid AFP"
    )
    .unwrap()
});

pub static LEADER_ROTATIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "modulr_consensus_leader_rotations",
        "ALRPs assembled against silent leaders"
    )
    .unwrap()
});

pub static EQUIVOCATIONS_DETECTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "modulr_consensus_equivocations_detected",
        "Distinct leader equivocations observed"
    )
    .unwrap()
});

pub static REJECTED_CANDIDATES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "modulr_consensus_rejected_candidates",
        "Candidate blocks that did not earn a vote"
    )
    .unwrap()
});
