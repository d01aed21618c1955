// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The co-chain consensus engine: rotating-leader block production with
//! explicit aggregated proofs for finality (AFP), leader skipping (ALRP)
//! and epoch closure (AEFP).
//!
//! The crate is a set of deterministic components; the node orchestrator
//! wires them to timers and the network. Nothing here talks to a socket.

pub mod chain_store;
pub mod counters;
pub mod epoch_rollover;
pub mod finalization;
pub mod generation;
pub mod leader_rotation;
pub mod leader_schedule;
mod schema;
pub mod vote_verifier;
