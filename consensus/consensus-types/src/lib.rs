// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Data structures of the consensus protocol: blocks, the votes quorum
//! members exchange, and the three aggregated proofs (AFP, AEFP, ALRP) that
//! make finality, epoch closure and leader skipping explicit on chain.

pub mod block;
pub mod common;
pub mod proofs;
pub mod vote;
