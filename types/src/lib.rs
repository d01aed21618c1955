// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Core types shared by every layer of the Modulr node: account identities,
//! transactions, epoch bookkeeping and the quorum arithmetic that every
//! aggregated proof is checked against.

pub mod account;
pub mod canonical;
pub mod epoch;
pub mod network_parameters;
pub mod quorum;
pub mod reliability_signal;
pub mod thread_metadata;
pub mod transaction;
