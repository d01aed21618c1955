// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The pending-transaction store. One task ingests, the block-generation
//! task drains; both sides go through [`CoreMempool`] behind a mutex that is
//! never held across a suspension point.

pub mod core_mempool;

pub use core_mempool::{AddStatus, CoreMempool};
