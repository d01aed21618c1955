// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

mod index;
mod mempool;
mod transaction_store;

pub use self::mempool::{AddStatus, CoreMempool};
