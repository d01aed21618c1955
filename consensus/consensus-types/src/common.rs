// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use modulr_types::account::AccountId;

/// The author of a block or vote.
pub type Author = AccountId;

/// `H(epoch_hash ‖ network_id) # epoch_id`, as produced by
/// `EpochHandler::epoch_full_id`.
pub type EpochFullId = String;

/// Position of a block inside its epoch, 0-based.
pub type BlockIndex = u64;

/// `epoch_full_id#index`, the globally unique block identifier and the KV
/// key blocks are stored under.
pub fn block_id(epoch_full_id: &str, index: BlockIndex) -> String {
    format!("{}#{}", epoch_full_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_shape() {
        assert_eq!(block_id("abc#4", 7), "abc#4#7");
    }
}
