// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Deterministic leader-sequence derivation. Every node must arrive at the
//! same permutation of the pools registry from the same epoch inputs, so
//! the shuffle is keyed by a hash and driven by a counter-mode sha256
//! stream rather than a process RNG.

use modulr_crypto::HashValue;
use modulr_types::account::AccountId;
use std::collections::BTreeSet;

/// Expands `H(prev_epoch_hash ‖ network_id ‖ epoch_seed)` into a stream of
/// u64 draws.
struct SeedStream {
    key: HashValue,
    counter: u64,
}

impl SeedStream {
    fn new(prev_epoch_hash: &HashValue, network_id: &str, epoch_seed: &str) -> Self {
        let key = HashValue::sha256_of(
            format!("{}{}{}", prev_epoch_hash.to_hex(), network_id, epoch_seed).as_bytes(),
        );
        Self { key, counter: 0 }
    }

    fn next_u64(&mut self) -> u64 {
        let block =
            HashValue::sha256_of(format!("{}{}", self.key.to_hex(), self.counter).as_bytes());
        self.counter += 1;
        let mut out = [0u8; 8];
        out.copy_from_slice(&block.as_slice()[..8]);
        u64::from_be_bytes(out)
    }
}

/// Fisher–Yates over the sorted registry, keyed by the epoch inputs.
pub fn derive_leaders_sequence(
    pools_registry: &BTreeSet<AccountId>,
    prev_epoch_hash: &HashValue,
    network_id: &str,
    epoch_seed: &str,
) -> Vec<AccountId> {
    let mut sequence: Vec<AccountId> = pools_registry.iter().cloned().collect();
    let mut stream = SeedStream::new(prev_epoch_hash, network_id, epoch_seed);
    for i in (1..sequence.len()).rev() {
        let j = (stream.next_u64() % (i as u64 + 1)) as usize;
        sequence.swap(i, j);
    }
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn registry(n: u8) -> BTreeSet<AccountId> {
        (0..n)
            .map(|i| AccountId::from_str(&hex::encode([i; 32])).unwrap())
            .collect()
    }

    #[test]
    fn test_same_inputs_same_sequence() {
        let pools = registry(7);
        let hash = HashValue::sha256_of(b"epoch-3");
        let a = derive_leaders_sequence(&pools, &hash, "testnet", "seed");
        let b = derive_leaders_sequence(&pools, &hash, "testnet", "seed");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sequence_is_a_permutation() {
        let pools = registry(9);
        let hash = HashValue::sha256_of(b"epoch-3");
        let sequence = derive_leaders_sequence(&pools, &hash, "testnet", "seed");
        assert_eq!(sequence.len(), 9);
        let as_set: BTreeSet<_> = sequence.iter().cloned().collect();
        assert_eq!(as_set, pools);
    }

    #[test]
    fn test_different_seeds_differ() {
        let pools = registry(16);
        let hash = HashValue::sha256_of(b"epoch-3");
        let a = derive_leaders_sequence(&pools, &hash, "testnet", "seed-a");
        let b = derive_leaders_sequence(&pools, &hash, "testnet", "seed-b");
        // A 16-element permutation colliding by chance is ~1/2e13.
        assert_ne!(a, b);
    }

    #[test]
    fn test_small_registries() {
        let hash = HashValue::zero();
        assert!(derive_leaders_sequence(&registry(0), &hash, "n", "s").is_empty());
        assert_eq!(derive_leaders_sequence(&registry(1), &hash, "n", "s").len(), 1);
    }
}
