// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Wall-clock reads in the units the protocol speaks. Epoch windows,
//! leader tenures and mutation logs are all stamped in unix milliseconds;
//! wire headers carry unix seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Elapsed time since the unix epoch. A clock set before 1970 is a broken
/// host, not a condition to recover from.
pub fn duration_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("host clock is set before the unix epoch")
}

/// Current unix time in milliseconds, the protocol's native unit.
pub fn unix_millis() -> u64 {
    duration_since_epoch().as_millis() as u64
}

/// Current unix time in whole seconds, the wire-header unit.
pub fn unix_secs() -> u64 {
    duration_since_epoch().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_are_consistent() {
        let millis = unix_millis();
        let secs = unix_secs();
        // Reads are moments apart; the second-granularity values must agree
        // to within a couple of seconds.
        assert!((millis / 1000).abs_diff(secs) <= 2);
    }

    #[test]
    fn test_clock_does_not_run_backwards_across_reads() {
        let first = unix_millis();
        let second = unix_millis();
        assert!(second >= first);
    }
}
