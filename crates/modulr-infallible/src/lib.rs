// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Shared-state primitives with the failure modes the node can actually
//! tolerate removed from their signatures.
//!
//! Lock poisoning is unrecoverable for a validator: a panic mid-update
//! means the guarded state can no longer be trusted, and limping on would
//! risk signing over corrupt data. The [`Mutex`] and [`RwLock`] here
//! therefore abort on poison instead of returning a `Result` nobody can
//! act on. The [`time`] module plays the same role for the wall clock,
//! which the protocol reads everywhere in unix milliseconds.

mod sync;
pub mod time;

pub use sync::{Mutex, RwLock};
pub use time::{duration_since_epoch, unix_millis, unix_secs};
