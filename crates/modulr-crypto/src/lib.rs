// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Crypto primitives for the Modulr core: the 32-byte [`HashValue`] every
//! chain structure commits to, and the [`CryptoHandler`] seam behind which
//! the concrete signature scheme lives. The production handler is ed25519
//! with x25519 key exchange and AES-256-GCM payload encryption.

pub mod ed25519;
pub mod hash;
mod traits;

pub use ed25519::Ed25519Handler;
pub use hash::HashValue;
pub use traits::{CryptoError, CryptoHandler, KeyPair};
