// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use modulr_crypto::HashValue;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Identity of any participant on the network: the lowercase-hex encoding of
/// a 32-byte ed25519 public key. This is the form keys travel in on the wire
/// and the form every registry, quorum list and proof map is keyed by.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AccountIdParseError {
    #[error("account id must be 64 lowercase hex characters, got {0} characters")]
    WrongLength(usize),
    #[error("account id contains non-hex characters")]
    NotHex,
}

impl AccountId {
    pub const LENGTH: usize = 64;

    /// Wraps raw public key bytes.
    pub fn from_public_key(public: &[u8]) -> Self {
        Self(hex::encode(public))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw public key bytes for signature verification.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AccountIdParseError> {
        hex::decode(&self.0).map_err(|_| AccountIdParseError::NotHex)
    }

    /// Short prefix for log lines.
    pub fn short_str(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl FromStr for AccountId {
    type Err = AccountIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LENGTH {
            return Err(AccountIdParseError::WrongLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(AccountIdParseError::NotHex);
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<HashValue> for AccountId {
    /// Test fixtures derive stable ids from hashes.
    fn from(hash: HashValue) -> Self {
        Self(hash.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let id: AccountId = "ab".repeat(32).parse().unwrap();
        assert_eq!(id.to_bytes().unwrap(), vec![0xab; 32]);
    }

    #[test]
    fn test_rejects_uppercase_and_short() {
        assert!("AB".repeat(32).parse::<AccountId>().is_err());
        assert!("abcd".parse::<AccountId>().is_err());
    }
}
