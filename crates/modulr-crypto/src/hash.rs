// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::{
    convert::TryFrom,
    fmt,
    str::FromStr,
};
use thiserror::Error;

/// Output value of the network hash function (sha256).
///
/// Hashes travel on the wire and inside canonical encodings as lowercase hex
/// strings, so `Display`, `FromStr` and the serde impls all speak hex. The
/// all-zero value is the distinguished hash that the first block of an epoch
/// links to.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HashValue([u8; HashValue::LENGTH]);

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("unable to parse HashValue")]
pub struct HashValueParseError;

impl HashValue {
    /// Length of the hash in bytes.
    pub const LENGTH: usize = 32;

    pub const fn new(bytes: [u8; HashValue::LENGTH]) -> Self {
        Self(bytes)
    }

    /// The distinguished zero hash, rendered as 64 `'0'` characters.
    pub const fn zero() -> Self {
        Self([0; HashValue::LENGTH])
    }

    /// Hashes arbitrary bytes with the network hash function.
    pub fn sha256_of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; HashValue::LENGTH];
        bytes.copy_from_slice(digest.as_ref());
        Self(bytes)
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering, the canonical wire form.
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, HashValueParseError> {
        let bytes = hex::decode(hex_str).map_err(|_| HashValueParseError)?;
        Self::try_from(bytes.as_slice())
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }
}

impl TryFrom<&[u8]> for HashValue {
    type Error = HashValueParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != Self::LENGTH {
            return Err(HashValueParseError);
        }
        let mut out = [0u8; Self::LENGTH];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }
}

impl FromStr for HashValue {
    type Err = HashValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({})", self.to_hex())
    }
}

impl Serialize for HashValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HashValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String>::deserialize(deserializer)?;
        HashValue::from_hex(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_hash_renders_as_64_zeros() {
        assert_eq!(HashValue::zero().to_hex(), "0".repeat(64));
    }

    #[test]
    fn test_hex_round_trip() {
        let h = HashValue::sha256_of(b"modulr");
        let parsed = HashValue::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_rejects_bad_hex() {
        assert!(HashValue::from_hex("zz").is_err());
        assert!(HashValue::from_hex(&"ab".repeat(31)).is_err());
    }

    #[test]
    fn test_serde_uses_hex_strings() {
        let h = HashValue::sha256_of(b"abc");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: HashValue = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
