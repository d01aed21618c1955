// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{
    account::AccountId,
    canonical::canonical_hash,
    reliability_signal::ReliabilitySignal,
};
use anyhow::{ensure, Result};
use modulr_crypto::{CryptoHandler, HashValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Signature scheme tag carried by every transaction. Only ed25519 is live
/// today; the tag exists so the scheme can be rotated per transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigType {
    Ed25519,
}

/// Dispatch tag for the opaque payload map.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxType {
    Transfer,
    ReliabilitySignal,
    SectorCheckpoint,
}

/// A signed user request. `sig` covers the canonical encoding of every other
/// field; `nonce` is strictly monotonic per creator.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub v: u8,
    pub fee: u64,
    pub creator: AccountId,
    pub sig: String,
    pub tx_type: TxType,
    pub sig_type: SigType,
    pub nonce: u64,
    pub payload: BTreeMap<String, serde_json::Value>,
}

/// The unsigned view a signature is computed over.
#[derive(Serialize)]
struct SignableTransaction<'a> {
    v: u8,
    fee: u64,
    creator: &'a AccountId,
    tx_type: TxType,
    sig_type: SigType,
    nonce: u64,
    payload: &'a BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload does not match tx_type {0:?}: {1}")]
    Shape(TxType, serde_json::Error),
}

/// Typed view of a payload, decoded at the consensus boundary. Below this
/// boundary payloads stay opaque maps.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxPayload {
    Transfer {
        to: AccountId,
        amount: u64,
    },
    ReliabilitySignal {
        user: String,
        job_id: String,
        signal: ReliabilitySignal,
        reporter: Option<String>,
    },
    SectorCheckpoint {
        sector_id: String,
        root: HashValue,
        timestamp: u64,
    },
}

impl Transaction {
    /// Identity of the transaction, the mempool key.
    pub fn hash(&self) -> Result<HashValue> {
        canonical_hash(self)
    }

    /// Digest the signature must cover.
    pub fn signing_hash(&self) -> Result<HashValue> {
        canonical_hash(&SignableTransaction {
            v: self.v,
            fee: self.fee,
            creator: &self.creator,
            tx_type: self.tx_type,
            sig_type: self.sig_type,
            nonce: self.nonce,
            payload: &self.payload,
        })
    }

    pub fn sign(&mut self, handler: &dyn CryptoHandler, private: &[u8]) -> Result<()> {
        let digest = self.signing_hash()?;
        let sig = handler
            .sign(private, digest.as_slice())
            .map_err(|e| anyhow::anyhow!("signing failed: {}", e))?;
        self.sig = hex::encode(sig);
        Ok(())
    }

    pub fn verify_signature(&self, handler: &dyn CryptoHandler) -> Result<()> {
        let digest = self.signing_hash()?;
        let public = self.creator.to_bytes()?;
        let sig = hex::decode(&self.sig)?;
        ensure!(
            handler.verify(&public, digest.as_slice(), &sig),
            "transaction signature does not verify for creator {}",
            self.creator.short_str()
        );
        Ok(())
    }

    /// Decodes the payload under the transaction's own type tag.
    pub fn typed_payload(&self) -> Result<TxPayload, PayloadError> {
        let value = serde_json::Value::Object(
            self.payload
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        let decode = |e| PayloadError::Shape(self.tx_type, e);
        match self.tx_type {
            TxType::Transfer => {
                #[derive(Deserialize)]
                struct Shape {
                    to: AccountId,
                    amount: u64,
                }
                let shape: Shape = serde_json::from_value(value).map_err(decode)?;
                Ok(TxPayload::Transfer {
                    to: shape.to,
                    amount: shape.amount,
                })
            }
            TxType::ReliabilitySignal => {
                #[derive(Deserialize)]
                struct Shape {
                    user: String,
                    job_id: String,
                    signal: ReliabilitySignal,
                    reporter: Option<String>,
                }
                let shape: Shape = serde_json::from_value(value).map_err(decode)?;
                Ok(TxPayload::ReliabilitySignal {
                    user: shape.user,
                    job_id: shape.job_id,
                    signal: shape.signal,
                    reporter: shape.reporter,
                })
            }
            TxType::SectorCheckpoint => {
                #[derive(Deserialize)]
                struct Shape {
                    sector_id: String,
                    root: HashValue,
                    timestamp: u64,
                }
                let shape: Shape = serde_json::from_value(value).map_err(decode)?;
                Ok(TxPayload::SectorCheckpoint {
                    sector_id: shape.sector_id,
                    root: shape.root,
                    timestamp: shape.timestamp,
                })
            }
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod test_helpers {
    use super::*;
    use modulr_crypto::{Ed25519Handler, KeyPair};

    pub fn funded_keypair() -> (KeyPair, AccountId) {
        let handler = Ed25519Handler::new();
        let pair = handler.generate_keys().unwrap();
        let id = AccountId::from_public_key(&pair.public);
        (pair, id)
    }

    pub fn signed_transfer(nonce: u64, fee: u64) -> (Transaction, KeyPair) {
        let handler = Ed25519Handler::new();
        let (pair, creator) = funded_keypair();
        let (_, recipient) = funded_keypair();
        let mut payload = BTreeMap::new();
        payload.insert("to".to_string(), serde_json::json!(recipient.as_str()));
        payload.insert("amount".to_string(), serde_json::json!(5u64));
        let mut tx = Transaction {
            v: 1,
            fee,
            creator,
            sig: String::new(),
            tx_type: TxType::Transfer,
            sig_type: SigType::Ed25519,
            nonce,
            payload,
        };
        tx.sign(&handler, &pair.private).unwrap();
        (tx, pair)
    }
}

#[cfg(test)]
mod tests {
    use super::{test_helpers::*, *};
    use modulr_crypto::Ed25519Handler;

    #[test]
    fn test_signature_round_trip() {
        let handler = Ed25519Handler::new();
        let (tx, _) = signed_transfer(0, 10);
        tx.verify_signature(&handler).unwrap();
    }

    #[test]
    fn test_tampered_fee_breaks_signature() {
        let handler = Ed25519Handler::new();
        let (mut tx, _) = signed_transfer(0, 10);
        tx.fee = 11;
        assert!(tx.verify_signature(&handler).is_err());
    }

    #[test]
    fn test_typed_payload_decodes_transfer() {
        let (tx, _) = signed_transfer(0, 10);
        match tx.typed_payload().unwrap() {
            TxPayload::Transfer { amount, .. } => assert_eq!(amount, 5),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_payload_shape_mismatch_is_typed() {
        let (mut tx, _) = signed_transfer(0, 10);
        tx.payload.remove("amount");
        assert!(matches!(
            tx.typed_payload(),
            Err(PayloadError::Shape(TxType::Transfer, _))
        ));
    }

    #[test]
    fn test_hash_is_stable_across_clone() {
        let (tx, _) = signed_transfer(3, 2);
        assert_eq!(tx.hash().unwrap(), tx.clone().hash().unwrap());
    }
}
