// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// A freshly generated signing keypair, raw bytes in both directions so the
/// handler implementation owns the encoding.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key material is malformed: {0}")]
    MalformedKey(String),
    #[error("key file not found or unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("signature creation failed")]
    SigningFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed or ciphertext tampered")]
    DecryptionFailed,
}

/// The seam between the node and the concrete signature scheme.
///
/// Everything above this trait treats keys, signatures and ciphertexts as
/// opaque bytes; only the handler knows the curve. Handlers must be cheap to
/// share across tasks.
pub trait CryptoHandler: Send + Sync {
    /// Generates a fresh signing keypair from the system RNG.
    fn generate_keys(&self) -> Result<KeyPair, CryptoError>;

    /// Canonical printable form of a public key (lowercase hex).
    fn serialize_public_key(&self, public: &[u8]) -> String;

    /// Persists a keypair as `<label>.pub` / `<label>.key` under `dir`.
    fn save_keys(&self, pair: &KeyPair, dir: &Path, label: &str) -> Result<(), CryptoError>;

    fn load_private_key(&self, dir: &Path, label: &str) -> Result<Vec<u8>, CryptoError>;

    fn load_public_key(&self, dir: &Path, label: &str) -> Result<Vec<u8>, CryptoError>;

    fn sign(&self, private: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn verify(&self, public: &[u8], message: &[u8], signature: &[u8]) -> bool;

    /// AEAD encryption with a 32-byte symmetric key; the nonce is carried in
    /// the ciphertext.
    fn symmetric_encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn symmetric_decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Sealed-box encryption to a recipient's signing public key: an
    /// ephemeral exchange key is generated per message and prepended.
    fn asymmetric_encrypt(
        &self,
        recipient_public: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    fn asymmetric_decrypt(&self, private: &[u8], ciphertext: &[u8])
        -> Result<Vec<u8>, CryptoError>;

    /// Static-static key agreement for long-lived peer sessions.
    fn derive_symmetric_key(
        &self,
        private: &[u8],
        peer_public: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;
}
