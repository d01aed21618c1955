// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The production [`CryptoHandler`]: ed25519 signatures, with the same key
//! material mapped onto curve25519 for key exchange so a node carries one
//! identity keypair. Payload encryption is AES-256-GCM through ring.

use crate::traits::{CryptoError, CryptoHandler, KeyPair};
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use rand::{rngs::OsRng, RngCore};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use sha2::{Digest, Sha512};
use std::{convert::TryFrom, fs, path::Path};

const KEY_LEN: usize = 32;
const AEAD_KEY_LEN: usize = 32;

/// Stateless handler; safe to share behind an `Arc<dyn CryptoHandler>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Handler;

impl Ed25519Handler {
    pub fn new() -> Self {
        Self
    }

    fn secret_from_bytes(private: &[u8]) -> Result<SecretKey, CryptoError> {
        SecretKey::from_bytes(private)
            .map_err(|_| CryptoError::MalformedKey("expected 32-byte ed25519 secret".into()))
    }

    /// Clamped curve25519 scalar for an ed25519 secret, per RFC 8032 key
    /// expansion.
    fn exchange_scalar(private: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
        Self::secret_from_bytes(private)?;
        let digest = Sha512::digest(private);
        let mut scalar = [0u8; KEY_LEN];
        scalar.copy_from_slice(&digest[..KEY_LEN]);
        scalar[0] &= 248;
        scalar[31] &= 127;
        scalar[31] |= 64;
        Ok(scalar)
    }

    /// Montgomery form of an ed25519 public key.
    fn exchange_point(public: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
        let bytes = <[u8; KEY_LEN]>::try_from(public)
            .map_err(|_| CryptoError::MalformedKey("expected 32-byte ed25519 public".into()))?;
        let edwards = CompressedEdwardsY(bytes)
            .decompress()
            .ok_or_else(|| CryptoError::MalformedKey("public key is not a curve point".into()))?;
        Ok(edwards.to_montgomery().to_bytes())
    }

    fn kdf(shared_secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let hkdf = hkdf::Hkdf::<sha2::Sha256>::new(Some(b"modulr-kex-v1"), shared_secret);
        let mut okm = vec![0u8; AEAD_KEY_LEN];
        hkdf.expand(b"session", &mut okm)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(okm)
    }

    fn aead_key(key: &[u8]) -> Result<LessSafeKey, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| CryptoError::MalformedKey("expected 32-byte symmetric key".into()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl CryptoHandler for Ed25519Handler {
    fn generate_keys(&self) -> Result<KeyPair, CryptoError> {
        let mut csprng = OsRng;
        let keypair = Keypair::generate(&mut csprng);
        Ok(KeyPair {
            public: keypair.public.to_bytes().to_vec(),
            private: keypair.secret.to_bytes().to_vec(),
        })
    }

    fn serialize_public_key(&self, public: &[u8]) -> String {
        hex::encode(public)
    }

    fn save_keys(&self, pair: &KeyPair, dir: &Path, label: &str) -> Result<(), CryptoError> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(format!("{}.pub", label)), hex::encode(&pair.public))?;
        fs::write(dir.join(format!("{}.key", label)), hex::encode(&pair.private))?;
        Ok(())
    }

    fn load_private_key(&self, dir: &Path, label: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = fs::read_to_string(dir.join(format!("{}.key", label)))?;
        hex::decode(raw.trim())
            .map_err(|_| CryptoError::MalformedKey("private key file is not hex".into()))
    }

    fn load_public_key(&self, dir: &Path, label: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = fs::read_to_string(dir.join(format!("{}.pub", label)))?;
        hex::decode(raw.trim())
            .map_err(|_| CryptoError::MalformedKey("public key file is not hex".into()))
    }

    fn sign(&self, private: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let secret = Self::secret_from_bytes(private)?;
        let public = PublicKey::from(&secret);
        let keypair = Keypair { secret, public };
        Ok(keypair.sign(message).to_bytes().to_vec())
    }

    fn verify(&self, public: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let public = match PublicKey::from_bytes(public) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = match Signature::try_from(signature) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        public.verify(message, &signature).is_ok()
    }

    fn symmetric_encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let aead = Self::aead_key(key)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        aead.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    fn symmetric_decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let aead = Self::aead_key(key)?;
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let mut in_out = body.to_vec();
        let plaintext = aead
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        Ok(plaintext.to_vec())
    }

    fn asymmetric_encrypt(
        &self,
        recipient_public: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let recipient_point = Self::exchange_point(recipient_public)?;

        let mut ephemeral_secret = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut ephemeral_secret);
        let ephemeral_public = x25519_dalek::x25519(ephemeral_secret, x25519_dalek::X25519_BASEPOINT_BYTES);

        let shared = x25519_dalek::x25519(ephemeral_secret, recipient_point);
        let key = Self::kdf(&shared)?;

        let mut out = ephemeral_public.to_vec();
        out.extend_from_slice(&self.symmetric_encrypt(&key, plaintext)?);
        Ok(out)
    }

    fn asymmetric_decrypt(
        &self,
        private: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < KEY_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (ephemeral_public, body) = ciphertext.split_at(KEY_LEN);
        let scalar = Self::exchange_scalar(private)?;
        let mut point = [0u8; KEY_LEN];
        point.copy_from_slice(ephemeral_public);

        let shared = x25519_dalek::x25519(scalar, point);
        let key = Self::kdf(&shared)?;
        self.symmetric_decrypt(&key, body)
    }

    fn derive_symmetric_key(
        &self,
        private: &[u8],
        peer_public: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let scalar = Self::exchange_scalar(private)?;
        let point = Self::exchange_point(peer_public)?;
        let shared = x25519_dalek::x25519(scalar, point);
        Self::kdf(&shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> Ed25519Handler {
        Ed25519Handler::new()
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let h = handler();
        let pair = h.generate_keys().unwrap();
        let sig = h.sign(&pair.private, b"payload").unwrap();
        assert!(h.verify(&pair.public, b"payload", &sig));
        assert!(!h.verify(&pair.public, b"tampered", &sig));
    }

    #[test]
    fn test_verify_rejects_garbage_inputs() {
        let h = handler();
        assert!(!h.verify(b"short", b"m", b"s"));
        let pair = h.generate_keys().unwrap();
        assert!(!h.verify(&pair.public, b"m", &[0u8; 64]));
    }

    #[test]
    fn test_symmetric_round_trip() {
        let h = handler();
        let key = [7u8; 32];
        let ct = h.symmetric_encrypt(&key, b"sector slice").unwrap();
        assert_eq!(h.symmetric_decrypt(&key, &ct).unwrap(), b"sector slice");
        assert!(h.symmetric_decrypt(&[8u8; 32], &ct).is_err());
    }

    #[test]
    fn test_asymmetric_round_trip() {
        let h = handler();
        let pair = h.generate_keys().unwrap();
        let ct = h.asymmetric_encrypt(&pair.public, b"direct message").unwrap();
        assert_eq!(
            h.asymmetric_decrypt(&pair.private, &ct).unwrap(),
            b"direct message"
        );
    }

    #[test]
    fn test_derived_keys_agree() {
        let h = handler();
        let a = h.generate_keys().unwrap();
        let b = h.generate_keys().unwrap();
        let k_ab = h.derive_symmetric_key(&a.private, &b.public).unwrap();
        let k_ba = h.derive_symmetric_key(&b.private, &a.public).unwrap();
        assert_eq!(k_ab, k_ba);
    }

    #[test]
    fn test_keys_survive_disk_round_trip() {
        let h = handler();
        let dir = tempfile::tempdir().unwrap();
        let pair = h.generate_keys().unwrap();
        h.save_keys(&pair, dir.path(), "node").unwrap();
        assert_eq!(h.load_private_key(dir.path(), "node").unwrap(), pair.private);
        assert_eq!(h.load_public_key(dir.path(), "node").unwrap(), pair.public);
    }
}
