// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Named keypair storage for node and user identities. Each account is a
//! directory holding the hex keypair and a small metadata file.

use modulr_crypto::{CryptoHandler, KeyPair};
use modulr_infallible::unix_millis;
use modulr_types::account::AccountId;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::Arc};
use thiserror::Error;

const METADATA_FILE: &str = "metadata.json";
const KEY_LABEL: &str = "identity";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account {0} already exists")]
    AlreadyExists(String),
    #[error("account {0} not found")]
    NotFound(String),
    #[error("account {0} has corrupt metadata: {1}")]
    CorruptMetadata(String, String),
    #[error("io failure on account {0}: {1}")]
    Io(String, std::io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountMetadata {
    name: String,
    public_key: String,
    created_at_ms: u64,
}

pub struct AccountManager {
    root: PathBuf,
    handler: Arc<dyn CryptoHandler>,
}

impl AccountManager {
    pub fn new(root: PathBuf, handler: Arc<dyn CryptoHandler>) -> Self {
        Self { root, handler }
    }

    fn dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Creates a fresh account with a new keypair.
    pub fn create(&self, name: &str) -> Result<AccountId, AccountError> {
        let dir = self.dir(name);
        if dir.exists() {
            return Err(AccountError::AlreadyExists(name.to_string()));
        }
        let pair = self
            .handler
            .generate_keys()
            .map_err(|e| AccountError::CorruptMetadata(name.to_string(), e.to_string()))?;
        self.handler
            .save_keys(&pair, &dir, KEY_LABEL)
            .map_err(|e| AccountError::CorruptMetadata(name.to_string(), e.to_string()))?;

        let metadata = AccountMetadata {
            name: name.to_string(),
            public_key: self.handler.serialize_public_key(&pair.public),
            created_at_ms: unix_millis(),
        };
        let raw = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| AccountError::CorruptMetadata(name.to_string(), e.to_string()))?;
        fs::write(dir.join(METADATA_FILE), raw)
            .map_err(|e| AccountError::Io(name.to_string(), e))?;
        Ok(AccountId::from_public_key(&pair.public))
    }

    /// Loads an account, creating it on first use.
    pub fn load_or_create(&self, name: &str) -> Result<(KeyPair, AccountId), AccountError> {
        if !self.dir(name).exists() {
            self.create(name)?;
        }
        self.load(name)
    }

    pub fn load(&self, name: &str) -> Result<(KeyPair, AccountId), AccountError> {
        let dir = self.dir(name);
        if !dir.exists() {
            return Err(AccountError::NotFound(name.to_string()));
        }
        let private = self
            .handler
            .load_private_key(&dir, KEY_LABEL)
            .map_err(|e| AccountError::CorruptMetadata(name.to_string(), e.to_string()))?;
        let public = self
            .handler
            .load_public_key(&dir, KEY_LABEL)
            .map_err(|e| AccountError::CorruptMetadata(name.to_string(), e.to_string()))?;
        let id = AccountId::from_public_key(&public);
        Ok((KeyPair { public, private }, id))
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<(), AccountError> {
        let old_dir = self.dir(old);
        if !old_dir.exists() {
            return Err(AccountError::NotFound(old.to_string()));
        }
        let new_dir = self.dir(new);
        if new_dir.exists() {
            return Err(AccountError::AlreadyExists(new.to_string()));
        }
        fs::rename(&old_dir, &new_dir).map_err(|e| AccountError::Io(old.to_string(), e))?;

        // Keep the metadata name in step with the directory.
        let metadata_path = new_dir.join(METADATA_FILE);
        let raw = fs::read_to_string(&metadata_path)
            .map_err(|e| AccountError::Io(new.to_string(), e))?;
        let mut metadata: AccountMetadata = serde_json::from_str(&raw)
            .map_err(|e| AccountError::CorruptMetadata(new.to_string(), e.to_string()))?;
        metadata.name = new.to_string();
        let raw = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| AccountError::CorruptMetadata(new.to_string(), e.to_string()))?;
        fs::write(metadata_path, raw).map_err(|e| AccountError::Io(new.to_string(), e))?;
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), AccountError> {
        let dir = self.dir(name);
        if !dir.exists() {
            return Err(AccountError::NotFound(name.to_string()));
        }
        fs::remove_dir_all(dir).map_err(|e| AccountError::Io(name.to_string(), e))
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.path().is_dir())
                    .filter_map(|entry| entry.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
