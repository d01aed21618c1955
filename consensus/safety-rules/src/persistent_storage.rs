// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use modulr_crypto::HashValue;
use modulr_infallible::Mutex;
use modulr_kvdb::{define_schema, KeyCodec, ValueCodec, DB};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};

/// Column family the vote latch lives in.
pub const VOTING_STATS_CF: &str = "FINALIZATION_VOTING_STATS";

const VOTE_KEY_PREFIX: &str = "vote#";
const LAST_VOTED_TIME_KEY: &str = "meta#last_voted_time";

/// What was signed for one `(epoch_full_id, index)`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub block_hash: HashValue,
    pub block_time: u64,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct VoteKey(pub String);

define_schema!(VoteLatchSchema, VoteKey, VoteRecord, "FINALIZATION_VOTING_STATS");

impl KeyCodec<VoteLatchSchema> for VoteKey {
    fn encode_key(&self) -> Result<Vec<u8>> {
        Ok(format!("{}{}", VOTE_KEY_PREFIX, self.0).into_bytes())
    }

    fn decode_key(data: &[u8]) -> Result<Self> {
        let raw = std::str::from_utf8(data)?;
        Ok(VoteKey(
            raw.strip_prefix(VOTE_KEY_PREFIX).unwrap_or(raw).to_string(),
        ))
    }
}

impl ValueCodec<VoteLatchSchema> for VoteRecord {
    fn encode_value(&self) -> Result<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    fn decode_value(data: &[u8]) -> Result<Self> {
        Ok(bcs::from_bytes(data)?)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct MetaKey;

define_schema!(SafetyMetaSchema, MetaKey, u64, "FINALIZATION_VOTING_STATS");

impl KeyCodec<SafetyMetaSchema> for MetaKey {
    fn encode_key(&self) -> Result<Vec<u8>> {
        Ok(LAST_VOTED_TIME_KEY.as_bytes().to_vec())
    }

    fn decode_key(_data: &[u8]) -> Result<Self> {
        Ok(MetaKey)
    }
}

impl ValueCodec<SafetyMetaSchema> for u64 {
    fn encode_value(&self) -> Result<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    fn decode_value(data: &[u8]) -> Result<Self> {
        Ok(bcs::from_bytes(data)?)
    }
}

#[derive(Debug, Default)]
struct InMemoryInner {
    votes: HashMap<String, VoteRecord>,
    last_voted_time: u64,
}

#[derive(Debug)]
enum Storage {
    OnDisk(Arc<DB>),
    InMemory(Mutex<InMemoryInner>),
}

/// Where the latch lives. Production uses the node's kv store; tests run on
/// the in-memory variant.
#[derive(Debug)]
pub struct PersistentSafetyStorage {
    inner: Storage,
}

impl PersistentSafetyStorage {
    pub fn on_disk(db: Arc<DB>) -> Self {
        Self {
            inner: Storage::OnDisk(db),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Storage::InMemory(Mutex::new(InMemoryInner::default())),
        }
    }

    pub fn get_vote(&self, block_id: &str) -> Result<Option<VoteRecord>> {
        match &self.inner {
            Storage::OnDisk(db) => db.get::<VoteLatchSchema>(&VoteKey(block_id.to_string())),
            Storage::InMemory(inner) => Ok(inner.lock().votes.get(block_id).cloned()),
        }
    }

    /// Durably records the vote. Must complete before the signature is
    /// released.
    pub fn record_vote(&self, block_id: &str, record: VoteRecord) -> Result<()> {
        match &self.inner {
            Storage::OnDisk(db) => {
                db.put::<VoteLatchSchema>(&VoteKey(block_id.to_string()), &record)
            }
            Storage::InMemory(inner) => {
                inner.lock().votes.insert(block_id.to_string(), record);
                Ok(())
            }
        }
    }

    pub fn last_voted_time(&self) -> Result<u64> {
        match &self.inner {
            Storage::OnDisk(db) => Ok(db.get::<SafetyMetaSchema>(&MetaKey)?.unwrap_or(0)),
            Storage::InMemory(inner) => Ok(inner.lock().last_voted_time),
        }
    }

    pub fn set_last_voted_time(&self, time: u64) -> Result<()> {
        match &self.inner {
            Storage::OnDisk(db) => db.put::<SafetyMetaSchema>(&MetaKey, &time),
            Storage::InMemory(inner) => {
                inner.lock().last_voted_time = time;
                Ok(())
            }
        }
    }
}
