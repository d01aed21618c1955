// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! KV schemas for the consensus namespaces. Block records, AFPs, AEFPs and
//! the generation-thread handler live in `BLOCKS`; per-leader voting stats
//! and collected rotation proofs in `EPOCH_DATA`; the approvement-thread
//! handler in `APPROVEMENT_THREAD_METADATA`.
//!
//! Values are stored as canonical JSON: records embed dynamic payload maps,
//! which a positional format cannot round-trip.

use anyhow::Result;
use modulr_consensus_types::{
    block::Block,
    proofs::{
        AggregatedEpochFinalizationProof, AggregatedFinalizationProof,
        AggregatedLeaderRotationProof, PoolVotingStat,
    },
};
use modulr_kvdb::{define_schema, KeyCodec, ValueCodec};
use modulr_types::thread_metadata::{ApprovementThreadMetadata, GenerationThreadMetadata};
use serde::{de::DeserializeOwned, Serialize};

pub const BLOCKS_CF: &str = "BLOCKS";
pub const EPOCH_DATA_CF: &str = "EPOCH_DATA";
pub const APPROVEMENT_THREAD_CF: &str = "APPROVEMENT_THREAD_METADATA";

pub(crate) const GENERATION_THREAD_KEY: &str = "GT";
pub(crate) const APPROVEMENT_THREAD_KEY: &str = "AT";
pub(crate) const AFP_KEY_PREFIX: &str = "afp#";
pub(crate) const AEFP_KEY_PREFIX: &str = "aefp#";
pub(crate) const POOL_STAT_KEY_PREFIX: &str = "stat#";
pub(crate) const ALRP_KEY_PREFIX: &str = "alrp#";

fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode_json<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(data)?)
}

/// A plain string key, optionally carrying a fixed prefix.
macro_rules! string_key {
    ($name:ident, $prefix:expr) => {
        #[derive(Debug, Eq, PartialEq)]
        pub(crate) struct $name(pub String);

        impl $name {
            #[allow(dead_code)]
            pub fn prefix() -> &'static str {
                $prefix
            }
        }
    };
}

string_key!(BlockKey, "");
string_key!(AfpKey, AFP_KEY_PREFIX);
string_key!(AefpKey, AEFP_KEY_PREFIX);
string_key!(GenerationThreadKey, GENERATION_THREAD_KEY);
string_key!(ApprovementThreadKey, APPROVEMENT_THREAD_KEY);
string_key!(PoolStatKey, POOL_STAT_KEY_PREFIX);
string_key!(AlrpKey, ALRP_KEY_PREFIX);

macro_rules! impl_string_key_codec {
    ($schema:ident, $key:ident, $prefix:expr) => {
        impl KeyCodec<$schema> for $key {
            fn encode_key(&self) -> Result<Vec<u8>> {
                Ok(format!("{}{}", $prefix, self.0).into_bytes())
            }

            fn decode_key(data: &[u8]) -> Result<Self> {
                let raw = std::str::from_utf8(data)?;
                Ok($key(raw.strip_prefix($prefix).unwrap_or(raw).to_string()))
            }
        }
    };
}

macro_rules! impl_json_value_codec {
    ($schema:ident, $value:ty) => {
        impl ValueCodec<$schema> for $value {
            fn encode_value(&self) -> Result<Vec<u8>> {
                encode_json(self)
            }

            fn decode_value(data: &[u8]) -> Result<Self> {
                decode_json(data)
            }
        }
    };
}

// BLOCKS: block records keyed by `epoch_full_id#index`.
define_schema!(BlockSchema, BlockKey, Block, "BLOCKS");
impl_string_key_codec!(BlockSchema, BlockKey, "");
impl_json_value_codec!(BlockSchema, Block);

// BLOCKS: AFPs keyed by `afp#` + block id.
define_schema!(AfpSchema, AfpKey, AggregatedFinalizationProof, "BLOCKS");
impl_string_key_codec!(AfpSchema, AfpKey, AFP_KEY_PREFIX);
impl_json_value_codec!(AfpSchema, AggregatedFinalizationProof);

// BLOCKS: AEFPs keyed by `aefp#` + epoch id.
define_schema!(AefpSchema, AefpKey, AggregatedEpochFinalizationProof, "BLOCKS");
impl_string_key_codec!(AefpSchema, AefpKey, AEFP_KEY_PREFIX);
impl_json_value_codec!(AefpSchema, AggregatedEpochFinalizationProof);

// BLOCKS: the generation-thread handler under the fixed key `GT`.
define_schema!(GenerationThreadSchema, GenerationThreadKey, GenerationThreadMetadata, "BLOCKS");

impl KeyCodec<GenerationThreadSchema> for GenerationThreadKey {
    fn encode_key(&self) -> Result<Vec<u8>> {
        Ok(GENERATION_THREAD_KEY.as_bytes().to_vec())
    }

    fn decode_key(_data: &[u8]) -> Result<Self> {
        Ok(GenerationThreadKey(GENERATION_THREAD_KEY.to_string()))
    }
}
impl_json_value_codec!(GenerationThreadSchema, GenerationThreadMetadata);

// APPROVEMENT_THREAD_METADATA: the handler under the fixed key `AT`.
define_schema!(
    ApprovementThreadSchema,
    ApprovementThreadKey,
    ApprovementThreadMetadata,
    "APPROVEMENT_THREAD_METADATA"
);

impl KeyCodec<ApprovementThreadSchema> for ApprovementThreadKey {
    fn encode_key(&self) -> Result<Vec<u8>> {
        Ok(APPROVEMENT_THREAD_KEY.as_bytes().to_vec())
    }

    fn decode_key(_data: &[u8]) -> Result<Self> {
        Ok(ApprovementThreadKey(APPROVEMENT_THREAD_KEY.to_string()))
    }
}
impl_json_value_codec!(ApprovementThreadSchema, ApprovementThreadMetadata);

// EPOCH_DATA: per-leader voting stats, `stat#{epoch_full_id}#{leader}`.
define_schema!(PoolStatSchema, PoolStatKey, PoolVotingStat, "EPOCH_DATA");
impl_string_key_codec!(PoolStatSchema, PoolStatKey, POOL_STAT_KEY_PREFIX);
impl_json_value_codec!(PoolStatSchema, PoolVotingStat);

// EPOCH_DATA: assembled ALRPs, `alrp#{epoch_full_id}#{leader}`.
define_schema!(AlrpSchema, AlrpKey, AggregatedLeaderRotationProof, "EPOCH_DATA");
impl_string_key_codec!(AlrpSchema, AlrpKey, ALRP_KEY_PREFIX);
impl_json_value_codec!(AlrpSchema, AggregatedLeaderRotationProof);
