// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Durable chain state over the four KV namespaces. The store is the single
//! writer for `BLOCKS` and `EPOCH_DATA`; every commit goes through one
//! atomic batch, so a failed write leaves the block un-finalized from this
//! node's perspective and it is re-adopted when the AFP is seen again.

use crate::{
    counters,
    schema::{
        AefpKey, AefpSchema, AfpKey, AfpSchema, AlrpKey, AlrpSchema, ApprovementThreadKey,
        ApprovementThreadSchema, BlockKey, BlockSchema, GenerationThreadKey,
        GenerationThreadSchema, PoolStatKey, PoolStatSchema, APPROVEMENT_THREAD_CF, BLOCKS_CF,
        EPOCH_DATA_CF,
    },
};
use anyhow::{ensure, Context, Result};
use modulr_consensus_types::{
    block::Block,
    common::Author,
    proofs::{
        AggregatedEpochFinalizationProof, AggregatedFinalizationProof,
        AggregatedLeaderRotationProof, PoolVotingStat,
    },
};
use modulr_crypto::CryptoHandler;
use modulr_kvdb::{SchemaBatch, DB};
use modulr_logger::prelude::*;
use modulr_safety_rules::VOTING_STATS_CF;
use modulr_types::{
    epoch::EpochHandler,
    thread_metadata::{ApprovementThreadMetadata, GenerationThreadMetadata},
};
use std::{path::Path, sync::Arc};

/// Name the embedded database directory is created under.
const CHAIN_DB_NAME: &str = "chaindata";

pub struct ChainStore {
    db: Arc<DB>,
    network_id: String,
}

impl ChainStore {
    /// Opens the chain database with all four namespaces.
    pub fn open(chaindata_path: &Path, network_id: impl Into<String>) -> Result<Self> {
        let db = DB::open(
            &chaindata_path.join(CHAIN_DB_NAME),
            CHAIN_DB_NAME,
            vec![
                BLOCKS_CF,
                EPOCH_DATA_CF,
                APPROVEMENT_THREAD_CF,
                VOTING_STATS_CF,
            ],
        )?;
        Ok(Self {
            db: Arc::new(db),
            network_id: network_id.into(),
        })
    }

    /// Shared handle for the safety-rules latch, which lives in the same
    /// database under its own namespace.
    pub fn db(&self) -> Arc<DB> {
        self.db.clone()
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    /// Boot-time state recovery per the genesis rule: if no approvement
    /// thread was ever persisted (or its version is the `-1` sentinel), seed
    /// the generation thread with the zero-hash epoch id and stamp the
    /// running core version.
    pub fn prepare(
        &self,
        core_major_version: i64,
        genesis_epoch: Option<EpochHandler>,
        genesis_parameters: Option<modulr_types::network_parameters::NetworkParameters>,
    ) -> Result<(GenerationThreadMetadata, ApprovementThreadMetadata)> {
        let generation = self
            .db
            .get::<GenerationThreadSchema>(&GenerationThreadKey("GT".to_string()))?;
        let approvement = self
            .db
            .get::<ApprovementThreadSchema>(&ApprovementThreadKey("AT".to_string()))?;

        let mut approvement = approvement.unwrap_or_else(ApprovementThreadMetadata::pre_genesis);
        let generation = match generation {
            Some(generation) if !approvement.is_uninitialized() => {
                info!(
                    epoch = approvement.epoch.id,
                    next_index = generation.next_index,
                    "Recovered chain state"
                );
                return Ok((generation, approvement));
            }
            other => other.unwrap_or_else(|| GenerationThreadMetadata::genesis(&self.network_id)),
        };

        // Genesis path.
        approvement.core_major_version = core_major_version;
        if let Some(epoch) = genesis_epoch {
            approvement.epoch = epoch;
        }
        if let Some(parameters) = genesis_parameters {
            approvement.network_parameters = parameters;
        }

        let batch = SchemaBatch::new();
        batch.put::<GenerationThreadSchema>(
            &GenerationThreadKey("GT".to_string()),
            &generation,
        )?;
        batch.put::<ApprovementThreadSchema>(
            &ApprovementThreadKey("AT".to_string()),
            &approvement,
        )?;
        self.db.write_schemas(batch)?;
        info!(
            epoch = approvement.epoch.id,
            core_major_version = core_major_version,
            "Seeded genesis state"
        );
        Ok((generation, approvement))
    }

    pub fn save_generation_thread(&self, generation: &GenerationThreadMetadata) -> Result<()> {
        self.db
            .put::<GenerationThreadSchema>(&GenerationThreadKey("GT".to_string()), generation)
    }

    pub fn save_approvement_thread(&self, approvement: &ApprovementThreadMetadata) -> Result<()> {
        self.db
            .put::<ApprovementThreadSchema>(&ApprovementThreadKey("AT".to_string()), approvement)
    }

    pub fn get_block(&self, block_id: &str) -> Result<Option<Block>> {
        self.db.get::<BlockSchema>(&BlockKey(block_id.to_string()))
    }

    pub fn get_afp(&self, block_id: &str) -> Result<Option<AggregatedFinalizationProof>> {
        self.db.get::<AfpSchema>(&AfpKey(block_id.to_string()))
    }

    pub fn get_aefp(&self, epoch_id: i64) -> Result<Option<AggregatedEpochFinalizationProof>> {
        self.db.get::<AefpSchema>(&AefpKey(epoch_id.to_string()))
    }

    pub fn save_aefp(&self, epoch_id: i64, aefp: &AggregatedEpochFinalizationProof) -> Result<()> {
        self.db.put::<AefpSchema>(&AefpKey(epoch_id.to_string()), aefp)
    }

    pub fn get_pool_stat(&self, epoch_full_id: &str, leader: &Author) -> Result<PoolVotingStat> {
        Ok(self
            .db
            .get::<PoolStatSchema>(&PoolStatKey(format!("{}#{}", epoch_full_id, leader)))?
            .unwrap_or_default())
    }

    pub fn get_alrp(
        &self,
        epoch_full_id: &str,
        leader: &Author,
    ) -> Result<Option<AggregatedLeaderRotationProof>> {
        self.db
            .get::<AlrpSchema>(&AlrpKey(format!("{}#{}", epoch_full_id, leader)))
    }

    pub fn save_alrp(
        &self,
        epoch_full_id: &str,
        leader: &Author,
        alrp: &AggregatedLeaderRotationProof,
    ) -> Result<()> {
        self.db
            .put::<AlrpSchema>(&AlrpKey(format!("{}#{}", epoch_full_id, leader)), alrp)
    }

    /// Commits a block on its first valid AFP. The block, the proof and the
    /// leader's voting stat land in one batch. Re-commits of the same block
    /// are idempotent; a conflicting AFP for an already-committed position
    /// is refused.
    pub fn commit_block(
        &self,
        block: &Block,
        afp: &AggregatedFinalizationProof,
        quorum: &[Author],
        majority: usize,
        handler: &dyn CryptoHandler,
    ) -> Result<()> {
        let block_id = block.block_id();
        let block_hash = block.get_hash(&self.network_id)?;
        ensure!(
            afp.block_id == block_id && afp.block_hash == block_hash,
            "AFP does not match candidate block {}",
            block_id,
        );
        afp.verify(quorum, majority, handler)
            .context("rejecting commit with invalid AFP")?;

        if let Some(existing) = self.get_afp(&block_id)? {
            ensure!(
                existing.block_hash == afp.block_hash,
                "refusing to overwrite committed block {} with a different hash",
                block_id,
            );
            return Ok(());
        }

        let mut stat = self.get_pool_stat(&block.epoch, &block.creator)?;
        if (block.index as i64) > stat.index {
            stat.index = block.index as i64;
            stat.hash = block_hash;
            stat.afp = Some(afp.clone());
        }

        let batch = SchemaBatch::new();
        batch.put::<BlockSchema>(&BlockKey(block_id.clone()), block)?;
        batch.put::<AfpSchema>(&AfpKey(block_id.clone()), afp)?;
        batch.put::<PoolStatSchema>(
            &PoolStatKey(format!("{}#{}", block.epoch, block.creator)),
            &stat,
        )?;
        self.db.write_schemas(batch)?;

        counters::COMMITTED_BLOCKS.inc();
        info!(
            block_id = %block_id,
            block_hash = %block_hash,
            txs = block.transactions.len() as u64,
            "Committed block"
        );
        Ok(())
    }
}
