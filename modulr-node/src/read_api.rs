// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The read API other nodes and clients query over `SYNC_CO_CHAIN` frames:
//! blocks, finalization proofs, epoch closures and this node's assumption
//! about a leader's finalized tail.

use modulr_consensus::chain_store::ChainStore;
use modulr_consensus_types::proofs::{
    AggregatedEpochFinalizationProof, AggregatedFinalizationProof,
};
use modulr_crypto::HashValue;
use modulr_types::account::AccountId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum ReadRequest {
    GetBlock { block_id: String },
    GetAfp { block_id: String },
    GetAefp { epoch_id: i64 },
    GetFirstBlockAssumption { epoch_full_id: String, leader: AccountId },
}

/// The node's local belief about a leader's highest finalized block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FirstBlockAssumption {
    pub leader: AccountId,
    pub index: i64,
    pub hash: HashValue,
    pub afp: Option<AggregatedFinalizationProof>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReadResponse {
    Block(Option<modulr_consensus_types::block::Block>),
    Afp(Option<AggregatedFinalizationProof>),
    Aefp(Option<AggregatedEpochFinalizationProof>),
    FirstBlockAssumption(FirstBlockAssumption),
    Failed { reason: String },
}

pub fn serve(store: &ChainStore, request: ReadRequest) -> ReadResponse {
    let result = match request {
        ReadRequest::GetBlock { block_id } => store
            .get_block(&block_id)
            .map(ReadResponse::Block),
        ReadRequest::GetAfp { block_id } => store.get_afp(&block_id).map(ReadResponse::Afp),
        ReadRequest::GetAefp { epoch_id } => store.get_aefp(epoch_id).map(ReadResponse::Aefp),
        ReadRequest::GetFirstBlockAssumption {
            epoch_full_id,
            leader,
        } => store
            .get_pool_stat(&epoch_full_id, &leader)
            .map(|stat| {
                ReadResponse::FirstBlockAssumption(FirstBlockAssumption {
                    leader,
                    index: stat.index,
                    hash: stat.hash,
                    afp: stat.afp,
                })
            }),
    };
    result.unwrap_or_else(|e| ReadResponse::Failed {
        reason: format!("{:#}", e),
    })
}
