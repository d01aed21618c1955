// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Consensus messages as they travel between validators, serialized as
//! canonical JSON inside wire packets. Votes ride `VALIDATOR_VOTE` frames;
//! blocks and aggregated proofs ride `SYNC_CO_CHAIN` frames.

use modulr_consensus_types::{
    block::Block,
    proofs::{AggregatedEpochFinalizationProof, AggregatedFinalizationProof},
    vote::{FinalizationVote, RotationVote},
};
use modulr_crypto::HashValue;
use modulr_network::{PacketHeader, PacketType, ProtocolVersion, UserType, WirePacket};
use modulr_types::account::AccountId;
use serde::{Deserialize, Serialize};

/// Protocol build date stamped into every outbound header.
pub const WIRE_VERSION: ProtocolVersion = ProtocolVersion {
    year: 2026,
    month: 7,
    day: 14,
    subversion: 0,
};

/// An epoch-finalization vote in wire form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpochVoteMsg {
    pub voter: AccountId,
    pub epoch_full_id: String,
    pub last_leader: u64,
    pub last_index: u64,
    pub last_hash: HashValue,
    pub hash_of_first_block_by_last_leader: HashValue,
    pub sig: String,
}

/// Everything one validator says to another above the control plane.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsensusMsg {
    CandidateBlock(Block),
    FinalizationVote(FinalizationVote),
    RotationVote(RotationVote),
    EpochVote(EpochVoteMsg),
    Afp(AggregatedFinalizationProof),
    Aefp {
        epoch_id: i64,
        proof: AggregatedEpochFinalizationProof,
    },
}

impl ConsensusMsg {
    fn packet_type(&self) -> PacketType {
        match self {
            ConsensusMsg::FinalizationVote(_)
            | ConsensusMsg::RotationVote(_)
            | ConsensusMsg::EpochVote(_) => PacketType::ValidatorVote,
            ConsensusMsg::CandidateBlock(_) | ConsensusMsg::Afp(_) | ConsensusMsg::Aefp { .. } => {
                PacketType::SyncCoChain
            }
        }
    }

    pub fn into_packet(self, now_secs: u64) -> serde_json::Result<WirePacket> {
        let header = PacketHeader::new(
            WIRE_VERSION,
            now_secs,
            self.packet_type() as u16,
            UserType::Validator,
        );
        Ok(WirePacket::new(header, serde_json::to_vec(&self)?))
    }

    pub fn from_packet(packet: &WirePacket) -> serde_json::Result<Self> {
        serde_json::from_slice(&packet.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modulr_consensus_types::vote::FinalizationVote;

    #[test]
    fn test_packet_round_trip() {
        let msg = ConsensusMsg::FinalizationVote(FinalizationVote {
            voter: AccountId::from(HashValue::sha256_of(b"v")),
            prev_block_hash: HashValue::zero(),
            block_id: "e#0#0".to_string(),
            block_hash: HashValue::sha256_of(b"b"),
            sig: "00".to_string(),
        });
        let packet = msg.clone().into_packet(7).unwrap();
        assert_eq!(packet.header.packet_type, PacketType::ValidatorVote as u16);
        let back = ConsensusMsg::from_packet(&packet).unwrap();
        assert!(matches!(back, ConsensusMsg::FinalizationVote(v) if v.block_id == "e#0#0"));
    }
}
