// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Routes every decoded frame by packet type. Codec and protocol failures
//! end here as dropped packets; only consensus messages travel further, via
//! the bounded inbox the workers drain.

use crate::{messages::ConsensusMsg, node::NodeContext, read_api};
use modulr_infallible::unix_secs;
use modulr_logger::prelude::*;
use modulr_network::{
    PacketHeader, PacketType, PayloadReader, UserType, WirePacket, MAX_DM_PAYLOAD,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;

/// Cool-down applied to a peer that sent SHUT_UP, milliseconds.
const THROTTLE_WINDOW_MS: u64 = 30_000;

fn reply(packet_type: PacketType, payload: Vec<u8>) -> WirePacket {
    let header = PacketHeader::new(
        crate::messages::WIRE_VERSION,
        unix_secs(),
        packet_type as u16,
        UserType::Validator,
    );
    WirePacket::new(header, payload)
}

/// Handles one inbound packet, optionally producing a direct reply.
pub async fn dispatch(
    ctx: &Arc<NodeContext>,
    inbox: &mpsc::Sender<ConsensusMsg>,
    peer: SocketAddr,
    packet: WirePacket,
) -> Option<WirePacket> {
    let packet_type = match PacketType::from_u16(packet.header.packet_type) {
        Some(packet_type) => packet_type,
        None => {
            debug!(
                peer = %peer,
                packet_type = packet.header.packet_type,
                "Dropping packet of unknown type"
            );
            return None;
        }
    };

    match packet_type {
        PacketType::Latency => {
            // Echo the sender's timestamp so it can compute the round trip.
            Some(reply(
                PacketType::Timestamp,
                packet.header.timestamp.to_be_bytes().to_vec(),
            ))
        }
        PacketType::Heartbeat => {
            ctx.touch_peer(peer);
            packet
                .header
                .ack_requested
                .then(|| reply(PacketType::Acknowledge, Vec::new()))
        }
        PacketType::ShutUp => {
            ctx.throttle_peer(peer, THROTTLE_WINDOW_MS);
            None
        }
        PacketType::Dm => {
            if packet.payload.len() > MAX_DM_PAYLOAD + 2 {
                debug!(peer = %peer, "Dropping oversized DM");
                return None;
            }
            info!(peer = %peer, bytes = packet.payload.len() as u64, "DM received");
            None
        }
        PacketType::RequestScore => {
            let user = PayloadReader::new(&packet.payload).read_str8().ok()?;
            let score = ctx
                .reliability
                .lock()
                .profile(&user)
                .map(|p| p.admission_score())
                .unwrap_or(10);
            Some(reply(PacketType::Acknowledge, score.to_be_bytes().to_vec()))
        }
        PacketType::SyncCoChain => {
            // Either a consensus payload or a read query.
            if let Ok(msg) = ConsensusMsg::from_packet(&packet) {
                forward(inbox, peer, msg).await;
                return None;
            }
            let request: read_api::ReadRequest = serde_json::from_slice(&packet.payload).ok()?;
            let response = read_api::serve(&ctx.chaindata, request);
            Some(reply(
                PacketType::SyncCoChain,
                serde_json::to_vec(&response).ok()?,
            ))
        }
        PacketType::ValidatorVote => {
            match ConsensusMsg::from_packet(&packet) {
                Ok(msg) => forward(inbox, peer, msg).await,
                Err(e) => debug!(peer = %peer, error = %e, "Dropping malformed vote"),
            }
            None
        }
        PacketType::JobFile => {
            // A job file is admitted iff every mandatory field of the
            // co-chain schema is present and non-null.
            let job: serde_json::Value = serde_json::from_slice(&packet.payload).ok()?;
            let valid = ctx
                .run_rules
                .as_ref()
                .map(|rules| rules.validate_job_file(&job, "base_job_file"))
                .unwrap_or(false);
            if valid {
                Some(reply(PacketType::Acknowledge, Vec::new()))
            } else {
                debug!(peer = %peer, "Rejecting job file with missing mandatory fields");
                Some(reply(PacketType::Deny, Vec::new()))
            }
        }
        other => {
            debug!(peer = %peer, packet_type = ?other, "Packet type without a handler yet");
            None
        }
    }
}

async fn forward(inbox: &mpsc::Sender<ConsensusMsg>, peer: SocketAddr, msg: ConsensusMsg) {
    // A full inbox suspends this connection task, which in turn delays the
    // accept loop: the sender observes TCP-level flow control.
    if inbox.send(msg).await.is_err() {
        warn!(peer = %peer, "Consensus inbox closed, dropping message");
    }
}
