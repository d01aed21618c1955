// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// The packet registry. Values are wire-normative: renumbering any entry is
/// a protocol break.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[repr(u16)]
pub enum PacketType {
    // Control plane.
    /// Ask a noisy peer to throttle.
    ShutUp = 1,
    LogOff = 2,
    Latency = 3,
    /// Request a user's perception score.
    RequestScore = 4,
    /// Keep-alive while long work is in flight.
    Heartbeat = 5,
    Report = 6,
    Dm = 7,
    Freeze = 8,
    Authorize = 9,
    Deny = 10,
    Acknowledge = 11,
    Timestamp = 12,
    // Validator lifecycle.
    ValidatorRequest = 13,
    ValidatorConfirmation = 14,
    ValidatorState = 15,
    ValidatorListRequest = 16,
    ValidatorListResponse = 17,
    JobFile = 18,
    PayoutFile = 19,
    Convergence = 20,
    SyncCoChain = 21,
    ShareRules = 22,
    JobRequest = 23,
    ValidatorChangeState = 24,
    ValidatorVote = 25,
    ReturnAddress = 26,
    PerceptionUpdate = 27,
}

impl PacketType {
    /// Maps a raw header value back into the registry. `None` means the
    /// envelope is fine but this build does not know the type.
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1 => PacketType::ShutUp,
            2 => PacketType::LogOff,
            3 => PacketType::Latency,
            4 => PacketType::RequestScore,
            5 => PacketType::Heartbeat,
            6 => PacketType::Report,
            7 => PacketType::Dm,
            8 => PacketType::Freeze,
            9 => PacketType::Authorize,
            10 => PacketType::Deny,
            11 => PacketType::Acknowledge,
            12 => PacketType::Timestamp,
            13 => PacketType::ValidatorRequest,
            14 => PacketType::ValidatorConfirmation,
            15 => PacketType::ValidatorState,
            16 => PacketType::ValidatorListRequest,
            17 => PacketType::ValidatorListResponse,
            18 => PacketType::JobFile,
            19 => PacketType::PayoutFile,
            20 => PacketType::Convergence,
            21 => PacketType::SyncCoChain,
            22 => PacketType::ShareRules,
            23 => PacketType::JobRequest,
            24 => PacketType::ValidatorChangeState,
            25 => PacketType::ValidatorVote,
            26 => PacketType::ReturnAddress,
            27 => PacketType::PerceptionUpdate,
            _ => return None,
        })
    }
}
