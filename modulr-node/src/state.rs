// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use modulr_logger::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a quorum member. `Error` and `Offline` are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Dialing seed peers, counting live ones.
    Discovery,
    /// Reliability too low to serve; forwarding clients to healthier peers.
    Redirect,
    /// Catching the chain up from peers.
    Sync,
    /// Full participant.
    Active,
    /// Fatal invariant violation inside our own persisted state.
    Error,
    /// Clean shutdown.
    Offline,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateEvent {
    /// Live peer count reached the quorum majority.
    PeersReachedMajority,
    /// Own reliability fell below the admission floor.
    LowReliability,
    ChainCaughtUp,
    /// Equivocation or corruption detected in our own persisted state.
    FatalInvariant,
    GracefulShutdown,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeState::Error | NodeState::Offline)
    }

    /// Applies one event; illegal transitions leave the state unchanged.
    pub fn advance(self, event: StateEvent) -> NodeState {
        let next = match (self, event) {
            (_, StateEvent::FatalInvariant) => NodeState::Error,
            (NodeState::Error, _) => NodeState::Error,
            (NodeState::Offline, _) => NodeState::Offline,
            (_, StateEvent::GracefulShutdown) => NodeState::Offline,
            (NodeState::Discovery, StateEvent::PeersReachedMajority) => NodeState::Sync,
            (NodeState::Discovery, StateEvent::LowReliability) => NodeState::Redirect,
            (NodeState::Redirect, StateEvent::PeersReachedMajority) => NodeState::Redirect,
            (NodeState::Sync, StateEvent::ChainCaughtUp) => NodeState::Active,
            (state, _) => state,
        };
        if next != self {
            info!(from = %self, to = %next, "Node state transition");
        }
        next
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Discovery => "DISCOVERY",
            NodeState::Redirect => "REDIRECT",
            NodeState::Sync => "SYNC",
            NodeState::Active => "ACTIVE",
            NodeState::Error => "ERROR",
            NodeState::Offline => "OFFLINE",
        };
        write!(f, "{}", name)
    }
}
