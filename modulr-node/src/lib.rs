// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! The node orchestrator: owns process-wide state, spawns the six worker
//! tasks and the TCP listener, and routes decoded packets to handlers.
//! There are no hidden statics; everything a task touches hangs off the
//! [`NodeContext`] it was spawned with, and `init` / `shutdown` are the
//! only lifecycle entry points.

pub mod accounts;
pub mod dispatcher;
pub mod messages;
pub mod node;
pub mod read_api;
pub mod state;
pub mod workers;

pub use node::{Node, NodeContext, NodeError};
pub use state::{NodeState, StateEvent};
