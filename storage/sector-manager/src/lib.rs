// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Tracks per-sector state changes on a partner node between validator
//! confirmations: which files exist, every mutation applied to them, and the
//! reconstruction of sector state at any timestamp a challenge may name.
//!
//! Once a validator confirms a new root, mutations up to that point can be
//! dropped with [`SectorManager::commit_checkpoint`]; everything later is
//! retained for future challenges.

use modulr_crypto::HashValue;
use modulr_logger::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// What a mutation does to its affected files.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    Write,
    Update,
    Delete,
}

/// One confirmed job applied to a sector.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub job_id: String,
    /// Unix milliseconds; the log is monotone in this field.
    pub timestamp: u64,
    pub user: String,
    pub action: MutationAction,
    pub affected: Vec<String>,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum SectorError {
    #[error("mutation {job_id} is missing required field {field}")]
    MissingField {
        job_id: String,
        field: &'static str,
    },
    #[error("mutation {job_id} at {timestamp} arrived behind the log head {head}")]
    OutOfOrder {
        job_id: String,
        timestamp: u64,
        head: u64,
    },
}

/// Snapshot of a sector's file map at some point in time.
pub type SectorState = BTreeMap<String, String>;

/// Authenticated, time-queryable view of one sector. Single writer per
/// sector; challenge readers work on snapshots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectorManager {
    pub sector_id: String,
    pub version: u32,
    files: SectorState,
    mutations: Vec<Mutation>,
    size_limit: u64,
    last_confirmed_root: Option<HashValue>,
    last_confirmed_time: Option<u64>,
}

impl SectorManager {
    pub fn new(sector_id: impl Into<String>, size_limit: u64) -> Self {
        Self {
            sector_id: sector_id.into(),
            version: 1,
            files: BTreeMap::new(),
            mutations: Vec::new(),
            size_limit,
            last_confirmed_root: None,
            last_confirmed_time: None,
        }
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    pub fn last_confirmed_root(&self) -> Option<HashValue> {
        self.last_confirmed_root
    }

    pub fn last_confirmed_time(&self) -> Option<u64> {
        self.last_confirmed_time
    }

    pub fn files(&self) -> &SectorState {
        &self.files
    }

    pub fn mutation_log_len(&self) -> usize {
        self.mutations.len()
    }

    /// Applies a write/update/delete to the live file map and appends it to
    /// the mutation log. Mutations must arrive in timestamp order.
    pub fn apply_mutation(&mut self, mutation: Mutation) -> Result<(), SectorError> {
        if mutation.job_id.is_empty() {
            return Err(SectorError::MissingField {
                job_id: mutation.job_id,
                field: "job_id",
            });
        }
        if mutation.user.is_empty() {
            return Err(SectorError::MissingField {
                job_id: mutation.job_id,
                field: "user",
            });
        }
        if mutation.affected.is_empty() {
            return Err(SectorError::MissingField {
                job_id: mutation.job_id,
                field: "affected",
            });
        }
        if let Some(head) = self.mutations.last() {
            if mutation.timestamp < head.timestamp {
                return Err(SectorError::OutOfOrder {
                    job_id: mutation.job_id,
                    timestamp: mutation.timestamp,
                    head: head.timestamp,
                });
            }
        }

        Self::apply_to_state(&mut self.files, &mutation);
        self.mutations.push(mutation);
        Ok(())
    }

    /// Reconstructs the file map as of `timestamp` by replaying the log from
    /// the last confirmed checkpoint. O(|log|).
    pub fn get_state_at(&self, timestamp: u64) -> SectorState {
        let mut state = SectorState::new();
        for mutation in &self.mutations {
            if mutation.timestamp > timestamp {
                break;
            }
            Self::apply_to_state(&mut state, mutation);
        }
        state
    }

    /// Reference root: sha256 over the lexicographic concatenation of
    /// `"{file_id}:{content_ref}"` pairs, no separator. Checkpoints on chain
    /// commit to exactly this form.
    pub fn calculate_merkle_root(state: &SectorState) -> HashValue {
        HashValue::sha256_of(Self::flat_encoding(state).as_bytes())
    }

    /// The canonical byte string challenges slice into.
    pub fn flat_encoding(state: &SectorState) -> String {
        state
            .iter()
            .map(|(file_id, content_ref)| format!("{}:{}", file_id, content_ref))
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn current_root(&self) -> HashValue {
        Self::calculate_merkle_root(&self.files)
    }

    /// Records `(root, t)` as confirmed and drops mutations with
    /// `timestamp <= t`. Later mutations stay for future challenges.
    pub fn commit_checkpoint(&mut self, root: HashValue, confirmed_time: u64) {
        let before = self.mutations.len();
        self.mutations
            .retain(|mutation| mutation.timestamp > confirmed_time);
        self.last_confirmed_root = Some(root);
        self.last_confirmed_time = Some(confirmed_time);
        debug!(
            sector_id = %self.sector_id,
            pruned = (before - self.mutations.len()) as u64,
            retained = self.mutations.len() as u64,
            "Committed sector checkpoint"
        );
    }

    fn apply_to_state(state: &mut SectorState, mutation: &Mutation) {
        for file_id in &mutation.affected {
            match mutation.action {
                MutationAction::Write | MutationAction::Update => {
                    state.insert(
                        file_id.clone(),
                        format!("data::{}::{}", mutation.timestamp, file_id),
                    );
                }
                MutationAction::Delete => {
                    state.remove(file_id);
                }
            }
        }
    }
}
