// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use crate::{xp_requirement, MAX_LEVEL, MIN_LEVEL};
use modulr_types::reliability_signal::ReliabilitySignal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

/// One applied signal, as recorded in a profile's history ring.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub job_id: String,
    pub signal: ReliabilitySignal,
    pub reporter: Option<String>,
    pub old_xp: i64,
    pub new_xp: i64,
    pub old_level: u32,
    pub new_level: u32,
    /// True when the arithmetic hit the level-1 floor or level-100 ceiling;
    /// such applications are not reversible.
    pub clamped: bool,
}

impl SignalEvent {
    pub fn level_up(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// Trust state of a single user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReliabilityProfile {
    pub user: String,
    xp: i64,
    level: u32,
    history: VecDeque<SignalEvent>,
    seen_jobs: BTreeSet<String>,
}

impl ReliabilityProfile {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            xp: 0,
            level: MIN_LEVEL,
            history: VecDeque::new(),
            seen_jobs: BTreeSet::new(),
        }
    }

    pub fn xp(&self) -> i64 {
        self.xp
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn history(&self) -> impl Iterator<Item = &SignalEvent> {
        self.history.iter()
    }

    pub fn has_seen_job(&self, job_id: &str) -> bool {
        self.seen_jobs.contains(job_id)
    }

    /// Admission score: `level × 10` plus tenths of progress into the
    /// current level.
    pub fn admission_score(&self) -> i64 {
        let ratio = (self.xp * 10 / xp_requirement(self.level)).clamp(0, 9);
        i64::from(self.level) * 10 + ratio
    }

    /// Applies `signal` for `job_id` and records the event. The caller must
    /// have checked `has_seen_job` first.
    pub(crate) fn apply(
        &mut self,
        signal: ReliabilitySignal,
        job_id: &str,
        reporter: Option<String>,
        max_history: usize,
    ) -> SignalEvent {
        self.seen_jobs.insert(job_id.to_string());

        let old_xp = self.xp;
        let old_level = self.level;
        let (new_xp, new_level, clamped) = step(self.xp, self.level, signal.xp_delta());
        self.xp = new_xp;
        self.level = new_level;

        let event = SignalEvent {
            job_id: job_id.to_string(),
            signal,
            reporter,
            old_xp,
            new_xp,
            old_level,
            new_level,
            clamped,
        };
        self.history.push_back(event.clone());
        while self.history.len() > max_history {
            self.history.pop_front();
        }
        event
    }
}

/// The level arithmetic. Overflowing XP carries across as many levels as it
/// fills; negative XP borrows from at most one level down per application,
/// then floors at zero.
fn step(xp: i64, level: u32, delta: i64) -> (i64, u32, bool) {
    let mut xp = xp + delta;
    let mut level = level;
    let mut clamped = false;

    while xp >= xp_requirement(level) && level < MAX_LEVEL {
        xp -= xp_requirement(level);
        level += 1;
    }
    while xp < 0 && level > MIN_LEVEL {
        level -= 1;
        let borrowed = xp_requirement(level) + xp;
        if borrowed < 0 {
            clamped = true;
        }
        xp = borrowed.max(0);
    }

    if level == MAX_LEVEL && xp >= xp_requirement(level) {
        xp = xp_requirement(level) - 1;
        clamped = true;
    }
    if level == MIN_LEVEL && xp < 0 {
        xp = 0;
        clamped = true;
    }
    (xp, level, clamped)
}
