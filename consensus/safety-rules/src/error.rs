// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    #[error("signing block {block_id} would equivocate: already voted for {voted_hash}, asked to vote for {requested_hash}")]
    EquivocatingVote {
        block_id: String,
        voted_hash: String,
        requested_hash: String,
    },
    #[error("block {block_id} carries an invalid creator signature")]
    InvalidBlockSignature { block_id: String },
    #[error("block time {block_time} is not ahead of the last voted time {last_voted_time}")]
    NonMonotonicTimestamp { block_time: u64, last_voted_time: u64 },
    #[error("internal storage failure: {0}")]
    InternalStorage(String),
    #[error("signature creation failed: {0}")]
    SigningFailure(String),
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Error::InternalStorage(format!("{:#}", error))
    }
}
