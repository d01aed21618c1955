// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Typed decode failures. The dispatcher converts all of these into dropped
/// packets; none of them penalizes the sender.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("buffer of {0} bytes is too short for a {1}-byte header")]
    TruncatedHeader(usize, usize),
    #[error("payload ended inside a {0}")]
    TruncatedPayload(&'static str),
    #[error("string of {0} bytes exceeds the {1}-byte length prefix")]
    StringTooLong(usize, usize),
    #[error("DM payload of {0} bytes exceeds the {1}-byte cap")]
    DmTooLarge(usize, usize),
    #[error("string field is not valid UTF-8")]
    BadUtf8,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
