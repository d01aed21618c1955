// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration failures. Any of these aborts startup with exit
/// code 1; none of them is retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CHAINDATA_PATH environment variable is not set")]
    MissingChaindataPath,
    #[error("CHAINDATA_PATH {0} is not a writable directory")]
    UnusableChaindataPath(PathBuf),
    #[error("genesis file not found at {0}")]
    MissingGenesis(PathBuf),
    #[error("version.txt is missing or unreadable: {0}")]
    UnreadableVersion(String),
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
