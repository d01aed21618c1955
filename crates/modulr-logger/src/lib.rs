// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

//! Structured logging for the Modulr node.
//!
//! Every component logs through the same macros with key-value fields:
//!
//! ```
//! use modulr_logger::prelude::*;
//!
//! let epoch = 3u64;
//! info!(epoch = epoch, "Starting new epoch");
//! ```
//!
//! The per-component severity stream is controlled with the `MODULR_LOG`
//! environment variable using the usual filter syntax, e.g.
//! `MODULR_LOG=info,modulr_consensus=debug`.

mod logger;

pub use logger::{Level, ModulrLogger, ModulrLoggerBuilder};

// The macros are re-exported so call sites never name the backing crate.
pub use tracing::{debug, error, info, trace, warn};

pub mod prelude {
    pub use crate::{debug, error, info, trace, warn};
}
