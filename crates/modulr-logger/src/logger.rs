// Copyright (c) Modulr
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing_subscriber::{fmt::time::ChronoUtc, EnvFilter};

const FILTER_ENV_VAR: &str = "MODULR_LOG";

static LOGGER: OnceCell<ModulrLogger> = OnceCell::new();

/// Severity of a log entry, lowest to highest.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl Level {
    fn as_filter_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            // tracing has no level above error, criticals are errors too
            Level::Error | Level::Critical => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Level {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "warn" | "warning" => Level::Warn,
            "error" => Level::Error,
            "critical" => Level::Critical,
            _ => Level::Info,
        })
    }
}

/// Handle for the process-wide logger. Construct through the builder once,
/// early in main; later calls to init are no-ops.
#[derive(Debug)]
pub struct ModulrLogger {
    default_level: Level,
}

impl ModulrLogger {
    pub fn builder() -> ModulrLoggerBuilder {
        ModulrLoggerBuilder::new()
    }

    pub fn default_level(&self) -> Level {
        self.default_level
    }
}

pub struct ModulrLoggerBuilder {
    default_level: Level,
    is_test: bool,
}

impl ModulrLoggerBuilder {
    fn new() -> Self {
        Self {
            default_level: Level::Info,
            is_test: false,
        }
    }

    pub fn level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Route output through the test writer so cargo captures it per-test.
    pub fn is_test(mut self, is_test: bool) -> Self {
        self.is_test = is_test;
        self
    }

    pub fn build(self) -> &'static ModulrLogger {
        let default_level = self.default_level;
        let is_test = self.is_test;
        LOGGER.get_or_init(move || {
            let filter = EnvFilter::try_from_env(FILTER_ENV_VAR)
                .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_timer(ChronoUtc::rfc_3339())
                .with_target(true);
            if is_test {
                // A second test binary in the same process may already have
                // installed a subscriber.
                let _ = subscriber.with_test_writer().try_init();
            } else {
                subscriber
                    .try_init()
                    .expect("attempted to initialize the logger twice");
            }
            ModulrLogger { default_level }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_level_parsing() {
        assert_eq!("debug".parse::<Level>(), Ok(Level::Debug));
        assert_eq!("WARNING".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("gibberish".parse::<Level>(), Ok(Level::Info));
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Warn < Level::Critical);
    }
}
