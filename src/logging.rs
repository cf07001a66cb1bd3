// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging setup for the chunk pipeline.
//!
//! Initializes a `tracing-subscriber` with file or stderr output.
//!
//! ## Configuration priority
//!
//! 1. `LogConfig::level` / `LogConfig::file` (highest)
//! 2. `RUST_LOG` environment variable
//! 3. Default: `warn`
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=snowflake_chunk_pipeline=debug ./my_app
//! ```

use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, time::SystemTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Crate target used in filter directives.
const LOG_TARGET: &str = "snowflake_chunk_pipeline";

/// Logging configuration supplied by the embedding driver.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log level: "OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE".
    pub level: Option<String>,
    /// Log file path. If unset, logs go to stderr.
    pub file: Option<String>,
}

impl LogConfig {
    /// Filter for this config, or `None` when logging is switched off.
    fn filter(&self) -> Option<EnvFilter> {
        match self.level.as_deref() {
            Some(level) if level.eq_ignore_ascii_case("off") => None,
            Some(level) => Some(EnvFilter::new(format!(
                "{}={}",
                LOG_TARGET,
                level.to_lowercase()
            ))),
            None => Some(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(format!("{}=warn", LOG_TARGET))),
            ),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Uses `OnceLock` to ensure this is called at most once per process.
/// The first call configures logging; subsequent calls are no-ops.
pub fn init_logging(config: &LogConfig) {
    LOGGING_INITIALIZED.get_or_init(|| {
        let Some(filter) = config.filter() else {
            return;
        };

        let Some(ref path) = config.file else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_timer(SystemTime),
                )
                .try_init()
                .ok();
            return;
        };

        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(
                        fmt::layer()
                            .with_writer(file)
                            .with_target(false)
                            .with_ansi(false)
                            .with_timer(SystemTime),
                    )
                    .try_init()
                    .ok();
            }
            Err(e) => {
                eprintln!(
                    "snowflake-chunk-pipeline: failed to open log file {}: {}",
                    path, e
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.level.is_none());
        assert!(config.file.is_none());
        assert!(config.filter().is_some());
    }

    #[test]
    fn test_off_disables_filter() {
        for level in ["OFF", "off", "Off"] {
            let config = LogConfig {
                level: Some(level.to_string()),
                file: None,
            };
            assert!(config.filter().is_none());
        }
    }

    #[test]
    fn test_explicit_level_targets_crate() {
        let config = LogConfig {
            level: Some("DEBUG".to_string()),
            file: None,
        };
        let filter = config.filter().unwrap();
        assert_eq!(filter.to_string(), "snowflake_chunk_pipeline=debug");
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(&LogConfig {
            level: Some("DEBUG".to_string()),
            file: None,
        });
        init_logging(&LogConfig::default());
        assert!(LOGGING_INITIALIZED.get().is_some());
    }
}
