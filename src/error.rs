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

//! Error types for the chunk pipeline.
//!
//! Every failure the pipeline can report maps onto one [`Error`] variant.
//! The transport uses [`Error::is_retryable`] to decide whether an attempt
//! is worth repeating; everything else surfaces to the caller unchanged.

use std::time::Duration;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transport, the stream parser and the prefetch orchestrator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A per-attempt or overall timeout budget was exhausted.
    #[error("Timed out after {elapsed:?}: {message}")]
    Timeout { elapsed: Duration, message: String },

    /// Connection, DNS or TLS level failure.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The server answered with a non-success status that is not an auth rejection.
    #[error("HTTP {status} - {body}")]
    Http { status: u16, body: String },

    /// The server rejected the credentials (401/403).
    #[error("Authorization rejected: HTTP {status}")]
    Unauthorized { status: u16 },

    /// The cancellation signal for this operation was observed.
    #[error("Operation cancelled")]
    Cancelled,

    /// A chunk body did not have the expected row-array structure.
    #[error("Malformed chunk payload for chunk {chunk_index}: {message}")]
    MalformedPayload { chunk_index: usize, message: String },

    /// A control-plane response could not be deserialized.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request could not be built (bad URL, bad header value).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A row or column outside a decoded buffer was requested.
    #[error("Index out of range: {what} {index} (limit {limit})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    /// A background task failed unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a transport attempt that failed with this error may be repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Transport(_) => true,
            Error::Http { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// 408, 429 and every 5xx are treated as transient.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Transport("connection reset".into()).is_retryable());
        assert!(Error::Timeout {
            elapsed: Duration::from_secs(16),
            message: "attempt".into()
        }
        .is_retryable());
        assert!(Error::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(Error::Http {
            status: 429,
            body: String::new()
        }
        .is_retryable());

        assert!(!Error::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!Error::Unauthorized { status: 403 }.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::MalformedResponse("bad json".into()).is_retryable());
        assert!(!Error::MalformedPayload {
            chunk_index: 3,
            message: "eof".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Http {
            status: 404,
            body: "NoSuchKey".into(),
        };
        assert_eq!(err.to_string(), "HTTP 404 - NoSuchKey");

        let err = Error::OutOfRange {
            what: "column",
            index: 5,
            limit: 2,
        };
        assert!(err.to_string().contains("column 5"));
        assert!(Error::Cancelled.is_cancelled());
    }
}
