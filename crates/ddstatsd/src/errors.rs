// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the relay.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while loading and compiling the rules file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to decode config file {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid rule pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Errors that stop the relay. Anything recoverable is handled where it happens and never
/// surfaces as a `RelayError`.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to bind UDP socket on {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("UDP connection to {address} failed: {source}")]
    Dial { address: String, source: io::Error },

    #[error("UDP connection to {address} timed out after {timeout:?}")]
    DialTimeout { address: String, timeout: Duration },

    #[error("forwarding channel closed")]
    ChannelClosed,

    #[error("relay task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Read {
            path: PathBuf::from("rules.cfg"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(
            error.to_string(),
            "failed to read config file rules.cfg: no such file"
        );
    }

    #[test]
    fn test_dial_timeout_display() {
        let error = RelayError::DialTimeout {
            address: "127.0.0.1:8125".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(
            error.to_string(),
            "UDP connection to 127.0.0.1:8125 timed out after 1s"
        );
    }
}
