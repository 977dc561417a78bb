// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use ddstatsd::{
    config::load_rules,
    relay::{self, RelayConfig},
};

/// Relays StatsD datagrams, rewriting metric keys and adding tags along the way.
#[derive(Debug, Parser)]
#[command(name = "ddstatsd", version)]
struct Args {
    /// UDP listening address
    #[arg(long, env = "DDSTATSD_ADDRESS", default_value = "0.0.0.0:8126")]
    address: String,

    /// UDP destination address
    #[arg(
        long = "destination-address",
        env = "DDSTATSD_DESTINATION_ADDRESS",
        default_value = "127.0.0.1:8125"
    )]
    destination_address: String,

    /// Path to the JSON rules file
    #[arg(long, env = "DDSTATSD_CONFIG", default_value = "rules.cfg")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DDSTATSD_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(args.log_level.to_lowercase())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let rules = match load_rules(&args.config) {
        Ok(rules) => Arc::new(rules),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let config = RelayConfig {
        listen_address: args.address,
        destination_address: args.destination_address,
        ..Default::default()
    };

    let cancel_token = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(cancel_token.clone()));

    match relay::run(&config, rules, cancel_token).await {
        Ok(()) => {
            info!("ddstatsd stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Cancels the relay on SIGTERM or Ctrl-C.
async fn shutdown_on_signal(cancel_token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to register SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
        }
    }
    cancel_token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    // Parses with the environment fallbacks removed so DDSTATSD_* variables set on the
    // machine running the tests cannot leak in.
    fn parse_flags(flags: &[&str]) -> Args {
        let matches = Args::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(flags.iter().copied())
            .unwrap();
        Args::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse_flags(&["ddstatsd"]);
        assert_eq!(args.address, "0.0.0.0:8126");
        assert_eq!(args.destination_address, "127.0.0.1:8125");
        assert_eq!(args.config, PathBuf::from("rules.cfg"));
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_flags() {
        let args = parse_flags(&[
            "ddstatsd",
            "--address",
            "127.0.0.1:9126",
            "--destination-address",
            "statsd.local:9125",
            "--config",
            "/etc/ddstatsd/rules.json",
        ]);
        assert_eq!(args.address, "127.0.0.1:9126");
        assert_eq!(args.destination_address, "statsd.local:9125");
        assert_eq!(args.config, PathBuf::from("/etc/ddstatsd/rules.json"));
    }
}
