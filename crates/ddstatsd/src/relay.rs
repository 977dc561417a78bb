// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs the listener and the sender as two tasks joined by the forwarding channel.
//!
//! Startup failures (bind, first dial) are returned before any task is spawned. Once running,
//! the first task to stop cancels the other; the runner waits for both, so both sockets are
//! closed by the time [`Relay::run`] returns.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::channel::{forwarding_channel, DEFAULT_CHANNEL_CAPACITY};
use crate::errors::RelayError;
use crate::listener::{InboundListener, RECEIVE_BUFFER_SIZE};
use crate::rules::RuleSet;
use crate::sender::{Dialer, OutboundSender, UdpDialer, DEFAULT_DIAL_TIMEOUT};

/// Addresses and tuning for a relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Local address to receive StatsD datagrams on (e.g., "0.0.0.0:8126")
    pub listen_address: String,
    /// Destination collector (e.g., "127.0.0.1:8125")
    pub destination_address: String,
    /// Datagrams buffered between the listener and the sender
    pub channel_capacity: usize,
    /// Timeout for each dial of the destination
    pub dial_timeout: Duration,
    /// Requested kernel receive buffer for the inbound socket
    pub receive_buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8126".to_string(),
            destination_address: "127.0.0.1:8125".to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            receive_buffer_size: RECEIVE_BUFFER_SIZE,
        }
    }
}

/// A relay whose inbound socket is bound and whose destination is dialed.
pub struct Relay<D: Dialer = UdpDialer> {
    cancel_token: CancellationToken,
    listener: InboundListener,
    sender: OutboundSender<D>,
    connection: D::Connection,
}

impl Relay<UdpDialer> {
    /// Binds the inbound socket, then dials the destination over UDP. Either failure is
    /// fatal.
    pub async fn start(
        config: &RelayConfig,
        rules: Arc<RuleSet>,
        cancel_token: CancellationToken,
    ) -> Result<Self, RelayError> {
        let dialer = UdpDialer::new(config.destination_address.as_str(), config.dial_timeout);
        Self::start_with_dialer(config, dialer, rules, cancel_token).await
    }
}

impl<D> Relay<D>
where
    D: Dialer + 'static,
    D::Connection: 'static,
{
    /// Binds the inbound socket, then dials the destination through `dialer`.
    pub async fn start_with_dialer(
        config: &RelayConfig,
        dialer: D,
        rules: Arc<RuleSet>,
        cancel_token: CancellationToken,
    ) -> Result<Self, RelayError> {
        let (producer, consumer) = forwarding_channel(config.channel_capacity)?;

        let listener = InboundListener::bind(
            &config.listen_address,
            config.receive_buffer_size,
            producer,
            cancel_token.clone(),
        )
        .await?;

        let sender = OutboundSender::new(dialer, consumer, rules, cancel_token.clone());
        let connection = sender.connect().await?;

        info!(
            "Relaying {} -> {}",
            config.listen_address, config.destination_address
        );

        Ok(Relay {
            cancel_token,
            listener,
            sender,
            connection,
        })
    }

    /// Address the inbound socket is bound to.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs both tasks until one of them stops, then stops the other.
    ///
    /// Returns the first error either task reported.
    pub async fn run(self) -> Result<(), RelayError> {
        let Relay {
            cancel_token,
            listener,
            sender,
            connection,
        } = self;

        let mut listener_task = tokio::spawn(listener.spin());
        let mut sender_task = tokio::spawn(sender.spin(connection));

        let (first, remaining) = tokio::select! {
            result = &mut listener_task => (join_result("listener", result), sender_task),
            result = &mut sender_task => (join_result("sender", result), listener_task),
        };

        cancel_token.cancel();
        let second = join_result("relay", remaining.await);
        debug!("Relay stopped");

        first.and(second)
    }
}

/// Binds, dials and runs a relay until it is cancelled or fails.
pub async fn run(
    config: &RelayConfig,
    rules: Arc<RuleSet>,
    cancel_token: CancellationToken,
) -> Result<(), RelayError> {
    Relay::start(config, rules, cancel_token).await?.run().await
}

fn join_result(
    name: &str,
    result: Result<Result<(), RelayError>, tokio::task::JoinError>,
) -> Result<(), RelayError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("{name} stopped: {e}");
            Err(e)
        }
        Err(e) => Err(RelayError::Task(format!("{name} task failed: {e}"))),
    }
}
