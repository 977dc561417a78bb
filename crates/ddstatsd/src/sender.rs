// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outbound side of the relay.
//!
//! The sender dequeues raw datagrams, rewrites them with the rule set and writes each
//! rewritten line to the destination as its own datagram. Delivery is at most once: when a
//! write fails the connection is dropped and dialed again exactly once, and the line whose
//! write failed is not retried. If that single reconnect fails the sender stops with an error.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::channel::DatagramConsumer;
use crate::errors::RelayError;
use crate::rules::{apply_rules, RuleSet};

/// Timeout used when dialing the destination.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// A writable association with the destination.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Opens connections to the destination. Every call yields a brand new connection.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Connection: Connection;

    async fn dial(&self) -> Result<Self::Connection, RelayError>;
}

/// A UDP socket connected to a fixed destination.
#[derive(Debug)]
pub struct UdpConnection {
    socket: UdpSocket,
}

impl UdpConnection {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }
}

#[async_trait]
impl Connection for UdpConnection {
    async fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf).await
    }
}

/// Dials `address` over UDP from an ephemeral local port, within `timeout`.
#[derive(Debug, Clone)]
pub struct UdpDialer {
    address: String,
    timeout: Duration,
}

impl UdpDialer {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        UdpDialer {
            address: address.into(),
            timeout,
        }
    }

    async fn connect(&self) -> io::Result<UdpSocket> {
        let remote = lookup_host(self.address.as_str())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
            })?;
        let local = if remote.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        Ok(socket)
    }
}

#[async_trait]
impl Dialer for UdpDialer {
    type Connection = UdpConnection;

    async fn dial(&self) -> Result<UdpConnection, RelayError> {
        match tokio::time::timeout(self.timeout, self.connect()).await {
            Ok(Ok(socket)) => {
                debug!("Connected to {}", self.address);
                Ok(UdpConnection { socket })
            }
            Ok(Err(source)) => Err(RelayError::Dial {
                address: self.address.clone(),
                source,
            }),
            Err(_) => Err(RelayError::DialTimeout {
                address: self.address.clone(),
                timeout: self.timeout,
            }),
        }
    }
}

/// Rewrites queued datagrams and forwards them to the destination.
pub struct OutboundSender<D: Dialer> {
    cancel_token: CancellationToken,
    consumer: DatagramConsumer,
    dialer: D,
    rules: Arc<RuleSet>,
}

impl<D: Dialer> OutboundSender<D> {
    #[must_use]
    pub fn new(
        dialer: D,
        consumer: DatagramConsumer,
        rules: Arc<RuleSet>,
        cancel_token: CancellationToken,
    ) -> Self {
        OutboundSender {
            cancel_token,
            consumer,
            dialer,
            rules,
        }
    }

    /// Dials the destination. Failure here is fatal.
    pub async fn connect(&self) -> Result<D::Connection, RelayError> {
        self.dialer.dial().await
    }

    /// Forwards datagrams over `conn` until cancelled, the channel closes, or a reconnect
    /// fails.
    pub async fn spin(mut self, mut conn: D::Connection) -> Result<(), RelayError> {
        loop {
            let data = tokio::select! {
                data = self.consumer.dequeue() => data,
                _ = self.cancel_token.cancelled() => break,
            };
            let Some(data) = data else {
                debug!("Forwarding channel closed");
                break;
            };
            conn = self.forward(conn, &data).await?;
        }
        debug!("Outbound sender stopped");
        Ok(())
    }

    /// Rewrites one datagram and writes every resulting line, returning the connection to
    /// keep using. A failed write replaces the connection.
    async fn forward(
        &self,
        mut conn: D::Connection,
        data: &[u8],
    ) -> Result<D::Connection, RelayError> {
        for packet in apply_rules(data, &self.rules) {
            trace!("out: {}", String::from_utf8_lossy(&packet));
            if let Err(e) = conn.send(&packet).await {
                error!("Failed writing to UDP socket: {}", e);
                drop(conn);
                conn = self.dialer.dial().await?;
            }
        }
        Ok(conn)
    }
}
