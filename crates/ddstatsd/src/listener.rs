// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inbound side of the relay.
//!
//! The listener owns the receiving UDP socket. Every datagram it reads is copied into its own
//! buffer and enqueued on the forwarding channel untouched; parsing and rewriting happen on
//! the sender side.

use std::net::SocketAddr;

use socket2::SockRef;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::channel::DatagramProducer;
use crate::errors::RelayError;

/// Bytes read per datagram. Longer datagrams are truncated by the kernel.
pub const READ_BUFFER_SIZE: usize = 512;

/// Kernel receive buffer requested for the inbound socket, to absorb bursts.
pub const RECEIVE_BUFFER_SIZE: usize = 1024 * 1024;

// BufferReader abstracts where datagrams come from.
enum BufferReader {
    /// UDP socket reader, blocks until a datagram arrives
    UdpSocket(UdpSocket),

    /// Replays a fixed list of reads, then waits forever
    #[cfg(test)]
    MirrorTest(std::sync::Mutex<std::collections::VecDeque<std::io::Result<Vec<u8>>>>),
}

impl BufferReader {
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<(usize, Option<SocketAddr>)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let (amt, src) = socket.recv_from(buf).await?;
                Ok((amt, Some(src)))
            }
            #[cfg(test)]
            BufferReader::MirrorTest(reads) => {
                let next = reads
                    .lock()
                    .map_err(|_| std::io::Error::other("mirror reads poisoned"))?
                    .pop_front();
                match next {
                    Some(Ok(data)) => {
                        let amt = data.len().min(buf.len());
                        buf[..amt].copy_from_slice(&data[..amt]);
                        Ok((amt, None))
                    }
                    Some(Err(e)) => Err(e),
                    None => std::future::pending().await,
                }
            }
        }
    }
}

/// Receives StatsD datagrams and hands them to the forwarding channel.
pub struct InboundListener {
    cancel_token: CancellationToken,
    producer: DatagramProducer,
    buffer_reader: BufferReader,
    local_addr: Option<SocketAddr>,
}

impl InboundListener {
    /// Binds the inbound socket on `address` and enlarges its receive buffer.
    ///
    /// A bind failure is fatal. Failing to resize the receive buffer is only logged.
    pub async fn bind(
        address: &str,
        receive_buffer_size: usize,
        producer: DatagramProducer,
        cancel_token: CancellationToken,
    ) -> Result<Self, RelayError> {
        let socket = UdpSocket::bind(address)
            .await
            .map_err(|source| RelayError::Bind {
                address: address.to_string(),
                source,
            })?;

        if let Err(e) = SockRef::from(&socket).set_recv_buffer_size(receive_buffer_size) {
            warn!("Failed to set receive buffer to {receive_buffer_size} bytes: {e}");
        }

        let local_addr = socket.local_addr().ok();
        debug!("Listening on {}", address);

        Ok(InboundListener {
            cancel_token,
            producer,
            buffer_reader: BufferReader::UdpSocket(socket),
            local_addr,
        })
    }

    /// Address the socket is actually bound to, useful when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Reads datagrams until cancelled.
    ///
    /// Read errors are logged and skipped. Returns an error only if the forwarding channel
    /// has no consumer left.
    pub async fn spin(self) -> Result<(), RelayError> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            let read = tokio::select! {
                read = self.buffer_reader.read(&mut buf) => read,
                _ = self.cancel_token.cancelled() => break,
            };

            let amt = match read {
                Ok((amt, src)) => {
                    trace!(
                        "Received message: {} ({amt}) from {src:?}",
                        String::from_utf8_lossy(&buf[..amt])
                    );
                    amt
                }
                Err(e) => {
                    error!("Failed to read UDP packet: {}", e);
                    continue;
                }
            };

            tokio::select! {
                sent = self.producer.enqueue(buf[..amt].to_vec()) => sent?,
                _ = self.cancel_token.cancelled() => break,
            }
        }
        debug!("Inbound listener stopped");
        Ok(())
    }
}
