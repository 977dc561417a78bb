// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO queue between the inbound listener and the outbound sender.
//!
//! Enqueueing waits while the queue is full, so a slow sender stalls socket reads instead of
//! dropping datagrams here. Dequeueing waits while the queue is empty.

use tokio::sync::mpsc;

use crate::errors::RelayError;

/// Queue capacity used when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Creates a connected producer/consumer pair holding at most `capacity` datagrams.
///
/// A queue needs room for at least one datagram; a zero capacity is rejected.
pub fn forwarding_channel(
    capacity: usize,
) -> Result<(DatagramProducer, DatagramConsumer), RelayError> {
    if capacity == 0 {
        return Err(RelayError::InvalidConfig(
            "channel capacity must be greater than 0".to_string(),
        ));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((DatagramProducer { tx }, DatagramConsumer { rx }))
}

/// Producing half, owned by the inbound listener.
#[derive(Debug)]
pub struct DatagramProducer {
    tx: mpsc::Sender<Vec<u8>>,
}

impl DatagramProducer {
    /// Waits for a free slot, then enqueues `datagram`. Fails only once the consumer is gone.
    pub async fn enqueue(&self, datagram: Vec<u8>) -> Result<(), RelayError> {
        self.tx
            .send(datagram)
            .await
            .map_err(|_| RelayError::ChannelClosed)
    }
}

/// Consuming half, owned by the outbound sender.
#[derive(Debug)]
pub struct DatagramConsumer {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl DatagramConsumer {
    /// Waits for the next datagram. Returns `None` once every producer is dropped and the
    /// queue is drained.
    pub async fn dequeue(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
