// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use ddstatsd::{
    config::load_rules,
    relay::{Relay, RelayConfig},
};
use std::{io::Write, net::SocketAddr, sync::Arc};
use tempfile::NamedTempFile;
use tokio::{
    net::UdpSocket,
    task::JoinHandle,
    time::{timeout, Duration},
};
use tokio_util::sync::CancellationToken;

const RULES: &str = r#"{
  "rules": [
    {
      "in": "^nsq\\.topic\\.([^.]+)\\.channel\\.([^.]+)#ephemeral\\.([^.]+)$",
      "out": "nsq.channel.$3",
      "tags": ["nsq_topic:$1", "nsq_channel:${2}__ephemeral", "nsq_$3"]
    },
    {
      "in": "^nsq\\.topic\\.([^.]+)\\.channel\\.([^.]+)\\.([^.]+)$",
      "out": "nsq.channel.$3",
      "tags": ["nsq_topic:$1", "nsq_channel:$2", "nsq_$3"]
    },
    {
      "in": "^metric\\.name$",
      "out": "short"
    }
  ]
}"#;

#[cfg(test)]
#[tokio::test]
async fn relay_rewrites_and_forwards_each_line() {
    let destination = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind destination socket");
    let (inbound, cancel_token, relay_task) = start_relay(&destination).await;

    let client = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind client socket");
    client
        .send_to(
            b"nsq.topic.website_events.channel.nsq_to_file#ephemeral.message_count:1|c\nunknown.metric:1|c\nmetric.name:5|c\n",
            inbound,
        )
        .await
        .expect("unable to send metrics");

    assert_eq!(
        receive(&destination).await,
        "nsq.channel.message_count:1|c|#nsq_topic:website_events,nsq_channel:nsq_to_file__ephemeral,nsq_message_count"
    );
    assert_eq!(receive(&destination).await, "short:5|c|#");

    cancel_token.cancel();
    relay_task
        .await
        .expect("relay task panicked")
        .expect("relay failed");
}

#[cfg(test)]
#[tokio::test]
async fn relay_skips_datagrams_without_matches() {
    let destination = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind destination socket");
    let (inbound, cancel_token, relay_task) = start_relay(&destination).await;

    let client = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("unable to bind client socket");
    client.send_to(b"\n", inbound).await.expect("send failed");
    client
        .send_to(b"unknown.metric:1|c", inbound)
        .await
        .expect("send failed");
    client
        .send_to(b"nsq.topic.orders.channel.archiver.depth:12|g", inbound)
        .await
        .expect("send failed");

    // Datagrams are processed in order, so the first thing to arrive must be the match.
    assert_eq!(
        receive(&destination).await,
        "nsq.channel.depth:12|g|#nsq_topic:orders,nsq_channel:archiver,nsq_depth"
    );

    cancel_token.cancel();
    relay_task
        .await
        .expect("relay task panicked")
        .expect("relay failed");
}

async fn start_relay(
    destination: &UdpSocket,
) -> (
    SocketAddr,
    CancellationToken,
    JoinHandle<Result<(), ddstatsd::errors::RelayError>>,
) {
    let mut rules_file = NamedTempFile::new().expect("unable to create rules file");
    rules_file
        .write_all(RULES.as_bytes())
        .expect("unable to write rules file");
    let rules = load_rules(rules_file.path()).expect("unable to load rules");

    let config = RelayConfig {
        listen_address: "127.0.0.1:0".to_string(),
        destination_address: destination
            .local_addr()
            .expect("destination has no address")
            .to_string(),
        ..Default::default()
    };
    let cancel_token = CancellationToken::new();
    let relay = Relay::start(&config, Arc::new(rules), cancel_token.clone())
        .await
        .expect("unable to start relay");
    let inbound = relay.local_addr().expect("relay has no inbound address");

    (inbound, cancel_token, tokio::spawn(relay.run()))
}

async fn receive(destination: &UdpSocket) -> String {
    let mut buf = [0u8; 512];
    let amt = timeout(Duration::from_secs(1), destination.recv(&mut buf))
        .await
        .expect("timed out waiting for relayed metric")
        .expect("unable to receive relayed metric");
    String::from_utf8_lossy(&buf[..amt]).into_owned()
}
