// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Splitting of received datagrams into individual StatsD lines.
//!
//! A datagram carries one or more `\n`-separated lines of the form `key:body`. The key is
//! everything before the first colon and must be non-empty; the body is the rest of the line
//! and is passed through untouched (usually `value|type`, possibly with more colons in it).

/// One `key:body` line of a datagram, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub key: &'a [u8],
    pub body: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Splits a single line at its first colon. Lines without a colon or with an empty key
    /// are not packets.
    pub fn parse(line: &'a [u8]) -> Option<Self> {
        let colon = line.iter().position(|&b| b == b':')?;
        if colon == 0 {
            return None;
        }
        Some(Packet {
            key: &line[..colon],
            body: &line[colon + 1..],
        })
    }
}

/// Parses every well-formed line of `data`, in order. Empty and malformed lines are skipped.
pub fn parse_message(data: &[u8]) -> Vec<Packet<'_>> {
    data.split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .filter_map(Packet::parse)
        .collect()
}
