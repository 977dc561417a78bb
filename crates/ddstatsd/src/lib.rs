// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! StatsD relay that rewrites metric keys and injects tags.
//!
//! Datagrams received on the inbound socket are queued on a bounded channel, rewritten by an
//! ordered set of pattern rules and forwarded line by line to a downstream collector.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod channel;
pub mod config;
pub mod errors;
pub mod listener;
pub mod packet;
pub mod relay;
pub mod rules;
pub mod sender;
