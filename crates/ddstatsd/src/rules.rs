// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ordered rewrite rules and the engine that applies them.
//!
//! Each rule pairs a compiled pattern with an output key template and a list of tag
//! templates. A packet is rewritten by the first rule whose pattern matches its key; later
//! rules are never consulted for that packet. Templates use the regex crate's expansion
//! syntax (`$1`, `${1}`, `$name`, `${name}`) against the pattern's capture groups.

use regex::bytes::{Regex, RegexBuilder};

use crate::errors::ConfigError;
use crate::packet::{parse_message, Packet};

const TAG_PREFIX: &[u8] = b"|#";
const TAG_SEPARATOR: u8 = b',';

/// A single compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: Regex,
    out: String,
    tags: Vec<String>,
}

impl Rule {
    /// Compiles `pattern` and builds a rule from it.
    ///
    /// Patterns run on raw key bytes with Unicode mode off: `.` matches any byte but `\n`,
    /// and `\w`, `\d`, `\s`, `\b` are ASCII-only, so keys that are not valid UTF-8 still match.
    pub fn new(
        pattern: &str,
        out: impl Into<String>,
        tags: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let pattern = RegexBuilder::new(pattern)
            .unicode(false)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Rule {
            pattern,
            out: out.into(),
            tags,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Rewrites `packet` into `key:body|#tag1,tag2,...`, or returns `None` when the pattern
    /// does not match the packet's key.
    ///
    /// The `|#` suffix is emitted even when the rule has no tag templates.
    pub fn rewrite(&self, packet: &Packet<'_>) -> Option<Vec<u8>> {
        if !self.pattern.is_match(packet.key) {
            return None;
        }

        let key = self.pattern.replace_all(packet.key, self.out.as_bytes());

        let mut line = Vec::with_capacity(key.len() + packet.body.len() + 3);
        line.extend_from_slice(&key);
        line.push(b':');
        line.extend_from_slice(packet.body);
        line.extend_from_slice(TAG_PREFIX);
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                line.push(TAG_SEPARATOR);
            }
            line.extend_from_slice(&self.pattern.replace_all(packet.key, tag.as_bytes()));
        }
        Some(line)
    }
}

/// Rules in configuration order. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        RuleSet { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Rewrites a packet with the first matching rule. Unmatched packets yield `None`.
    pub fn rewrite(&self, packet: &Packet<'_>) -> Option<Vec<u8>> {
        self.rules.iter().find_map(|rule| rule.rewrite(packet))
    }
}

/// Parses a datagram and rewrites each of its packets, dropping those no rule matches.
///
/// The result may be empty; callers must not send empty payloads.
pub fn apply_rules(data: &[u8], rules: &RuleSet) -> Vec<Vec<u8>> {
    parse_message(data)
        .iter()
        .filter_map(|packet| rules.rewrite(packet))
        .collect()
}
