// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loading of the JSON rules file.
//!
//! ```json
//! {
//!   "rules": [
//!     {"in": "^metric\\.name$", "out": "short", "tags": ["source:legacy"]}
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::errors::ConfigError;
use crate::rules::{Rule, RuleSet};

/// A rule as written in the rules file, before its pattern is compiled.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    #[serde(rename = "in")]
    pub input: String,
    pub out: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl RulesConfig {
    pub fn from_json(path: &Path, data: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(data).map_err(|source| ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Compiles every rule, keeping file order.
    pub fn compile(self) -> Result<RuleSet, ConfigError> {
        let rules = self
            .rules
            .into_iter()
            .map(|rule| Rule::new(&rule.input, rule.out, rule.tags))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RuleSet::new(rules))
    }
}

/// Reads, decodes and compiles the rules file at `path`.
pub fn load_rules(path: &Path) -> Result<RuleSet, ConfigError> {
    let data = fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = RulesConfig::from_json(path, &data)?.compile()?;
    debug!("Loaded {} rules from {}", rules.len(), path.display());
    for rule in rules.iter() {
        debug!("  - {}", rule.pattern());
    }
    Ok(rules)
}
