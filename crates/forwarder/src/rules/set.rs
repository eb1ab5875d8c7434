// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::copy::CopyOperation;
use crate::rules::{Override, RawRule, Rule, RuleError};

/// Ordered rules sharing a name. The first matching rule wins unless it is marked
/// `continue`.
#[derive(Debug, Clone, Default)]
pub struct Set {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Set {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Result<Self, RuleError> {
        let set = Set {
            name: name.into(),
            rules,
        };
        set.validate()?;
        Ok(set)
    }

    /// Parses a YAML rule document (a list of rules).
    pub fn from_yaml(name: impl Into<String>, document: &str) -> Result<Self, RuleError> {
        let name = name.into();
        let raw: Vec<RawRule> = if document.trim().is_empty() {
            Vec::new()
        } else {
            serde_yaml::from_str::<Option<Vec<RawRule>>>(document)?.unwrap_or_default()
        };
        let rules = raw
            .into_iter()
            .enumerate()
            .map(|(i, rule)| rule.compile(&format!("{name}.rules[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;
        Set::new(name, rules)
    }

    /// Parses `<pattern>=<content-type>` entries. Empty entries are skipped so that
    /// blank values left by templating do not turn into rules.
    pub fn from_text<S: AsRef<str>>(
        name: impl Into<String>,
        entries: &[S],
    ) -> Result<Self, RuleError> {
        let name = name.into();
        let mut rules = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            let (pattern, content_type) = entry
                .split_once('=')
                .ok_or_else(|| RuleError::MalformedText(entry.to_string()))?;
            let source = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
                path: format!("{name}[{i}]"),
                source,
            })?;
            let mut rule = Rule {
                overrides: Override {
                    content_type: Some(content_type.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            rule.matcher.source = Some(source);
            rules.push(rule);
        }
        Set::new(name, rules)
    }

    /// Every rule must be structurally valid and effective ids must be unique. Rules
    /// without an id are identified by their position.
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut seen = HashSet::with_capacity(self.rules.len());
        for (i, rule) in self.rules.iter().enumerate() {
            rule.validate(&format!("{}.rules[{i}]", self.name))?;
            let id = effective_id(rule, i);
            if !seen.insert(id.clone()) {
                return Err(RuleError::DuplicateId {
                    set: self.name.clone(),
                    id,
                });
            }
        }
        Ok(())
    }

    /// Returns whether any rule fired.
    pub fn apply(&self, op: &mut CopyOperation) -> bool {
        let mut modified = false;
        for (i, rule) in self.rules.iter().enumerate() {
            if !rule.apply(op) {
                continue;
            }
            modified = true;
            debug!(
                "override {}/{} matched {}",
                self.name,
                effective_id(rule, i),
                op.copy_source
            );
            if !rule.continue_on_match {
                break;
            }
        }
        modified
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn effective_id(rule: &Rule, position: usize) -> String {
    if rule.id.is_empty() {
        position.to_string()
    } else {
        rule.id.clone()
    }
}

/// Mutually exclusive rule sets, tried in order.
#[derive(Debug, Clone, Default)]
pub struct Sets(Vec<Set>);

impl Sets {
    pub fn new(sets: Vec<Set>) -> Self {
        Sets(sets)
    }

    pub fn push(&mut self, set: Set) {
        self.0.push(set);
    }

    pub fn extend(&mut self, other: Sets) {
        self.0.extend(other.0);
    }

    /// Applies the first set that modifies `op`; later sets are not tried.
    pub fn apply(&self, op: &mut CopyOperation) -> bool {
        self.0.iter().any(|set| set.apply(op))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Set> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
