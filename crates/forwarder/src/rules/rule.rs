// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::Regex;
use serde::Deserialize;

use crate::copy::CopyOperation;
use crate::rules::RuleError;
use crate::storage::MetadataDirective;

/// Patterns a copy operation must satisfy. An absent pattern matches anything.
#[derive(Debug, Clone, Default)]
pub struct Match {
    pub source: Option<Regex>,
    pub content_type: Option<Regex>,
    pub content_encoding: Option<Regex>,
}

/// Metadata written when a rule fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Override {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Replacement destination key. Expanded against the source pattern captures
    /// (`$1`, `${name}`) when a source pattern exists. An empty key means the object
    /// must not be copied.
    pub key: Option<String>,
}

impl Override {
    fn is_empty(&self) -> bool {
        self.content_type.is_none() && self.content_encoding.is_none() && self.key.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub id: String,
    pub matcher: Match,
    pub overrides: Override,
    /// Keep evaluating the following rules of the set after this one fires.
    pub continue_on_match: bool,
}

impl Rule {
    /// Applies the rule to `op`, returning whether it matched. `op` is only modified on
    /// a match.
    pub fn apply(&self, op: &mut CopyOperation) -> bool {
        let captures = match &self.matcher.source {
            Some(pattern) => match pattern.captures(&op.copy_source) {
                Some(captures) => Some(captures),
                None => return false,
            },
            None => None,
        };
        if !is_match(&self.matcher.content_type, op.content_type.as_deref())
            || !is_match(&self.matcher.content_encoding, op.content_encoding.as_deref())
        {
            return false;
        }

        if let Some(template) = &self.overrides.key {
            op.key = match &captures {
                Some(captures) if !template.is_empty() => {
                    let mut key = String::new();
                    captures.expand(template, &mut key);
                    key
                }
                _ => template.clone(),
            };
        }
        if let Some(content_type) = &self.overrides.content_type {
            op.content_type = Some(content_type.clone());
        }
        if let Some(content_encoding) = &self.overrides.content_encoding {
            op.content_encoding = Some(content_encoding.clone());
        }
        op.metadata_directive = Some(MetadataDirective::Replace);
        true
    }

    /// Structural validation, `path` prefixes error messages.
    pub fn validate(&self, path: &str) -> Result<(), RuleError> {
        if !is_valid_id(&self.id) {
            return Err(RuleError::InvalidId {
                path: path.to_string(),
                id: self.id.clone(),
            });
        }
        if self.overrides.is_empty() {
            return Err(RuleError::EmptyOverride {
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

fn is_match(pattern: &Option<Regex>, value: Option<&str>) -> bool {
    pattern
        .as_ref()
        .map_or(true, |pattern| pattern.is_match(value.unwrap_or_default()))
}

/// Ids are empty or match `^[a-zA-Z][a-zA-Z0-9/]*$`.
fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        None => true,
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '/')
        }
        Some(_) => false,
    }
}

/// Rule as written in a rule document, before any pattern is compiled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRule {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "match")]
    pub matcher: RawMatch,
    #[serde(default, rename = "override")]
    pub overrides: RawOverride,
    #[serde(default, rename = "continue")]
    pub continue_on_match: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawMatch {
    pub source: Option<String>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawOverride {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub key: Option<String>,
}

impl RawRule {
    /// Compiles every pattern, naming the offending field on failure.
    pub fn compile(self, path: &str) -> Result<Rule, RuleError> {
        let compile = |field: &str, pattern: Option<String>| -> Result<Option<Regex>, RuleError> {
            pattern
                .map(|pattern| {
                    Regex::new(&pattern).map_err(|source| RuleError::InvalidPattern {
                        path: format!("{path}.match.{field}"),
                        source,
                    })
                })
                .transpose()
        };
        let rule = Rule {
            id: self.id,
            matcher: Match {
                source: compile("source", self.matcher.source)?,
                content_type: compile("content-type", self.matcher.content_type)?,
                content_encoding: compile("content-encoding", self.matcher.content_encoding)?,
            },
            overrides: Override {
                content_type: self.overrides.content_type,
                content_encoding: self.overrides.content_encoding,
                key: self.overrides.key,
            },
            continue_on_match: self.continue_on_match,
        };
        rule.validate(path)?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(source: &str) -> CopyOperation {
        CopyOperation {
            bucket: "dest".to_string(),
            copy_source: source.to_string(),
            key: "prefix/key".to_string(),
            ..Default::default()
        }
    }

    fn rule(source: Option<&str>, content_type: Option<&str>) -> Rule {
        RawRule {
            matcher: RawMatch {
                source: source.map(String::from),
                ..Default::default()
            },
            overrides: RawOverride {
                content_type: content_type.map(String::from),
                ..Default::default()
            },
            ..Default::default()
        }
        .compile("rule")
        .unwrap()
    }

    #[test]
    fn test_apply_sets_metadata_directive() {
        let rule = rule(Some(r"\.json$"), Some("application/x-ndjson"));
        let mut op = op("bucket/file.json");
        assert!(rule.apply(&mut op));
        assert_eq!(op.content_type.as_deref(), Some("application/x-ndjson"));
        assert_eq!(op.metadata_directive, Some(MetadataDirective::Replace));
    }

    #[test]
    fn test_no_match_leaves_operation_untouched() {
        let rule = rule(Some(r"\.json$"), Some("application/x-ndjson"));
        let mut op = op("bucket/file.csv");
        let before = op.clone();
        assert!(!rule.apply(&mut op));
        assert_eq!(op, before);
    }

    #[test]
    fn test_absent_metadata_matches_empty_pattern() {
        let raw = RawRule {
            matcher: RawMatch {
                content_encoding: Some("^$".to_string()),
                ..Default::default()
            },
            overrides: RawOverride {
                content_encoding: Some("gzip".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let rule = raw.compile("rule").unwrap();
        let mut op = op("bucket/file.gz");
        assert!(rule.apply(&mut op));
        assert_eq!(op.content_encoding.as_deref(), Some("gzip"));
        assert!(!rule.apply(&mut op));
    }

    #[test]
    fn test_key_override_expands_captures() {
        let raw = RawRule {
            matcher: RawMatch {
                source: Some(r"^[^/]+/(?P<rest>.*)\.log$".to_string()),
                ..Default::default()
            },
            overrides: RawOverride {
                key: Some("logs/${rest}.txt".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let rule = raw.compile("rule").unwrap();
        let mut op = op("bucket/a/b.log");
        assert!(rule.apply(&mut op));
        assert_eq!(op.key, "logs/a/b.txt");
    }

    #[test]
    fn test_empty_key_override_clears_key() {
        let raw = RawRule {
            matcher: RawMatch {
                source: Some("Digest".to_string()),
                ..Default::default()
            },
            overrides: RawOverride {
                key: Some(String::new()),
                ..Default::default()
            },
            ..Default::default()
        };
        let rule = raw.compile("rule").unwrap();
        let mut op = op("bucket/CloudTrail-Digest/file.json.gz");
        assert!(rule.apply(&mut op));
        assert!(op.key.is_empty());
    }

    #[test]
    fn test_invalid_pattern_names_field() {
        let raw = RawRule {
            matcher: RawMatch {
                content_type: Some("(".to_string()),
                ..Default::default()
            },
            overrides: RawOverride {
                content_type: Some("text/csv".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = raw.compile("rules[3]").unwrap_err();
        assert!(err.to_string().starts_with("rules[3].match.content-type: invalid pattern"));
    }

    #[test]
    fn test_rule_ids() {
        assert!(is_valid_id(""));
        assert!(is_valid_id("aws"));
        assert!(is_valid_id("cloudtrail/digest"));
        assert!(is_valid_id("A1/b2"));
        assert!(!is_valid_id("1abc"));
        assert!(!is_valid_id("/abc"));
        assert!(!is_valid_id("has-dash"));
        assert!(!is_valid_id("has space"));
    }

    #[test]
    fn test_rule_without_override_is_invalid() {
        let raw = RawRule {
            id: "noop".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            raw.compile("rules[0]"),
            Err(RuleError::EmptyOverride { .. })
        ));
    }
}
