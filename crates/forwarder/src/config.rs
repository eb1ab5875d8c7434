// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment configuration.
//!
//! Everything is read and validated once at startup. Rule documents, presets and
//! source globs are compiled here so a bad configuration never reaches an invocation.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::batch::RunnerConfig;
use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_RECORD_SIZE, DEFAULT_PRESETS, DEFAULT_RETRY_MAX_ATTEMPTS,
    DEFAULT_RETRY_MAX_WAIT_MS, DEFAULT_RETRY_MIN_WAIT_MS,
};
use crate::copy::{ObjectUri, UriError};
use crate::filter::{FilterError, ObjectFilter};
use crate::handler::HandlerConfig;
use crate::http::{HttpConfig, RetryPolicy};
use crate::rules::{PresetLibrary, RuleError, Set, Sets};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    #[error("invalid {name} {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid destination: {0}")]
    Destination(#[from] UriError),
    #[error("unsupported destination scheme {0:?}")]
    UnsupportedScheme(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Rules(#[from] RuleError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub destination: ObjectUri,
    pub filter: ObjectFilter,
    pub sets: Sets,
    /// 0 disables the limit.
    pub max_file_size: u64,
    /// 0 uses the available parallelism.
    pub max_concurrent_tasks: usize,
    /// Present when the destination is an HTTP endpoint.
    pub http: Option<HttpConfig>,
    pub runner: RunnerConfig,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_env_with_presets(&PresetLibrary::builtin())
    }

    pub fn from_env_with_presets(presets: &PresetLibrary) -> Result<Config, ConfigError> {
        let destination_uri = var("DESTINATION_URI").ok_or(ConfigError::Missing("DESTINATION_URI"))?;
        let destination = ObjectUri::parse(&destination_uri)?;
        let http = match destination.scheme.as_str() {
            "s3" => None,
            "http" | "https" => Some(http_config(destination_uri)?),
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };

        let filter = ObjectFilter::new(
            &list("SOURCE_BUCKET_NAMES").unwrap_or_else(|| vec!["*".to_string()]),
            &list("SOURCE_OBJECT_KEYS").unwrap_or_else(|| vec!["*".to_string()]),
        )?;

        // user supplied rules take precedence over presets, the first matching set wins
        let mut sets = Sets::default();
        if let Some(overrides) = list("CONTENT_TYPE_OVERRIDES") {
            sets.push(Set::from_text("content-type-overrides", &overrides)?);
        }
        if let Some(document) = var("OVERRIDE_RULES") {
            sets.push(Set::from_yaml("override-rules", &document)?);
        }
        let preset_names = list("PRESET_OVERRIDES")
            .unwrap_or_else(|| DEFAULT_PRESETS.iter().map(ToString::to_string).collect());
        sets.extend(presets.load(&preset_names)?);

        let runner = RunnerConfig {
            max_record_size: parse("MAX_RECORD_SIZE")?.unwrap_or(DEFAULT_MAX_RECORD_SIZE),
            max_batch_size: parse("MAX_BATCH_SIZE")?.unwrap_or(DEFAULT_MAX_BATCH_SIZE),
            max_concurrency: parse("MAX_BATCH_CONCURRENCY")?.unwrap_or(DEFAULT_MAX_CONCURRENCY),
        };
        if runner.max_batch_size == 0 {
            return Err(invalid("MAX_BATCH_SIZE", "0", "must be positive"));
        }

        Ok(Config {
            destination,
            filter,
            sets,
            max_file_size: parse("MAX_FILE_SIZE")?.unwrap_or(0),
            max_concurrent_tasks: parse("MAX_CONCURRENT_TASKS")?.unwrap_or(0),
            http,
            runner,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            destination: self.destination.clone(),
            filter: self.filter.clone(),
            sets: self.sets.clone(),
            max_file_size: self.max_file_size,
            max_concurrent_tasks: self.max_concurrent_tasks,
        }
    }
}

fn http_config(endpoint: String) -> Result<HttpConfig, ConfigError> {
    let gzip_level: Option<u32> = parse("HTTP_GZIP_LEVEL")?;
    if let Some(level) = gzip_level.filter(|level| *level > 9) {
        return Err(invalid(
            "HTTP_GZIP_LEVEL",
            level,
            "expected a level between 0 and 9",
        ));
    }
    let retry = RetryPolicy {
        min_wait: Duration::from_millis(
            parse("HTTP_RETRY_MIN_WAIT_MS")?.unwrap_or(DEFAULT_RETRY_MIN_WAIT_MS),
        ),
        max_wait: Duration::from_millis(
            parse("HTTP_RETRY_MAX_WAIT_MS")?.unwrap_or(DEFAULT_RETRY_MAX_WAIT_MS),
        ),
        max_attempts: parse("HTTP_RETRY_MAX_ATTEMPTS")?.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS),
    };
    Ok(HttpConfig {
        endpoint,
        gzip_level,
        disable_compression: parse("HTTP_DISABLE_COMPRESSION")?.unwrap_or(false),
        authorization: var("HTTP_AUTHORIZATION"),
        timeout: Duration::from_secs(
            parse("HTTP_TIMEOUT_SECS")?.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        ),
        retry,
    })
}

/// Set and non blank.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Comma separated values, `None` when unset or blank.
fn list(name: &str) -> Option<Vec<String>> {
    var(name).map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    })
}

fn parse<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    var(name)
        .map(|value| {
            value
                .parse()
                .map_err(|err: T::Err| invalid(name, &value, err))
        })
        .transpose()
}

fn invalid(name: &'static str, value: impl Display, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
