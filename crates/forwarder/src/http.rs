// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery to an HTTP ingestion endpoint.
//!
//! Every batch is posted to `<endpoint>?content-type=<content type>&key=<key>` as
//! newline delimited JSON, optionally gzip compressed. Connection errors, throttling
//! and server errors are retried with exponential backoff.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tracing::{debug, warn};

use crate::batch::BatchHandler;
use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_MAX_WAIT_MS,
    DEFAULT_RETRY_MIN_WAIT_MS, NDJSON_CONTENT_TYPE,
};

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("invalid gzip level {0}, expected 0 to 9")]
    InvalidGzipLevel(u32),
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),
    #[error("unexpected status {code}: {status}")]
    Status { code: u16, status: String },
}

impl DeliveryError {
    fn from_status(status: StatusCode) -> Self {
        DeliveryError::Status {
            code: status.as_u16(),
            status: status
                .canonical_reason()
                .unwrap_or("unknown")
                .to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub min_wait: Duration,
    pub max_wait: Duration,
    /// Attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            min_wait: Duration::from_millis(DEFAULT_RETRY_MIN_WAIT_MS),
            max_wait: Duration::from_millis(DEFAULT_RETRY_MAX_WAIT_MS),
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1 based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.min_wait
            .checked_mul(factor)
            .unwrap_or(self.max_wait)
            .min(self.max_wait)
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub endpoint: String,
    /// Gzip level between 0 and 9, `None` for the library default.
    pub gzip_level: Option<u32>,
    pub disable_compression: bool,
    pub authorization: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl HttpConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpConfig {
            endpoint: endpoint.into(),
            gzip_level: None,
            disable_compression: false,
            authorization: None,
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    endpoint: Url,
    compression: Option<Compression>,
    authorization: Option<String>,
    retry: RetryPolicy,
}

impl Client {
    pub fn new(config: HttpConfig) -> Result<Self, DeliveryError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|err| DeliveryError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(DeliveryError::InvalidEndpoint {
                endpoint: config.endpoint,
                reason: format!("unsupported scheme {}", endpoint.scheme()),
            });
        }
        let compression = match (config.disable_compression, config.gzip_level) {
            (true, _) => None,
            (false, None) => Some(Compression::default()),
            (false, Some(level)) if level <= 9 => Some(Compression::new(level)),
            (false, Some(level)) => return Err(DeliveryError::InvalidGzipLevel(level)),
        };
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(270)))
            .build()
            .map_err(DeliveryError::Client)?;
        Ok(Client {
            http,
            endpoint,
            compression,
            authorization: config.authorization,
            retry: config.retry,
        })
    }

    /// Handler posting batches tagged with `content_type` and `key`.
    pub fn sink(&self, content_type: &str, key: &str) -> Arc<Sink> {
        Arc::new(Sink {
            client: self.clone(),
            content_type: content_type.to_string(),
            key: key.to_string(),
        })
    }

    pub async fn post(&self, content_type: &str, key: &str, batch: &[u8]) -> Result<(), DeliveryError> {
        let body = match self.compression {
            Some(level) => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(batch.len() / 4), level);
                encoder.write_all(batch)?;
                Bytes::from(encoder.finish()?)
            }
            None => Bytes::copy_from_slice(batch),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut request = self
                .http
                .post(self.endpoint.clone())
                .query(&[("content-type", content_type), ("key", key)])
                .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
                .body(body.clone());
            if self.compression.is_some() {
                request = request.header(CONTENT_ENCODING, "gzip");
            }
            if let Some(authorization) = &self.authorization {
                request = request.header(AUTHORIZATION, authorization);
            }

            let time = Instant::now();
            let err = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if matches!(status.as_u16(), 200 | 202 | 204) {
                        debug!(
                            "delivered {} bytes for {key} in {} ms",
                            body.len(),
                            time.elapsed().as_millis()
                        );
                        return Ok(());
                    }
                    let err = DeliveryError::from_status(status);
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(err) => DeliveryError::Request(err),
            };

            if attempts >= self.retry.max_attempts {
                warn!("giving up delivery for {key} after {attempts} attempts: {err}");
                return Err(err);
            }
            let wait = self.retry.backoff(attempts);
            debug!("delivery attempt {attempts} for {key} failed: {err}, retrying in {wait:?}");
            tokio::time::sleep(wait).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Posts every batch of one object.
#[derive(Debug, Clone)]
pub struct Sink {
    client: Client,
    content_type: String,
    key: String,
}

#[async_trait]
impl BatchHandler for Sink {
    async fn handle(&self, batch: &[u8]) -> Result<(), DeliveryError> {
        self.client.post(&self.content_type, &self.key, batch).await
    }
}
