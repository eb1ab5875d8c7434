// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarding of SQS batches.
//!
//! Each message of a batch is processed by its own task, with a semaphore bounding how
//! many run at once. A message fails as a whole on its first failed copy; its id is
//! reported in the batch response so the queue redelivers it. Every message, failed or
//! not, is recorded in an audit log written once per invocation. Failing to write the
//! audit log fails the invocation.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::constants::NDJSON_CONTENT_TYPE;
use crate::copy::{get_copy_records, CopyOperation, ObjectUri, UriError};
use crate::filter::ObjectFilter;
use crate::rules::Sets;
use crate::sqs::{AuditRecord, BatchItemFailure, SqsBatchResponse, SqsEvent, SqsMessage};
use crate::storage::{Copier, PutObjectRequest, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("missing invocation context: {0}")]
    MissingContext(String),
    #[error("invocation cancelled")]
    Cancelled,
    #[error("failed to encode audit log: {0}")]
    AuditEncode(#[source] serde_json::Error),
    #[error("failed to write audit log {key}: {source}")]
    AuditPut {
        key: String,
        #[source]
        source: StorageError,
    },
    #[error("message results lost: {0}")]
    Results(String),
}

/// Why a single message failed.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid source: {0}")]
    Uri(#[from] UriError),
    #[error("failed to copy {uri}: {source}")]
    Copy {
        uri: String,
        #[source]
        source: StorageError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_id: String,
    pub invoked_function_arn: String,
}

impl InvocationContext {
    /// Account and region of the invoked function.
    fn account_region(&self) -> Result<(&str, &str), HandlerError> {
        if self.request_id.is_empty() {
            return Err(HandlerError::MissingContext("empty request id".to_string()));
        }
        // arn:partition:lambda:region:account:function:name
        let parts: Vec<&str> = self.invoked_function_arn.split(':').collect();
        match parts.as_slice() {
            ["arn", _, _, region, account, ..] if !region.is_empty() && !account.is_empty() => {
                Ok((*account, *region))
            }
            _ => Err(HandlerError::MissingContext(format!(
                "invalid function arn {:?}",
                self.invoked_function_arn
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub destination: ObjectUri,
    pub filter: ObjectFilter,
    pub sets: Sets,
    /// Objects larger than this are skipped, 0 disables the limit.
    pub max_file_size: u64,
    /// Messages processed concurrently, 0 for the available parallelism.
    pub max_concurrent_tasks: usize,
}

#[derive(Clone)]
pub struct Handler {
    inner: Arc<Inner>,
}

struct Inner {
    destination: ObjectUri,
    filter: ObjectFilter,
    sets: Sets,
    max_file_size: u64,
    semaphore: Arc<Semaphore>,
    copier: Arc<dyn Copier>,
}

impl Handler {
    pub fn new(config: HandlerConfig, copier: Arc<dyn Copier>) -> Self {
        let permits = match config.max_concurrent_tasks {
            0 => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            permits => permits,
        };
        debug!("processing up to {permits} messages concurrently");
        Handler {
            inner: Arc::new(Inner {
                destination: config.destination,
                filter: config.filter,
                sets: config.sets,
                max_file_size: config.max_file_size,
                semaphore: Arc::new(Semaphore::new(permits)),
                copier,
            }),
        }
    }

    pub async fn handle(
        &self,
        cancel: &CancellationToken,
        context: &InvocationContext,
        event: SqsEvent,
    ) -> Result<SqsBatchResponse, HandlerError> {
        self.handle_at(cancel, context, event, Utc::now()).await
    }

    /// Same as [`Handler::handle`], with `now` deciding the audit log key.
    pub async fn handle_at(
        &self,
        cancel: &CancellationToken,
        context: &InvocationContext,
        event: SqsEvent,
        now: DateTime<Utc>,
    ) -> Result<SqsBatchResponse, HandlerError> {
        let (account, region) = context.account_region()?;
        let messages = Arc::new(event.records);
        let results = self.dispatch(cancel, &messages).await?;

        let mut failures = Vec::new();
        let mut audit = Vec::new();
        for (message, result) in messages.iter().zip(&results) {
            if let Some(err) = result {
                failures.push(BatchItemFailure {
                    item_identifier: message.message_id.clone(),
                });
                error!("message {} failed: {err}", message.message_id);
            }
            serde_json::to_writer(
                &mut audit,
                &AuditRecord {
                    message,
                    error: result.as_deref(),
                },
            )
            .map_err(HandlerError::AuditEncode)?;
            audit.push(b'\n');
        }

        if !messages.is_empty() {
            let key = self.audit_key(account, region, &context.request_id, now);
            let request = PutObjectRequest {
                bucket: self.inner.destination.bucket.clone(),
                key: key.clone(),
                body: Bytes::from(audit),
                content_type: Some(NDJSON_CONTENT_TYPE.to_string()),
            };
            self.inner
                .copier
                .put_object(cancel, request)
                .await
                .map_err(|source| HandlerError::AuditPut { key, source })?;
        }

        info!(
            "processed {} messages, {} failed",
            messages.len(),
            failures.len()
        );
        Ok(SqsBatchResponse {
            batch_item_failures: failures,
        })
    }

    /// Runs one task per message and collects their outcome in message order. `None`
    /// marks a successful message.
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        messages: &Arc<Vec<SqsMessage>>,
    ) -> Result<Vec<Option<String>>, HandlerError> {
        let total = messages.len();
        let (tx, mut rx) = mpsc::channel(total.max(1));
        for index in 0..total {
            let inner = Arc::clone(&self.inner);
            let messages = Arc::clone(messages);
            let cancel = cancel.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    permit = Arc::clone(&inner.semaphore).acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return;
                };
                let message = &messages[index];
                let result = inner
                    .process(&cancel, message)
                    .await
                    .err()
                    .map(|err| err.to_string());
                // sized to the number of messages, never blocks
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut results = vec![None; total];
        for _ in 0..total {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HandlerError::Cancelled),
                received = rx.recv() => received,
            };
            let Some((index, result)) = received else {
                return Err(HandlerError::Results(format!(
                    "expected {total} results, channel closed early"
                )));
            };
            results[index] = result;
        }
        Ok(results)
    }

    fn audit_key(&self, account: &str, region: &str, request_id: &str, now: DateTime<Utc>) -> String {
        let prefix = self.inner.destination.key.trim_matches('/');
        let key = format!(
            "AWSLogs/{account}/sqs/{region}/{}/{request_id}",
            now.format("%Y/%m/%d/%H")
        );
        if prefix.is_empty() {
            key
        } else {
            format!("{prefix}/{key}")
        }
    }
}

impl Inner {
    /// Copies every object named by `message`, in order, stopping at the first failure.
    async fn process(
        &self,
        cancel: &CancellationToken,
        message: &SqsMessage,
    ) -> Result<(), MessageError> {
        for record in get_copy_records(&message.body) {
            let source = ObjectUri::parse(&record.uri)?;
            let copy_source = source.source();
            if !self.filter.allow(&copy_source) {
                debug!("skipping {copy_source}: not allowed by source filter");
                continue;
            }
            if let Some(size) = record.size {
                if self.max_file_size > 0 && u64::try_from(size).unwrap_or(0) > self.max_file_size {
                    debug!("skipping {copy_source}: size {size} exceeds {}", self.max_file_size);
                    continue;
                }
            }

            let mut op = CopyOperation::new(&self.destination, &source);
            self.sets.apply(&mut op);
            if op.is_skipped() {
                debug!("skipping {copy_source}: destination key cleared by override");
                continue;
            }
            debug!("copying {copy_source} to {}/{}", op.bucket, op.key);
            self.copier
                .copy_object(cancel, op.into_request())
                .await
                .map_err(|source| MessageError::Copy {
                    uri: record.uri.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
