// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Copies into an HTTP destination.
//!
//! [`Shim`] stands in for an object storage client: instead of copying an object it
//! reads it, decodes its records and streams them to the HTTP endpoint in batches.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::batch::Runner;
use crate::constants::NDJSON_CONTENT_TYPE;
use crate::decoders::resolve;
use crate::http::Client;
use crate::storage::{
    Copier, CopyObjectRequest, GetObjectRequest, Getter, MetadataDirective, PutObjectRequest,
    StorageError,
};

pub struct Shim {
    getter: Arc<dyn Getter>,
    client: Client,
    runner: Runner,
}

impl Shim {
    pub fn new(getter: Arc<dyn Getter>, client: Client, runner: Runner) -> Self {
        Shim {
            getter,
            client,
            runner,
        }
    }

    async fn deliver(
        &self,
        cancel: &CancellationToken,
        body: bytes::Bytes,
        content_encoding: Option<&str>,
        content_type: Option<&str>,
        key: &str,
    ) -> Result<(), StorageError> {
        let factory = resolve(content_encoding, content_type)?;
        let sink = self
            .client
            .sink(content_type.unwrap_or_default(), key);
        self.runner
            .run(cancel, factory.decoder(Cursor::new(body)), sink)
            .await?;
        Ok(())
    }
}

fn validate(request: &CopyObjectRequest) -> Result<(), StorageError> {
    if request.bucket.is_empty() {
        return Err(StorageError::InvalidRequest("missing bucket".to_string()));
    }
    if request.key.is_empty() {
        return Err(StorageError::InvalidRequest("missing key".to_string()));
    }
    match request.copy_source.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(()),
        _ => Err(StorageError::InvalidRequest(format!(
            "invalid copy source {:?}",
            request.copy_source
        ))),
    }
}

#[async_trait]
impl Copier for Shim {
    async fn copy_object(
        &self,
        cancel: &CancellationToken,
        request: CopyObjectRequest,
    ) -> Result<(), StorageError> {
        validate(&request)?;
        let object = self
            .getter
            .get_object(cancel, GetObjectRequest::from(&request))
            .await?;
        if object.content_length == Some(0) || object.body.is_empty() {
            debug!("skipping empty object {}", request.copy_source);
            return Ok(());
        }

        // a replaced field overrides the object's, an unset one keeps it
        let (content_type, content_encoding) = match request.metadata_directive {
            Some(MetadataDirective::Replace) => (
                request.content_type.or(object.content_type),
                request.content_encoding.or(object.content_encoding),
            ),
            _ => (object.content_type, object.content_encoding),
        };
        debug!(
            "forwarding {} ({} bytes, content type {content_type:?}, content encoding {content_encoding:?})",
            request.copy_source,
            object.body.len()
        );
        self.deliver(
            cancel,
            object.body,
            content_encoding.as_deref(),
            content_type.as_deref(),
            &request.key,
        )
        .await
    }

    async fn put_object(
        &self,
        cancel: &CancellationToken,
        request: PutObjectRequest,
    ) -> Result<(), StorageError> {
        if request.key.is_empty() {
            return Err(StorageError::InvalidRequest("missing key".to_string()));
        }
        if request.body.is_empty() {
            return Ok(());
        }
        let content_type = request
            .content_type
            .unwrap_or_else(|| NDJSON_CONTENT_TYPE.to_string());
        self.deliver(cancel, request.body, None, Some(&content_type), &request.key)
            .await
    }
}
