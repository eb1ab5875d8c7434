// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory object storage standing in for S3

use async_trait::async_trait;
use bytes::Bytes;
use forwarder::storage::{
    Copier, CopyObjectRequest, GetObjectOutput, GetObjectRequest, Getter, MetadataDirective,
    PutObjectRequest, StorageError,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

/// Objects keyed by `bucket/key`. Copies of sources listed in `fail_sources` and every
/// put while `fail_puts` is set return a backend error.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_sources: Mutex<HashSet<String>>,
    fail_puts: Mutex<bool>,
    copies: Mutex<Vec<CopyObjectRequest>>,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn insert(&self, source: &str, object: StoredObject) {
        self.objects
            .lock()
            .unwrap()
            .insert(source.to_string(), object);
    }

    pub fn object(&self, source: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(source).cloned()
    }

    /// Stored `bucket/key` names starting with `prefix`.
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn fail_copies_from(&self, source: &str) {
        self.fail_sources.lock().unwrap().insert(source.to_string());
    }

    pub fn fail_puts(&self) {
        *self.fail_puts.lock().unwrap() = true;
    }

    pub fn copies(&self) -> Vec<CopyObjectRequest> {
        self.copies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Getter for MemoryStore {
    async fn get_object(
        &self,
        _cancel: &CancellationToken,
        request: GetObjectRequest,
    ) -> Result<GetObjectOutput, StorageError> {
        let source = format!("{}/{}", request.bucket, request.key);
        let object = self
            .object(&source)
            .ok_or_else(|| StorageError::Backend(format!("NoSuchKey: {source}")))?;
        Ok(GetObjectOutput {
            content_length: Some(object.body.len() as i64),
            body: object.body,
            content_type: object.content_type,
            content_encoding: object.content_encoding,
        })
    }
}

#[async_trait]
impl Copier for MemoryStore {
    async fn copy_object(
        &self,
        _cancel: &CancellationToken,
        request: CopyObjectRequest,
    ) -> Result<(), StorageError> {
        self.copies.lock().unwrap().push(request.clone());
        if self.fail_sources.lock().unwrap().contains(&request.copy_source) {
            return Err(StorageError::Backend("AccessDenied".to_string()));
        }
        let source = self
            .object(&request.copy_source)
            .ok_or_else(|| StorageError::Backend(format!("NoSuchKey: {}", request.copy_source)))?;
        let copied = match request.metadata_directive {
            Some(MetadataDirective::Replace) => StoredObject {
                body: source.body,
                content_type: request.content_type,
                content_encoding: request.content_encoding,
            },
            _ => source,
        };
        self.insert(&format!("{}/{}", request.bucket, request.key), copied);
        Ok(())
    }

    async fn put_object(
        &self,
        _cancel: &CancellationToken,
        request: PutObjectRequest,
    ) -> Result<(), StorageError> {
        if *self.fail_puts.lock().unwrap() {
            return Err(StorageError::Backend("SlowDown".to_string()));
        }
        self.insert(
            &format!("{}/{}", request.bucket, request.key),
            StoredObject {
                body: request.body,
                content_type: request.content_type,
                content_encoding: None,
            },
        );
        Ok(())
    }
}
