// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Object storage capabilities used by the forwarder.
//!
//! The handler only needs to copy and put objects, and the HTTP shim only needs to
//! get them. Concrete clients live outside this crate.

use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::batch::BatchError;
use crate::decoders::DecodeError;

/// Whether a copy keeps the source metadata or replaces it with the request's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataDirective {
    Copy,
    Replace,
}

impl MetadataDirective {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataDirective::Copy => "COPY",
            MetadataDirective::Replace => "REPLACE",
        }
    }
}

/// Customer provided encryption key headers, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseCustomerKey {
    pub algorithm: Option<String>,
    pub key: Option<String>,
    pub key_md5: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CopyObjectRequest {
    pub bucket: String,
    pub key: String,
    /// `bucket/key` of the object being copied.
    pub copy_source: String,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub metadata_directive: Option<MetadataDirective>,
    pub copy_source_if_match: Option<String>,
    pub copy_source_if_none_match: Option<String>,
    pub copy_source_if_modified_since: Option<SystemTime>,
    pub copy_source_if_unmodified_since: Option<SystemTime>,
    pub copy_source_sse_customer_key: SseCustomerKey,
}

#[derive(Debug, Clone, Default)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<SystemTime>,
    pub if_unmodified_since: Option<SystemTime>,
    pub sse_customer_key: SseCustomerKey,
}

#[derive(Debug, Clone, Default)]
pub struct GetObjectOutput {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_length: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("failed to decode object: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("storage request failed: {0}")]
    Backend(String),
}

impl StorageError {
    /// Invalid requests will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StorageError::InvalidRequest(_))
    }
}

#[async_trait]
pub trait Copier: Send + Sync {
    async fn copy_object(
        &self,
        cancel: &CancellationToken,
        request: CopyObjectRequest,
    ) -> Result<(), StorageError>;

    async fn put_object(
        &self,
        cancel: &CancellationToken,
        request: PutObjectRequest,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait Getter: Send + Sync {
    async fn get_object(
        &self,
        cancel: &CancellationToken,
        request: GetObjectRequest,
    ) -> Result<GetObjectOutput, StorageError>;
}

impl From<&CopyObjectRequest> for GetObjectRequest {
    /// Maps the copy source and its conditions onto a read of the source object.
    /// Callers validate that the copy source has a `bucket/key` shape first.
    fn from(request: &CopyObjectRequest) -> Self {
        let (bucket, key) = request
            .copy_source
            .split_once('/')
            .unwrap_or((request.copy_source.as_str(), ""));
        GetObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            if_match: request.copy_source_if_match.clone(),
            if_none_match: request.copy_source_if_none_match.clone(),
            if_modified_since: request.copy_source_if_modified_since,
            if_unmodified_since: request.copy_source_if_unmodified_since,
            sse_customer_key: request.copy_source_sse_customer_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_get_request_from_copy() {
        let since = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let copy = CopyObjectRequest {
            bucket: "dest".to_string(),
            key: "prefix/a/b.json".to_string(),
            copy_source: "src/a/b.json".to_string(),
            copy_source_if_match: Some("\"etag\"".to_string()),
            copy_source_if_unmodified_since: Some(since),
            copy_source_sse_customer_key: SseCustomerKey {
                algorithm: Some("AES256".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let get = GetObjectRequest::from(&copy);
        assert_eq!(get.bucket, "src");
        assert_eq!(get.key, "a/b.json");
        assert_eq!(get.if_match.as_deref(), Some("\"etag\""));
        assert_eq!(get.if_none_match, None);
        assert_eq!(get.if_unmodified_since, Some(since));
        assert_eq!(get.sse_customer_key.algorithm.as_deref(), Some("AES256"));
    }

    #[test]
    fn test_retryable() {
        assert!(!StorageError::InvalidRequest("missing bucket".to_string()).is_retryable());
        assert!(StorageError::Backend("throttled".to_string()).is_retryable());
    }
}
