// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! S3 backed storage.

use std::future::Future;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types;
use aws_sdk_s3::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use forwarder::storage::{
    Copier, CopyObjectRequest, GetObjectOutput, GetObjectRequest, Getter, MetadataDirective,
    PutObjectRequest, StorageError,
};

#[derive(Debug, Clone)]
pub struct S3 {
    client: Client,
}

impl S3 {
    pub fn new(client: Client) -> Self {
        S3 { client }
    }
}

/// Copy sources are url encoded, path separators excepted.
fn encode_copy_source(copy_source: &str) -> String {
    urlencoding::encode(copy_source).replace("%2F", "/")
}

fn backend_error<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Backend(DisplayErrorContext(err).to_string())
}

async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StorageError::Cancelled),
        result = future => result,
    }
}

#[async_trait]
impl Copier for S3 {
    async fn copy_object(
        &self,
        cancel: &CancellationToken,
        request: CopyObjectRequest,
    ) -> Result<(), StorageError> {
        let directive = request.metadata_directive.map(|directive| match directive {
            MetadataDirective::Copy => types::MetadataDirective::Copy,
            MetadataDirective::Replace => types::MetadataDirective::Replace,
        });
        let sse = request.copy_source_sse_customer_key;
        let send = self
            .client
            .copy_object()
            .bucket(request.bucket)
            .key(request.key)
            .copy_source(encode_copy_source(&request.copy_source))
            .set_content_type(request.content_type)
            .set_content_encoding(request.content_encoding)
            .set_metadata_directive(directive)
            .set_copy_source_if_match(request.copy_source_if_match)
            .set_copy_source_if_none_match(request.copy_source_if_none_match)
            .set_copy_source_if_modified_since(
                request.copy_source_if_modified_since.map(DateTime::from),
            )
            .set_copy_source_if_unmodified_since(
                request.copy_source_if_unmodified_since.map(DateTime::from),
            )
            .set_copy_source_sse_customer_algorithm(sse.algorithm)
            .set_copy_source_sse_customer_key(sse.key)
            .set_copy_source_sse_customer_key_md5(sse.key_md5)
            .send();
        cancellable(cancel, async move { send.await.map(|_| ()).map_err(backend_error) }).await
    }

    async fn put_object(
        &self,
        cancel: &CancellationToken,
        request: PutObjectRequest,
    ) -> Result<(), StorageError> {
        debug!("writing s3://{}/{}", request.bucket, request.key);
        let send = self
            .client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .body(ByteStream::from(request.body))
            .set_content_type(request.content_type)
            .send();
        cancellable(cancel, async move { send.await.map(|_| ()).map_err(backend_error) }).await
    }
}

#[async_trait]
impl Getter for S3 {
    async fn get_object(
        &self,
        cancel: &CancellationToken,
        request: GetObjectRequest,
    ) -> Result<GetObjectOutput, StorageError> {
        let sse = request.sse_customer_key;
        let send = self
            .client
            .get_object()
            .bucket(request.bucket)
            .key(request.key)
            .set_if_match(request.if_match)
            .set_if_none_match(request.if_none_match)
            .set_if_modified_since(request.if_modified_since.map(DateTime::from))
            .set_if_unmodified_since(request.if_unmodified_since.map(DateTime::from))
            .set_sse_customer_algorithm(sse.algorithm)
            .set_sse_customer_key(sse.key)
            .set_sse_customer_key_md5(sse.key_md5)
            .send();
        cancellable(cancel, async move {
            let output = send.await.map_err(backend_error)?;
            let content_type = output.content_type().map(str::to_string);
            let content_encoding = output.content_encoding().map(str::to_string);
            let content_length = output.content_length();
            let body = output
                .body
                .collect()
                .await
                .map_err(|err| StorageError::Backend(format!("failed to read body: {err}")))?
                .into_bytes();
            Ok(GetObjectOutput {
                body,
                content_type,
                content_encoding,
                content_length,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_copy_source() {
        assert_eq!(encode_copy_source("bucket/a/b.json"), "bucket/a/b.json");
        assert_eq!(
            encode_copy_source("bucket/logs/my file+1.json"),
            "bucket/logs/my%20file%2B1.json"
        );
    }

    #[tokio::test]
    async fn test_cancellable() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cancellable(&cancel, std::future::pending::<Result<(), StorageError>>()).await;
        assert!(matches!(result, Err(StorageError::Cancelled)));
    }
}
