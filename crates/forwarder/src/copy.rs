// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Copy records extracted from inbound notifications, and the copy operations built
//! from them.

use serde::Deserialize;
use serde_json::Value;

use crate::constants::SNS_S3_NOTIFICATION_SUBJECT;
use crate::storage::{CopyObjectRequest, MetadataDirective};

/// An object to forward.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CopyRecord {
    pub uri: String,
    #[serde(default)]
    pub size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SnsNotification {
    #[serde(rename = "Subject", default)]
    subject: String,
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records", default)]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    event_name: String,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
    #[serde(default)]
    size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CopyInstructions {
    #[serde(default)]
    copy: Vec<CopyRecord>,
}

/// Extracts copy records from a notification body. SNS wrapped S3 notifications,
/// native S3 event notifications and explicit `{"copy": [...]}` lists are tried in
/// that order; the first one yielding records wins. Unrecognized bodies yield nothing.
pub fn get_copy_records(body: &str) -> Vec<CopyRecord> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };
    records_from_value(value)
}

fn records_from_value(value: Value) -> Vec<CopyRecord> {
    if let Ok(sns) = SnsNotification::deserialize(&value) {
        if sns.subject == SNS_S3_NOTIFICATION_SUBJECT {
            let records = get_copy_records(&sns.message);
            if !records.is_empty() {
                return records;
            }
        }
    }

    if let Ok(event) = S3Event::deserialize(&value) {
        let records: Vec<CopyRecord> = event
            .records
            .into_iter()
            .filter(|record| record.event_name.starts_with("ObjectCreated"))
            .map(|record| CopyRecord {
                uri: format!(
                    "s3://{}/{}",
                    record.s3.bucket.name,
                    decode_event_key(&record.s3.object.key)
                ),
                size: record.s3.object.size,
            })
            .collect();
        if !records.is_empty() {
            return records;
        }
    }

    CopyInstructions::deserialize(&value)
        .map(|instructions| instructions.copy)
        .unwrap_or_default()
}

/// Keys in S3 event notifications are form encoded.
fn decode_event_key(key: &str) -> String {
    let spaced = key.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UriError {
    #[error("{0:?} has no scheme")]
    MissingScheme(String),
    #[error("{0:?} has no bucket")]
    MissingBucket(String),
}

/// `scheme://bucket/key`. Keys are kept byte for byte, no path normalisation is
/// applied, and any query string is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUri {
    pub scheme: String,
    pub bucket: String,
    pub key: String,
}

impl ObjectUri {
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let (scheme, rest) = uri
            .split_once("://")
            .filter(|(scheme, _)| !scheme.is_empty())
            .ok_or_else(|| UriError::MissingScheme(uri.to_string()))?;
        let rest = rest.split_once('?').map_or(rest, |(path, _)| path);
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(UriError::MissingBucket(uri.to_string()));
        }
        Ok(ObjectUri {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// `bucket/key`, as used for copy sources and filtering.
    pub fn source(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}

/// A pending copy of one object into the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyOperation {
    pub bucket: String,
    pub copy_source: String,
    /// Destination key. Empty means the object must not be copied.
    pub key: String,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub metadata_directive: Option<MetadataDirective>,
}

impl CopyOperation {
    /// Builds the copy of `source` under `destination`, keeping the source key below
    /// the destination prefix.
    pub fn new(destination: &ObjectUri, source: &ObjectUri) -> Self {
        let key = format!("{}/{}", destination.key, source.key)
            .trim_start_matches('/')
            .to_string();
        CopyOperation {
            bucket: destination.bucket.clone(),
            copy_source: source.source(),
            key,
            ..Default::default()
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.key.is_empty()
    }

    pub fn into_request(self) -> CopyObjectRequest {
        CopyObjectRequest {
            bucket: self.bucket,
            key: self.key,
            copy_source: self.copy_source,
            content_type: self.content_type,
            content_encoding: self.content_encoding,
            metadata_directive: self.metadata_directive,
            ..Default::default()
        }
    }
}
