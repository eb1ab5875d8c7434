// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use chrono::{DateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use forwarder::handler::InvocationContext;
use forwarder::sqs::SqsMessage;
use serde_json::json;
use std::io::Write;

pub fn context() -> InvocationContext {
    InvocationContext {
        request_id: "0a7f3b52-1d3c-4c8e-9d0e-000000000001".to_string(),
        invoked_function_arn: "arn:aws:lambda:us-east-1:123456789012:function:forwarder"
            .to_string(),
    }
}

/// Fixed invocation time, so audit keys are predictable.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 0).unwrap()
}

pub fn audit_key(prefix: &str) -> String {
    format!(
        "{prefix}/AWSLogs/123456789012/sqs/us-east-1/2024/05/01/13/{}",
        context().request_id
    )
}

pub fn message(id: &str, body: String) -> SqsMessage {
    SqsMessage {
        message_id: id.to_string(),
        body,
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn copy_body(uris: &[&str]) -> String {
    let copy: Vec<_> = uris.iter().map(|uri| json!({ "uri": uri })).collect();
    json!({ "copy": copy }).to_string()
}

#[allow(dead_code)]
pub fn s3_event_body(event_name: &str, bucket: &str, key: &str, size: i64) -> String {
    json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "us-east-1",
            "eventName": event_name,
            "s3": {
                "s3SchemaVersion": "1.0",
                "bucket": { "name": bucket, "arn": format!("arn:aws:s3:::{bucket}") },
                "object": { "key": key, "size": size, "eTag": "0123456789abcdef" }
            }
        }]
    })
    .to_string()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
