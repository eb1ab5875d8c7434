// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! SQS event envelope, partial batch response and audit records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsMessage>,
}

/// One queue message. Fields other than the id and body are carried along untouched
/// so they end up in the audit log.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub body: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// Audit log line: the message as received, plus the error that failed it.
#[derive(Debug, Serialize)]
pub struct AuditRecord<'a> {
    #[serde(flatten)]
    pub message: &'a SqsMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_keeps_unknown_fields() {
        let event: SqsEvent = serde_json::from_value(json!({
            "Records": [{
                "messageId": "059f36b4-87a3-44ab-83d2-661975830a7d",
                "receiptHandle": "AQEBwJnKyrHigUMZj6rYigCgxlaS3SLy0a",
                "body": "{}",
                "eventSource": "aws:sqs",
                "awsRegion": "us-east-2"
            }]
        }))
        .unwrap();
        let message = &event.records[0];
        assert_eq!(message.message_id, "059f36b4-87a3-44ab-83d2-661975830a7d");
        assert_eq!(message.attributes["eventSource"], json!("aws:sqs"));
        assert!(!message.attributes.contains_key("body"));
    }

    #[test]
    fn test_audit_record() {
        let message = SqsMessage {
            message_id: "1".to_string(),
            body: "{}".to_string(),
            attributes: Map::from_iter([("awsRegion".to_string(), json!("us-east-1"))]),
        };
        let ok = serde_json::to_value(AuditRecord {
            message: &message,
            error: None,
        })
        .unwrap();
        assert_eq!(ok, json!({"messageId": "1", "body": "{}", "awsRegion": "us-east-1"}));

        let failed = serde_json::to_value(AuditRecord {
            message: &message,
            error: Some("access denied"),
        })
        .unwrap();
        assert_eq!(failed["error"], json!("access denied"));
    }

    #[test]
    fn test_batch_response() {
        let response = SqsBatchResponse {
            batch_item_failures: vec![BatchItemFailure {
                item_identifier: "1".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"batchItemFailures": [{"itemIdentifier": "1"}]})
        );
    }
}
