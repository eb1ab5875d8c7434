// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json::flatten, DecodeError, Decoder, Record};

/// Application load balancer access log fields, in log order.
pub(super) const ELB_ACCESS_LOG_FIELDS: &[&str] = &[
    "type",
    "time",
    "elb",
    "client:port",
    "target:port",
    "request_processing_time",
    "target_processing_time",
    "response_processing_time",
    "elb_status_code",
    "target_status_code",
    "received_bytes",
    "sent_bytes",
    "request",
    "user_agent",
    "ssl_cipher",
    "ssl_protocol",
    "target_group_arn",
    "trace_id",
    "domain_name",
    "chosen_cert_arn",
    "matched_rule_priority",
    "request_creation_time",
    "actions_executed",
    "redirect_url",
    "error_reason",
    "target:port_list",
    "target_status_code_list",
    "classification",
    "classification_reason",
    "conn_trace_id",
];

/// AWS Config configuration item. Only these fields are forwarded, anything else in
/// the source document is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_item_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_item_capture_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_item_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_state_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_state_md5_hash: Option<String>,
    #[serde(rename = "awsAccountId", skip_serializing_if = "Option::is_none")]
    pub aws_account_id: Option<String>,
    #[serde(rename = "awsRegion", skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,
    #[serde(rename = "ARN", skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_creation_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_events: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationships: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplementary_configuration: Option<Value>,
}

impl ConfigurationItem {
    fn into_record(self) -> Result<Record, DecodeError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Snapshot and history files delivered by AWS Config.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationFile {
    #[serde(default)]
    configuration_items: Vec<ConfigurationItem>,
}

#[derive(Debug, Deserialize)]
struct CloudTrailFile {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

pub(super) fn config_decoder<R: Read + Send + 'static>(reader: R) -> Decoder {
    flatten(reader, |file: ConfigurationFile| {
        file.configuration_items
            .into_iter()
            .map(ConfigurationItem::into_record)
            .collect()
    })
}

pub(super) fn change_decoder<R: Read + Send + 'static>(reader: R) -> Decoder {
    flatten(reader, |item: ConfigurationItem| Ok(vec![item.into_record()?]))
}

pub(super) fn cloudtrail_decoder<R: Read + Send + 'static>(reader: R) -> Decoder {
    flatten(reader, |file: CloudTrailFile| Ok(file.records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn decode(decoder: Decoder) -> Vec<Record> {
        decoder.collect::<Result<_, _>>().unwrap()
    }

    fn reader(value: Value) -> Cursor<Vec<u8>> {
        Cursor::new(value.to_string().into_bytes())
    }

    #[test]
    fn test_config_snapshot() {
        let snapshot = json!({
            "fileVersion": "1.0",
            "configSnapshotId": "abc",
            "configurationItems": [
                {
                    "resourceType": "AWS::S3::Bucket",
                    "resourceId": "my-bucket",
                    "awsAccountId": "123456789012",
                    "ARN": "arn:aws:s3:::my-bucket",
                    "tags": {"team": "obs"},
                    "configuration": {"name": "my-bucket"},
                    "internalOnly": "dropped"
                },
                {"resourceType": "AWS::EC2::VPC", "configurationStateId": 1700000000000_i64}
            ]
        });
        let records = decode(config_decoder(reader(snapshot)));
        assert_eq!(
            records,
            vec![
                json!({
                    "resourceType": "AWS::S3::Bucket",
                    "resourceId": "my-bucket",
                    "awsAccountId": "123456789012",
                    "ARN": "arn:aws:s3:::my-bucket",
                    "tags": {"team": "obs"},
                    "configuration": {"name": "my-bucket"}
                }),
                json!({"resourceType": "AWS::EC2::VPC", "configurationStateId": 1700000000000_i64}),
            ]
        );
    }

    #[test]
    fn test_change() {
        let input = "{\"resourceType\":\"AWS::IAM::Role\",\"extra\":true}\n{\"awsRegion\":\"us-east-1\"}\n";
        let records = decode(change_decoder(Cursor::new(input.as_bytes().to_vec())));
        assert_eq!(
            records,
            vec![
                json!({"resourceType": "AWS::IAM::Role"}),
                json!({"awsRegion": "us-east-1"}),
            ]
        );
    }

    #[test]
    fn test_cloudtrail_keeps_records_untouched() {
        let trail = json!({
            "Records": [
                {"eventName": "PutObject", "requestParameters": {"bucketName": "b"}},
                {"eventName": "GetObject", "anything": [1, 2]}
            ]
        });
        let records = decode(cloudtrail_decoder(reader(trail)));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], json!({"eventName": "GetObject", "anything": [1, 2]}));
    }
}
