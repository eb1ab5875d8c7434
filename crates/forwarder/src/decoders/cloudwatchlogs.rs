// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Read;

use serde::Deserialize;
use serde_json::json;

use super::{json::flatten, Decoder, Record};

const CONTROL_MESSAGE: &str = "CONTROL_MESSAGE";

/// Payload delivered by a CloudWatch Logs subscription filter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsData {
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    log_group: String,
    #[serde(default)]
    log_stream: String,
    #[serde(default)]
    subscription_filters: Vec<String>,
    #[serde(default)]
    log_events: Vec<LogEvent>,
}

#[derive(Debug, Deserialize)]
struct LogEvent {
    #[serde(default)]
    id: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    message: String,
}

impl LogsData {
    fn into_records(self) -> Vec<Record> {
        if self.message_type == CONTROL_MESSAGE {
            return Vec::new();
        }
        self.log_events
            .into_iter()
            .map(|event| {
                json!({
                    "id": event.id,
                    "timestamp": event.timestamp,
                    "message": event.message,
                    "owner": self.owner,
                    "logGroup": self.log_group,
                    "logStream": self.log_stream,
                    "subscriptionFilters": self.subscription_filters,
                })
            })
            .collect()
    }
}

/// One record per log event, carrying the metadata of its subscription payload.
pub(super) fn decoder<R: Read + Send + 'static>(reader: R) -> Decoder {
    flatten(reader, |data: LogsData| Ok(data.into_records()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_flattens_events() {
        let input = json!({
            "messageType": "DATA_MESSAGE",
            "owner": "123456789012",
            "logGroup": "/aws/lambda/fn",
            "logStream": "2024/01/01/[$LATEST]abc",
            "subscriptionFilters": ["forward"],
            "logEvents": [
                {"id": "1", "timestamp": 1700000000000_i64, "message": "first"},
                {"id": "2", "timestamp": 1700000000001_i64, "message": "second"}
            ]
        });
        let records: Vec<Record> = decoder(Cursor::new(input.to_string().into_bytes()))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1],
            json!({
                "id": "2",
                "timestamp": 1700000000001_i64,
                "message": "second",
                "owner": "123456789012",
                "logGroup": "/aws/lambda/fn",
                "logStream": "2024/01/01/[$LATEST]abc",
                "subscriptionFilters": ["forward"],
            })
        );
    }

    #[test]
    fn test_control_message_yields_nothing() {
        let input = json!({
            "messageType": "CONTROL_MESSAGE",
            "owner": "CloudwatchLogs",
            "logEvents": [{"id": "", "timestamp": 1, "message": "CWL CONTROL MESSAGE: Checking health of destination Firehose."}]
        });
        assert_eq!(decoder(Cursor::new(input.to_string().into_bytes())).count(), 0);
    }

    #[test]
    fn test_invalid_payload() {
        let results: Vec<_> = decoder(Cursor::new(b"{\"logEvents\": 3}".to_vec())).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
