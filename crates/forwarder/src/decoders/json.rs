// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Read;

use serde::de::DeserializeOwned;

use super::{until_error, DecodeError, Decoder, Record};

/// One record per top level JSON value, whitespace separated.
pub(super) fn decoder<R: Read + Send + 'static>(reader: R) -> Decoder {
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<Record>();
    Box::new(until_error(stream.map(|item| item.map_err(DecodeError::from))))
}

/// Decodes every top level value as `T` and expands it into zero or more records.
pub(super) fn flatten<R, T, F>(reader: R, mut expand: F) -> Decoder
where
    R: Read + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    F: FnMut(T) -> Result<Vec<Record>, DecodeError> + Send + 'static,
{
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<T>();
    let records = stream.flat_map(move |item| {
        match item.map_err(DecodeError::from).and_then(&mut expand) {
            Ok(records) => records.into_iter().map(Ok).collect::<Vec<_>>(),
            Err(err) => vec![Err(err)],
        }
    });
    Box::new(until_error(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn decode(input: &str) -> Vec<Result<Record, DecodeError>> {
        decoder(Cursor::new(input.as_bytes().to_vec())).collect()
    }

    #[test]
    fn test_ndjson() {
        let records: Vec<Record> = decode("{\"a\":1}\n{\"b\":[true]}\n\n")
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records, vec![json!({"a": 1}), json!({"b": [true]})]);
    }

    #[test]
    fn test_concatenated_values() {
        let records = decode(r#"{"a":1}{"a":2} 3 "four""#);
        assert_eq!(records.len(), 4);
        assert_eq!(records[3].as_ref().unwrap(), &json!("four"));
    }

    #[test]
    fn test_empty_input() {
        assert!(decode("").is_empty());
        assert!(decode("  \n").is_empty());
    }

    #[test]
    fn test_stops_after_first_error() {
        let records = decode("{\"a\":1}\n{oops}\n{\"b\":2}\n");
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_flatten() {
        let decoder = flatten(
            Cursor::new(b"[1,2] [] [3]".to_vec()),
            |values: Vec<i64>| Ok(values.into_iter().map(Record::from).collect()),
        );
        let records: Vec<Record> = decoder.collect::<Result<_, _>>().unwrap();
        assert_eq!(records, vec![json!(1), json!(2), json!(3)]);
    }
}
