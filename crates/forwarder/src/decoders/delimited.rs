// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Read;

use csv::{ReaderBuilder, StringRecord};
use serde_json::{Map, Value};

use super::{error_decoder, until_error, DecodeError, Decoder, Record};

/// Delimited text. The first row names the fields, empty cells are left out of the
/// record. A missing header is an error even for an otherwise empty object.
pub(super) fn decoder<R: Read + Send + 'static>(reader: R, delimiter: u8) -> Decoder {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);
    let headers = match reader.headers() {
        Ok(headers) if !headers.is_empty() => headers.clone(),
        Ok(_) => return error_decoder(DecodeError::MissingHeader),
        Err(err) => return error_decoder(err.into()),
    };
    let records = reader.into_records().map(move |row| {
        row.map(|row| to_record(headers.iter(), &row))
            .map_err(DecodeError::from)
    });
    Box::new(until_error(records))
}

/// Delimited text without a header row, fields named by position. Rows may be shorter
/// or longer than `names`; unnamed trailing cells are left out.
pub(super) fn positional_decoder<R: Read + Send + 'static>(
    reader: R,
    delimiter: u8,
    names: &'static [&'static str],
) -> Decoder {
    let reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let records = reader.into_records().map(move |row| {
        row.map(|row| to_record(names.iter().copied(), &row))
            .map_err(DecodeError::from)
    });
    Box::new(until_error(records))
}

fn to_record<'a>(names: impl Iterator<Item = &'a str>, row: &StringRecord) -> Record {
    let fields: Map<String, Value> = names
        .zip(row.iter())
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();
    Value::Object(fields)
}
