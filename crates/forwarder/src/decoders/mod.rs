// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record decoders.
//!
//! A [`Decoder`] turns an object body into a stream of JSON records. Which decoder
//! applies is decided once per object from its content encoding and content type, see
//! [`resolve`]. Decoders are single pass and never restart: the first error ends the
//! stream.

use std::io::{BufReader, Read};
use std::iter;

use flate2::read::MultiGzDecoder;
use mime::Mime;

mod aws;
mod cloudwatchlogs;
mod delimited;
mod json;

pub use aws::ConfigurationItem;

pub type Record = serde_json::Value;

/// Forward only record cursor. `None` is the end of the stream.
pub type Decoder = Box<dyn Iterator<Item = Result<Record, DecodeError>> + Send>;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported content encoding {0:?}")]
    UnsupportedEncoding(String),
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(String),
    #[error("unsupported delimiter {0:?}")]
    UnsupportedDelimiter(String),
    #[error("missing header row")]
    MissingHeader,
    #[error("failed to read object: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to decode csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
}

impl Encoding {
    pub fn parse(content_encoding: Option<&str>) -> Result<Self, DecodeError> {
        match content_encoding.map(str::trim).unwrap_or_default() {
            "" | "identity" => Ok(Encoding::Identity),
            "gzip" | "x-gzip" => Ok(Encoding::Gzip),
            other => Err(DecodeError::UnsupportedEncoding(other.to_string())),
        }
    }

    fn wrap<R: Read + Send + 'static>(self, reader: R) -> Box<dyn Read + Send> {
        match self {
            Encoding::Identity => Box::new(reader),
            // concatenated members are common for appended log files
            Encoding::Gzip => Box::new(MultiGzDecoder::new(reader)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One record per top level JSON value. Covers JSON documents and NDJSON.
    Json,
    /// Delimited text with a header row.
    Delimited { delimiter: u8 },
    /// Space separated load balancer access log lines without a header row.
    ElbAccessLog,
    CloudWatchLogs,
    Config,
    Change,
    CloudTrail,
}

impl Format {
    pub fn parse(content_type: Option<&str>) -> Result<Self, DecodeError> {
        let content_type = content_type.map(str::trim).unwrap_or_default();
        if content_type.is_empty() {
            return Ok(Format::Json);
        }
        let mime: Mime = content_type
            .parse()
            .map_err(|_| DecodeError::UnsupportedContentType(content_type.to_string()))?;
        match mime.essence_str() {
            "application/json" | "application/x-ndjson" => Ok(Format::Json),
            "text/csv" | "application/x-csv" => Ok(Format::Delimited {
                delimiter: delimiter(&mime)?,
            }),
            "application/x-aws-cloudwatchlogs" => Ok(Format::CloudWatchLogs),
            "application/x-aws-config" => Ok(Format::Config),
            "application/x-aws-change" => Ok(Format::Change),
            "application/x-aws-cloudtrail" => Ok(Format::CloudTrail),
            "application/x-aws-vpcflowlogs" => Ok(Format::Delimited { delimiter: b' ' }),
            "application/x-aws-elasticloadbalancing" => Ok(Format::ElbAccessLog),
            _ => Err(DecodeError::UnsupportedContentType(content_type.to_string())),
        }
    }
}

fn delimiter(mime: &Mime) -> Result<u8, DecodeError> {
    let Some(name) = mime.get_param("delimiter") else {
        return Ok(b',');
    };
    match name.as_str() {
        "comma" => Ok(b','),
        "space" => Ok(b' '),
        "tab" => Ok(b'\t'),
        other => Err(DecodeError::UnsupportedDelimiter(other.to_string())),
    }
}

/// Builds decoders for one (encoding, format) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderFactory {
    pub encoding: Encoding,
    pub format: Format,
}

impl DecoderFactory {
    pub fn decoder<R: Read + Send + 'static>(&self, reader: R) -> Decoder {
        let reader = BufReader::new(self.encoding.wrap(reader));
        match self.format {
            Format::Json => json::decoder(reader),
            Format::Delimited { delimiter } => delimited::decoder(reader, delimiter),
            Format::ElbAccessLog => {
                delimited::positional_decoder(reader, b' ', aws::ELB_ACCESS_LOG_FIELDS)
            }
            Format::CloudWatchLogs => cloudwatchlogs::decoder(reader),
            Format::Config => aws::config_decoder(reader),
            Format::Change => aws::change_decoder(reader),
            Format::CloudTrail => aws::cloudtrail_decoder(reader),
        }
    }
}

/// Picks the decoder for an object's content encoding and content type.
pub fn resolve(
    content_encoding: Option<&str>,
    content_type: Option<&str>,
) -> Result<DecoderFactory, DecodeError> {
    Ok(DecoderFactory {
        encoding: Encoding::parse(content_encoding)?,
        format: Format::parse(content_type)?,
    })
}

/// Decoder yielding `err` and nothing else.
pub fn error_decoder(err: DecodeError) -> Decoder {
    Box::new(iter::once(Err(err)))
}

/// Ends `decoder` right after its first error.
fn until_error<I>(decoder: I) -> impl Iterator<Item = Result<Record, DecodeError>> + Send
where
    I: Iterator<Item = Result<Record, DecodeError>> + Send,
{
    decoder.scan(false, |failed, item| {
        if *failed {
            return None;
        }
        *failed = item.is_err();
        Some(item)
    })
}
