// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Content-type and content-encoding override rules.
//!
//! A [`Rule`] matches a pending [`CopyOperation`](crate::copy::CopyOperation) on its
//! source, content type and content encoding, and rewrites the delivery metadata when
//! it matches. Rules are grouped into a [`Set`], evaluated in order with the first
//! matching rule winning unless it is marked `continue`. [`Sets`] are mutually
//! exclusive alternatives: the first set that modifies the operation ends evaluation.
//!
//! # Rule documents
//!
//! ```yaml
//! - id: gzip
//!   match:
//!     source: '\.gz$'
//!     content-encoding: '^$'
//!   override:
//!     content-encoding: gzip
//!   continue: true
//! - id: json
//!   match:
//!     source: '\.json(\.gz)?$'
//!   override:
//!     content-type: application/x-ndjson
//! ```
//!
//! The short text form `<pattern>=<content-type>` is accepted as well, see
//! [`Set::from_text`].

mod presets;
mod rule;
mod set;

pub use presets::PresetLibrary;
pub use rule::{Match, Override, RawMatch, RawOverride, RawRule, Rule};
pub use set::{Set, Sets};

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("{path}: invalid pattern: {source}")]
    InvalidPattern {
        path: String,
        #[source]
        source: regex::Error,
    },
    #[error("{path}: invalid rule id {id:?}")]
    InvalidId { path: String, id: String },
    #[error("{path}: rule does not override anything")]
    EmptyOverride { path: String },
    #[error("{set}: duplicate rule id {id:?}")]
    DuplicateId { set: String, id: String },
    #[error("malformed override {0:?}, expected <pattern>=<content-type>")]
    MalformedText(String),
    #[error("failed to parse rule document: {0}")]
    Document(#[from] serde_yaml::Error),
    #[error("preset {0:?} not found")]
    PresetNotFound(String),
}
