// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Forwarder
//!
//! Data-plane of an object forwarding pipeline. Notifications about new objects in
//! object storage are turned into copy operations, filtered, rewritten by override
//! rules and relayed either through a native storage copy or by decoding the object
//! and streaming its records to an HTTP endpoint in size-bounded batches.
//!
//! ## Layout
//!
//! - [`copy`]: notification parsing, object URIs and copy operations
//! - [`filter`]: bucket/key glob allow-list
//! - [`rules`]: content-type and content-encoding override rules and presets
//! - [`decoders`]: format decoders turning objects into JSON records
//! - [`batch`]: size-bounded batch queue and the producer/consumer runner
//! - [`http`]: HTTP delivery of batches with compression and retries
//! - [`shim`]: storage "copy" emulated as get, decode, batch and POST
//! - [`handler`]: SQS batch handler dispatching copies and writing the audit log
//! - [`storage`]: object storage capabilities implemented outside the crate
//! - [`config`]: environment configuration

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod constants;
pub mod copy;
pub mod decoders;
pub mod filter;
pub mod handler;
pub mod http;
pub mod rules;
pub mod shim;
pub mod sqs;
pub mod storage;
