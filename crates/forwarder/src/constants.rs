// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Records whose serialized form is larger than this are dropped by the batch runner.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 4_000_000;

/// Upper bound of a single delivered batch, delimiters included.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000_000;

/// Number of consumers draining the batch queue.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Separator appended after every record in a batch.
pub const RECORD_DELIMITER: u8 = b'\n';

/// Media type of every batch body sent over HTTP.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Subject carried by SNS envelopes wrapping storage notifications.
pub const SNS_S3_NOTIFICATION_SUBJECT: &str = "Amazon S3 Notification";

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETRY_MIN_WAIT_MS: u64 = 100;
pub const DEFAULT_RETRY_MAX_WAIT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;

/// Presets applied when none are configured.
pub const DEFAULT_PRESETS: &[&str] = &["aws/v1", "infer/v1"];
