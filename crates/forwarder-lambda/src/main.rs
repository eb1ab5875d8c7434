// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aws_config::BehaviorVersion;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use forwarder::batch::Runner;
use forwarder::config::Config;
use forwarder::handler::{Handler, InvocationContext};
use forwarder::http::Client;
use forwarder::shim::Shim;
use forwarder::sqs::{SqsBatchResponse, SqsEvent};
use forwarder::storage::Copier;

mod s3;

/// Time reserved to write the audit log and return before the function times out.
const DEADLINE_MARGIN: Duration = Duration::from_secs(1);

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    let log_level = env::var("LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,aws_config=off,aws_smithy_runtime=off,aws_sdk_s3=off,{log_level}"
    );

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter)?)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error reading forwarder configuration: {e}");
            return Err(e.into());
        }
    };

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3 = Arc::new(s3::S3::new(aws_sdk_s3::Client::new(&aws_config)));
    let copier: Arc<dyn Copier> = match &config.http {
        Some(http) => {
            info!("Forwarding objects to {}", http.endpoint);
            Arc::new(Shim::new(
                s3,
                Client::new(http.clone())?,
                Runner::new(config.runner),
            ))
        }
        None => {
            info!("Copying objects to s3://{}", config.destination.bucket);
            s3
        }
    };
    let handler = Handler::new(config.handler_config(), copier);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<SqsEvent>| {
        let handler = handler.clone();
        async move { invoke(&handler, event).await }
    }))
    .await
}

async fn invoke(
    handler: &Handler,
    event: LambdaEvent<SqsEvent>,
) -> Result<SqsBatchResponse, Error> {
    let context = InvocationContext {
        request_id: event.context.request_id,
        invoked_function_arn: event.context.invoked_function_arn,
    };

    let cancel = CancellationToken::new();
    let remaining = time_remaining(event.context.deadline, SystemTime::now());
    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            warn!("Invocation deadline approaching, cancelling pending work");
            cancel.cancel();
        })
    };

    let result = handler.handle(&cancel, &context, event.payload).await;
    timer.abort();
    Ok(result?)
}

/// Time left before cancelling, given the invocation deadline in milliseconds since
/// the epoch.
fn time_remaining(deadline_ms: u64, now: SystemTime) -> Duration {
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    deadline
        .duration_since(now)
        .unwrap_or_default()
        .saturating_sub(DEADLINE_MARGIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_remaining() {
        let now = UNIX_EPOCH + Duration::from_secs(1_714_571_100);
        assert_eq!(
            time_remaining(1_714_571_100_000 + 30_000, now),
            Duration::from_secs(29)
        );
        assert_eq!(time_remaining(1_714_571_100_500, now), Duration::ZERO);
        assert_eq!(time_remaining(1_000, now), Duration::ZERO);
    }
}
