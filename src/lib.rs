use lambda_runtime::{Error, LambdaEvent};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::{Combined, Response};
use crate::notify::DynNotifier;
use crate::query::DynQueryService;

pub mod clients;
pub mod config;
pub mod events;
pub mod gate;
pub mod notify;
pub mod query;
pub mod shadow;
pub mod transform;

pub use clients::AwsClients;

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();
}

// lambda handler
pub async fn function_handler(
    notifier: DynNotifier,
    query_service: DynQueryService,
    config: &Config,
    evt: LambdaEvent<Combined>,
) -> Result<Response, Error> {
    info!("Handling lambda invocation");
    debug!("Handling event payload: {:?}", evt.payload);

    match evt.payload {
        Combined::Kinesis(kinesis_event) => {
            info!("KINESIS EVENT Detected");
            let response = notify::stream_notifications(notifier, config, kinesis_event).await;
            Ok(Response::Api(response))
        }
        Combined::Firehose(firehose_event) => {
            info!("FIREHOSE EVENT Detected");
            Ok(Response::Firehose(transform::shadow_records(firehose_event)))
        }
        Combined::Query(request) => {
            info!("READING QUERY Detected");
            let response = query::device_readings(query_service, config, request).await;
            Ok(Response::Api(response))
        }
    }
}
