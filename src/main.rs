use std::sync::Arc;

use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use thermo_telemetry_pipeline::config::Config;
use thermo_telemetry_pipeline::events::Combined;
use thermo_telemetry_pipeline::notify::{DynNotifier, SnsNotifier};
use thermo_telemetry_pipeline::query::{AthenaQueryService, DynQueryService};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    thermo_telemetry_pipeline::set_up_logging();

    info!(
        "Initializing {} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let aws_config = aws_config::load_defaults(BehaviorVersion::v2023_11_09()).await;
    let clients = thermo_telemetry_pipeline::AwsClients::new(&aws_config);
    let config = Config::load_from_env()?;

    let notifier: DynNotifier = Arc::new(SnsNotifier::new(
        clients.sns.clone(),
        config.topic_arn.clone(),
    ));
    let query_service: DynQueryService =
        Arc::new(AthenaQueryService::new(clients.athena.clone(), &config));

    run(service_fn(|request: LambdaEvent<Combined>| {
        thermo_telemetry_pipeline::function_handler(
            notifier.clone(),
            query_service.clone(),
            &config,
            request,
        )
    }))
    .await
}
