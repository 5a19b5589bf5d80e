use std::sync::Arc;

use async_trait::async_trait;
use aws_lambda_events::event::apigw::ApiGatewayProxyResponse;
use aws_lambda_events::event::kinesis::KinesisEvent;
use aws_sdk_sns::Client as SnsClient;
use futures::stream::{StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::events::api_response;
use crate::gate::{await_completion, CompletionCell, Settlement};
use crate::shadow::{notification_message, ShadowDocument};

/// One message bound for the notification topic. The subject carries the
/// device id so subscribers can filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub subject: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("TOPIC_ARN not set")]
    MissingTopic,
    #[error("publish failed - {0}")]
    Publish(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notice: &Notice) -> Result<(), NotifyError>;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Publishes notices to an SNS topic.
pub struct SnsNotifier {
    client: SnsClient,
    topic_arn: Option<String>,
}

impl SnsNotifier {
    pub fn new(client: SnsClient, topic_arn: Option<String>) -> Self {
        SnsNotifier { client, topic_arn }
    }
}

#[async_trait]
impl Notifier for SnsNotifier {
    async fn publish(&self, notice: &Notice) -> Result<(), NotifyError> {
        let topic_arn = self.topic_arn.as_deref().ok_or(NotifyError::MissingTopic)?;
        let output = self
            .client
            .publish()
            .topic_arn(topic_arn)
            .subject(&notice.subject)
            .message(&notice.message)
            .send()
            .await
            .map_err(|e| NotifyError::Publish(e.into_service_error().to_string()))?;
        debug!(message_id = ?output.message_id(), "notification published");
        Ok(())
    }
}

/// Extracts the notices carried by a stream batch. Records that cannot be
/// decoded are skipped, one bad producer must not block the rest of the
/// batch.
pub fn batch_notices(event: &KinesisEvent, utc_offset_hours: i32) -> Vec<Notice> {
    let mut notices = Vec::with_capacity(event.records.len());
    for record in &event.records {
        let arrival = record.kinesis.approximate_arrival_timestamp.0;
        let document = match ShadowDocument::parse(&record.kinesis.data.0) {
            Ok(document) => document,
            Err(error) => {
                warn!(
                    %error,
                    sequence_number = %record.kinesis.sequence_number,
                    "skipping undecodable stream record"
                );
                continue;
            }
        };

        let (Some(device_id), Some(temperature)) =
            (document.device_id(), document.reported_temperature())
        else {
            warn!(
                sequence_number = %record.kinesis.sequence_number,
                "skipping record without device id or reported temperature"
            );
            continue;
        };

        let message = notification_message(temperature, arrival, utc_offset_hours);
        debug!(device_id, %message, "notice prepared");
        notices.push(Notice {
            subject: device_id.to_string(),
            message,
        });
    }
    notices
}

/// Publishes the batch through `notifier` as one detached task, then waits
/// on the completion cell for at most the configured schedule. The handler
/// answers 200 once every publish is confirmed, 500 when any of them failed
/// and 202 when confirmation is still outstanding at the deadline.
pub async fn stream_notifications(
    notifier: DynNotifier,
    config: &Config,
    event: KinesisEvent,
) -> ApiGatewayProxyResponse {
    let notices = batch_notices(&event, config.utc_offset_hours);
    info!(
        total_records = event.records.len(),
        notices = notices.len(),
        "dispatching notifications"
    );

    let cell = Arc::new(CompletionCell::new());
    let publisher = cell.clone();
    tokio::spawn(async move {
        // Publish concurrently, but not more than 5 simultaneously.
        let results = futures::stream::iter(notices)
            .map(|notice| {
                let notifier = notifier.clone();
                async move {
                    notifier
                        .publish(&notice)
                        .await
                        .map_err(|e| format!("{} - {}", notice.subject, e))
                }
            })
            .buffer_unordered(5)
            .inspect_err(|error| error!(%error, "Failed to publish notification"))
            .collect::<Vec<_>>()
            .await;

        match results.into_iter().collect::<Result<Vec<()>, String>>() {
            Ok(sent) => publisher.succeed(sent.len()),
            Err(error) => publisher.fail(error),
        };
    });

    let outcome = await_completion(&cell, config.poll_schedule()).await;
    debug!(?outcome, "notification wait finished");

    match cell.snapshot() {
        Some(Settlement::Succeeded(published)) => {
            info!(published, "notifications confirmed");
            api_response(200, None)
        }
        Some(Settlement::Failed(error)) => {
            warn!(%error, "notification publish failed");
            api_response(500, None)
        }
        None => {
            warn!("notifications still in flight, responding unconfirmed");
            api_response(202, None)
        }
    }
}
