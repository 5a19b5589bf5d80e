use std::collections::HashMap;

use aws_lambda_events::encodings::Base64Data;
use aws_lambda_events::event::firehose::{
    KinesisFirehoseEvent, KinesisFirehoseResponse, KinesisFirehoseResponseRecord,
    KinesisFirehoseResponseRecordMetadata,
};
use tracing::{debug, info, warn};

use crate::shadow::{ShadowDocument, TelemetryRecord};

const RESULT_OK: &str = "Ok";
const RESULT_DROPPED: &str = "Dropped";
const RESULT_PROCESSING_FAILED: &str = "ProcessingFailed";

/// Turns raw shadow updates coming off the delivery stream into flat
/// telemetry rows. Accepted-state echoes are dropped, records that cannot be
/// decoded are marked failed so Firehose can route them aside. The response
/// carries one entry per input record, in input order.
pub fn shadow_records(event: KinesisFirehoseEvent) -> KinesisFirehoseResponse {
    info!(
        total_records = event.records.len(),
        "transforming shadow records"
    );

    let mut results = Vec::with_capacity(event.records.len());
    for record in event.records {
        let arrival_millis = record.approximate_arrival_timestamp.0.timestamp_millis();
        let (result, data) = match ShadowDocument::parse(&record.data.0) {
            Ok(document) if document.is_reported_update() => {
                match telemetry_payload(&document, arrival_millis) {
                    Ok(payload) => (RESULT_OK, Base64Data(payload)),
                    Err(error) => {
                        warn!(error, record_id = ?record.record_id, "incomplete reported update");
                        (RESULT_PROCESSING_FAILED, record.data)
                    }
                }
            }
            Ok(_) => {
                debug!(record_id = ?record.record_id, "not a reported update, dropping");
                (RESULT_DROPPED, record.data)
            }
            Err(error) => {
                warn!(%error, record_id = ?record.record_id, "undecodable shadow record");
                (RESULT_PROCESSING_FAILED, record.data)
            }
        };

        results.push(KinesisFirehoseResponseRecord {
            record_id: record.record_id,
            result: Some(result.to_string()),
            data,
            metadata: KinesisFirehoseResponseRecordMetadata {
                partition_keys: HashMap::new(),
            },
        });
    }

    KinesisFirehoseResponse { records: results }
}

fn telemetry_payload(document: &ShadowDocument, timestamp: i64) -> Result<Vec<u8>, &'static str> {
    let device_id = document.device_id().ok_or("missing client token")?.to_string();
    let temperature = document
        .reported_temperature()
        .ok_or("missing reported temperature")?;
    let row = TelemetryRecord {
        device_id,
        timestamp,
        temperature,
    };
    // TelemetryRecord is a plain struct, serialization cannot fail on it
    serde_json::to_vec(&row).map_err(|_| "unserializable telemetry row")
}
