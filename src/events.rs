use aws_lambda_events::encodings::Body;
use aws_lambda_events::event::apigw::ApiGatewayProxyResponse;
use aws_lambda_events::event::firehose::{KinesisFirehoseEvent, KinesisFirehoseResponse};
use aws_lambda_events::event::kinesis::KinesisEvent;

use serde::de::{self, Deserialize, Deserializer};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug)]
pub enum Combined {
    Kinesis(KinesisEvent),
    Firehose(KinesisFirehoseEvent),
    Query(QueryRequest),
}

/// Reading request issued by the dashboard.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "deviceid")]
    pub device_id: String,
    /// Epoch milliseconds. The dashboard sends this as a number or a
    /// stringified number depending on the client version.
    #[serde(rename = "startTimestamp", deserialize_with = "millis_from_number_or_string")]
    pub start_timestamp: i64,
}

fn millis_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw_value = Value::deserialize(deserializer)?;
    match &raw_value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| de::Error::custom(format!("startTimestamp out of range: {raw_value}"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(|f| f as i64)
            .map_err(|e| de::Error::custom(format!("startTimestamp is not numeric - {e}"))),
        _ => Err(de::Error::custom(format!(
            "unsupported startTimestamp: {raw_value}"
        ))),
    }
}

impl<'de> Deserialize<'de> for Combined {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw_value: Value = Deserialize::deserialize(deserializer)?;
        debug!("raw_value: {:?}", raw_value);

        if let Ok(event) = KinesisEvent::deserialize(&raw_value) {
            tracing::info!("kinesis event detected");
            return Ok(Combined::Kinesis(event));
        }

        if let Ok(event) = KinesisFirehoseEvent::deserialize(&raw_value) {
            tracing::info!("firehose event detected");
            return Ok(Combined::Firehose(event));
        }

        // IMPORTANT: the reading query must be evaluated last as it is a bare
        // two-field object. Any stream event also carrying those keys would
        // otherwise be swallowed here.
        if let Ok(request) = QueryRequest::deserialize(&raw_value) {
            tracing::info!("reading query detected");
            return Ok(Combined::Query(request));
        }

        Err(de::Error::custom(format!(
            "unsupported event type: {raw_value}"
        )))
    }
}

/// Responses the handler can hand back to the runtime. Firehose invocations
/// must answer with the transformed record set, everything else uses the
/// proxy-style envelope the dashboard understands.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Firehose(KinesisFirehoseResponse),
    Api(ApiGatewayProxyResponse),
}

pub fn api_response(status_code: i64, body: Option<String>) -> ApiGatewayProxyResponse {
    ApiGatewayProxyResponse {
        status_code,
        body: body.map(Body::Text),
        ..Default::default()
    }
}
