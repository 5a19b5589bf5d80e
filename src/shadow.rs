use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device shadow update document as it arrives on the stream. Both delta
/// updates and the accepted-state echoes land on the same stream, the echoes
/// carry a `metadata` section and are not of interest here.
#[derive(Debug, Clone, Deserialize)]
pub struct ShadowDocument {
    pub state: Option<ShadowState>,
    pub metadata: Option<Value>,
    #[serde(rename = "clientToken")]
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShadowState {
    pub reported: Option<ReportedState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportedState {
    pub temperature: Option<f64>,
}

/// Flattened row written to the delivery stream and queried back out of the
/// data lake. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub timestamp: i64,
    pub temperature: f64,
}

impl ShadowDocument {
    pub fn parse(data: &[u8]) -> Result<ShadowDocument, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Device id embedded in the client token, the prefix up to the first
    /// `-`. Tokens without a usable prefix are taken whole.
    pub fn device_id(&self) -> Option<&str> {
        let token = self.client_token.as_deref().filter(|t| !t.is_empty())?;
        match token.split_once('-') {
            Some((prefix, _)) if !prefix.is_empty() => Some(prefix),
            _ => Some(token),
        }
    }

    pub fn reported_temperature(&self) -> Option<f64> {
        self.state.as_ref()?.reported.as_ref()?.temperature
    }

    /// A reported-state update carries a temperature and no `metadata` echo.
    pub fn is_reported_update(&self) -> bool {
        self.reported_temperature().is_some() && self.metadata.is_none()
    }
}

/// Floors to one decimal place and drops a trailing zero, so 25.67 becomes
/// "25.6" and 25.0 becomes "25".
pub fn format_temperature(value: f64) -> String {
    let floored = (value * 10.0).floor() / 10.0;
    if floored.fract() == 0.0 {
        format!("{floored:.0}")
    } else {
        format!("{floored:.1}")
    }
}

/// Wall clock `HH:MM:SS` of `instant` shifted to the dashboard timezone.
pub fn local_clock(instant: DateTime<Utc>, utc_offset_hours: i32) -> String {
    match FixedOffset::east_opt(utc_offset_hours * 3600) {
        Some(offset) => instant.with_timezone(&offset).format("%H:%M:%S").to_string(),
        None => instant.format("%H:%M:%S").to_string(),
    }
}

/// Human readable notification body, e.g. `25.6 (18:21:05)`.
pub fn notification_message(
    temperature: f64,
    arrival: DateTime<Utc>,
    utc_offset_hours: i32,
) -> String {
    format!(
        "{} ({})",
        format_temperature(temperature),
        local_clock(arrival, utc_offset_hours)
    )
}
