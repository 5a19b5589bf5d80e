use std::env;
use std::time::Duration;

use crate::gate::PollSchedule;

#[derive(Debug)]
pub struct Config {
    pub topic_arn: Option<String>,
    pub athena_database: Option<String>,
    pub athena_workgroup: Option<String>,
    pub athena_output_location: Option<String>,
    pub athena_table: String,
    pub query_row_limit: usize,
    pub athena_poll_interval: Duration,
    pub athena_max_attempts: u32,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub utc_offset_hours: i32,
}

impl Config {
    pub fn load_from_env() -> Result<Config, String> {
        let conf = Config {
            topic_arn: env::var("TOPIC_ARN").ok(),
            athena_database: env::var("ATHENA_DATABASE").ok(),
            athena_workgroup: env::var("ATHENA_WORKGROUP").ok(),
            athena_output_location: env::var("ATHENA_OUTPUT_LOCATION").ok(),
            athena_table: env::var("ATHENA_TABLE").unwrap_or("thermometer".to_string()),
            query_row_limit: env::var("QUERY_ROW_LIMIT")
                .unwrap_or("5000".to_string())
                .parse::<usize>()
                .map_err(|e| format!("Error parsing QUERY_ROW_LIMIT to usize - {}", e))?,
            athena_poll_interval: env::var("ATHENA_POLL_INTERVAL_MS")
                .unwrap_or("1000".to_string())
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| format!("Error parsing ATHENA_POLL_INTERVAL_MS to u64 - {}", e))?,
            athena_max_attempts: env::var("ATHENA_MAX_ATTEMPTS")
                .unwrap_or("15".to_string())
                .parse::<u32>()
                .map_err(|e| format!("Error parsing ATHENA_MAX_ATTEMPTS to u32 - {}", e))?,
            poll_interval: env::var("POLL_INTERVAL_MS")
                .unwrap_or("1000".to_string())
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| format!("Error parsing POLL_INTERVAL_MS to u64 - {}", e))?,
            max_polls: env::var("MAX_POLLS")
                .unwrap_or("5".to_string())
                .parse::<u32>()
                .map_err(|e| format!("Error parsing MAX_POLLS to u32 - {}", e))?,
            utc_offset_hours: env::var("UTC_OFFSET_HOURS")
                .unwrap_or("9".to_string())
                .parse::<i32>()
                .map_err(|e| format!("Error parsing UTC_OFFSET_HOURS to i32 - {}", e))?,
        };

        if conf.utc_offset_hours.abs() > 23 {
            return Err(format!(
                "UTC_OFFSET_HOURS out of range - {}",
                conf.utc_offset_hours
            ));
        }

        Ok(conf)
    }

    /// Schedule for the completion gates guarding the handler responses.
    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            interval: self.poll_interval,
            max_polls: self.max_polls,
        }
    }
}
