use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_lambda_events::event::apigw::ApiGatewayProxyResponse;
use aws_sdk_athena::types::{QueryExecutionContext, QueryExecutionState, ResultConfiguration, Row};
use aws_sdk_athena::Client as AthenaClient;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{api_response, QueryRequest};
use crate::gate::{await_completion, CompletionCell, Settlement};

/// One telemetry row handed back to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: i64,
    pub temperature: f64,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("{0} not set")]
    MissingConfig(&'static str),
    #[error("failed to start query - {0}")]
    Start(String),
    #[error("failed to fetch query status - {0}")]
    Status(String),
    #[error("query {query_execution_id} {state} - {reason}")]
    Execution {
        query_execution_id: String,
        state: String,
        reason: String,
    },
    #[error("query {query_execution_id} still running after {attempts} status checks")]
    StillRunning {
        query_execution_id: String,
        attempts: u32,
    },
    #[error("failed to fetch query results - {0}")]
    Results(String),
}

#[async_trait]
pub trait QueryService: Send + Sync {
    async fn fetch_readings(&self, request: &QueryRequest) -> Result<Vec<Reading>, QueryError>;
}

pub type DynQueryService = Arc<dyn QueryService>;

/// Runs reading queries through Athena. Start the execution, poll its status
/// until it reaches a terminal state, then page through the result set.
pub struct AthenaQueryService {
    client: AthenaClient,
    database: Option<String>,
    workgroup: Option<String>,
    output_location: Option<String>,
    table: String,
    row_limit: usize,
    status_interval: Duration,
    max_status_checks: u32,
}

impl AthenaQueryService {
    pub fn new(client: AthenaClient, config: &Config) -> Self {
        AthenaQueryService {
            client,
            database: config.athena_database.clone(),
            workgroup: config.athena_workgroup.clone(),
            output_location: config.athena_output_location.clone(),
            table: config.athena_table.clone(),
            row_limit: config.query_row_limit,
            status_interval: config.athena_poll_interval,
            max_status_checks: config.athena_max_attempts,
        }
    }

    async fn start(&self, sql: &str) -> Result<String, QueryError> {
        let database = self
            .database
            .as_deref()
            .ok_or(QueryError::MissingConfig("ATHENA_DATABASE"))?;
        let workgroup = self
            .workgroup
            .as_deref()
            .ok_or(QueryError::MissingConfig("ATHENA_WORKGROUP"))?;
        let output_location = self
            .output_location
            .as_deref()
            .ok_or(QueryError::MissingConfig("ATHENA_OUTPUT_LOCATION"))?;

        let output = self
            .client
            .start_query_execution()
            .query_string(sql)
            .query_execution_context(
                QueryExecutionContext::builder().database(database).build(),
            )
            .work_group(workgroup)
            .result_configuration(
                ResultConfiguration::builder()
                    .output_location(output_location)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| QueryError::Start(e.into_service_error().to_string()))?;

        output
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| QueryError::Start("no query execution id returned".to_string()))
    }

    async fn wait_until_finished(&self, query_execution_id: &str) -> Result<(), QueryError> {
        for attempt in 1..=self.max_status_checks {
            tokio::time::sleep(self.status_interval).await;

            let output = self
                .client
                .get_query_execution()
                .query_execution_id(query_execution_id)
                .send()
                .await
                .map_err(|e| QueryError::Status(e.into_service_error().to_string()))?;

            let status = output.query_execution().and_then(|qe| qe.status());
            match status.and_then(|s| s.state()) {
                Some(QueryExecutionState::Succeeded) => {
                    debug!(query_execution_id, attempt, "query succeeded");
                    return Ok(());
                }
                Some(
                    terminal @ (QueryExecutionState::Failed | QueryExecutionState::Cancelled),
                ) => {
                    let reason = status
                        .and_then(|s| s.state_change_reason())
                        .unwrap_or("no reason given");
                    return Err(QueryError::Execution {
                        query_execution_id: query_execution_id.to_string(),
                        state: terminal.as_str().to_string(),
                        reason: reason.to_string(),
                    });
                }
                state => {
                    debug!(query_execution_id, attempt, ?state, "query still running");
                }
            }
        }

        Err(QueryError::StillRunning {
            query_execution_id: query_execution_id.to_string(),
            attempts: self.max_status_checks,
        })
    }

    async fn fetch_results(&self, query_execution_id: &str) -> Result<Vec<Reading>, QueryError> {
        let mut readings = Vec::new();
        let mut columns: Option<ColumnIndexes> = None;
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .get_query_results()
                .query_execution_id(query_execution_id)
                .set_next_token(next_token.clone())
                .send()
                .await
                .map_err(|e| QueryError::Results(e.into_service_error().to_string()))?;

            let rows = output.result_set().map(|rs| rs.rows()).unwrap_or_default();
            for row in rows {
                if columns.is_none() {
                    // the first row of the first page is the column header
                    columns = Some(ColumnIndexes::from_header(row));
                    continue;
                }
                match columns.as_ref().and_then(|c| c.reading(row)) {
                    Some(reading) => readings.push(reading),
                    None => warn!(
                        query_execution_id,
                        "skipping result row with missing or malformed columns"
                    ),
                }
            }

            next_token = output.next_token().map(str::to_string);
            if next_token.is_none() {
                break;
            }
        }

        info!(
            total = readings.len(),
            query_execution_id, "query results fetched"
        );
        Ok(readings)
    }
}

#[async_trait]
impl QueryService for AthenaQueryService {
    async fn fetch_readings(&self, request: &QueryRequest) -> Result<Vec<Reading>, QueryError> {
        let sql = reading_sql(&self.table, request, self.row_limit);
        debug!(sql = %sql, "issuing reading query");

        let query_execution_id = self.start(&sql).await?;
        info!(%query_execution_id, device_id = %request.device_id, "query started");

        self.wait_until_finished(&query_execution_id).await?;
        self.fetch_results(&query_execution_id).await
    }
}

/// `timestamp` is a reserved word in Athena DDL, so the column stays quoted.
fn reading_sql(table: &str, request: &QueryRequest, row_limit: usize) -> String {
    // the device id lands inside a string literal, double any quotes in it
    let device_id = request.device_id.replace('\'', "''");
    format!(
        r#"SELECT "timestamp", temperature FROM {} WHERE deviceid = '{}' AND "timestamp" > {} ORDER BY "timestamp" LIMIT {}"#,
        table, device_id, request.start_timestamp, row_limit
    )
}

/// Positions of the columns of interest, taken from the header row. Athena
/// reports columns in SELECT order but the positions are not worth hardcoding.
struct ColumnIndexes {
    timestamp: Option<usize>,
    temperature: Option<usize>,
}

impl ColumnIndexes {
    fn from_header(row: &Row) -> Self {
        let names = row
            .data()
            .iter()
            .map(|datum| datum.var_char_value().unwrap_or_default().to_lowercase())
            .collect_vec();
        ColumnIndexes {
            timestamp: names.iter().position(|name| name == "timestamp"),
            temperature: names.iter().position(|name| name == "temperature"),
        }
    }

    fn reading(&self, row: &Row) -> Option<Reading> {
        let data = row.data();
        let timestamp = data
            .get(self.timestamp?)?
            .var_char_value()?
            .trim()
            .parse::<i64>()
            .ok()?;
        let temperature = data
            .get(self.temperature?)?
            .var_char_value()?
            .trim()
            .parse::<f64>()
            .ok()?;
        Some(Reading {
            timestamp,
            temperature,
        })
    }
}

/// Runs the reading query as one detached task, then waits on the completion
/// cell for at most the configured schedule. The handler answers 200 with the
/// rows once the query is done, 500 when it failed and 504 when it is still
/// running at the deadline.
pub async fn device_readings(
    query_service: DynQueryService,
    config: &Config,
    request: QueryRequest,
) -> ApiGatewayProxyResponse {
    info!(
        device_id = %request.device_id,
        start_timestamp = request.start_timestamp,
        "handling reading query"
    );

    let cell = Arc::new(CompletionCell::new());
    let worker = cell.clone();
    tokio::spawn(async move {
        match query_service.fetch_readings(&request).await {
            Ok(readings) => worker.succeed(readings),
            Err(error) => worker.fail(error.to_string()),
        };
    });

    let outcome = await_completion(&cell, config.poll_schedule()).await;
    debug!(?outcome, "reading query wait finished");

    match cell.snapshot() {
        Some(Settlement::Succeeded(readings)) => match serde_json::to_string(&readings) {
            Ok(body) => api_response(200, Some(body)),
            Err(error) => {
                warn!(%error, "failed to serialize readings");
                api_response(500, Some(error_body("failed to serialize readings")))
            }
        },
        Some(Settlement::Failed(error)) => {
            warn!(%error, "reading query failed");
            api_response(500, Some(error_body(&error)))
        }
        None => {
            warn!("reading query still running at the response deadline");
            api_response(504, Some(error_body("query did not finish in time")))
        }
    }
}

fn error_body(message: &str) -> String {
    serde_json::json!({ "message": message }).to_string()
}
