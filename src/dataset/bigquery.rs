//! GDELT access through the BigQuery REST API.
//!
//! Queries go to the `jobs.query` endpoint with named parameters, so seed
//! URLs and identifier lists are never spliced into SQL text. A query that
//! does not finish within the synchronous timeout is polled through
//! `getQueryResults`, which is also used to follow `pageToken`s for results
//! spanning several pages.
//!
//! # Credentials
//!
//! The client takes an OAuth2 access token explicitly (for instance the
//! output of `gcloud auth print-access-token`) plus the billing project.
//! Nothing is read from ambient state here; the binary resolves both from
//! CLI flags or environment variables and hands them over.

use super::{EventDataset, Row, decode_event_row, decode_mention_row};
use crate::error::DatasetError;
use crate::models::{EventRow, MentionRow};
use crate::resolver::DateWindow;
use crate::utils::{to_sqldate, truncate_for_log};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Public GDELT 2.0 dataset.
pub const DEFAULT_DATASET: &str = "gdelt-bq.gdeltv2";

const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";
const QUERY_TIMEOUT_MS: u64 = 30_000;
const MAX_POLLS: usize = 20;

/// Connection settings for [`BigQueryClient`].
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    /// Project billed for the queries.
    pub project: String,
    /// OAuth2 bearer token.
    pub access_token: String,
    /// `project.dataset` holding the `events` and `eventmentions` tables.
    pub dataset: String,
    /// API base URL, overridable for emulators.
    pub endpoint: String,
}

impl BigQueryConfig {
    pub fn new(project: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            access_token: access_token.into(),
            dataset: DEFAULT_DATASET.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// BigQuery-backed [`EventDataset`].
///
/// Construct one per pipeline invocation and drop it afterwards; it owns the
/// HTTP connection pool used for the queries.
pub struct BigQueryClient {
    http: Client,
    config: BigQueryConfig,
}

impl std::fmt::Debug for BigQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryClient")
            .field("project", &self.config.project)
            .field("dataset", &self.config.dataset)
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: &'a [QueryParameter],
    timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: &'static str,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    array_type: Option<Box<ParameterType>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParameterValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    array_values: Vec<ParameterValue>,
}

impl QueryParameter {
    fn string(name: &'static str, value: &str) -> Self {
        Self::scalar(name, "STRING", value.to_string())
    }

    fn int64(name: &'static str, value: i64) -> Self {
        Self::scalar(name, "INT64", value.to_string())
    }

    fn scalar(name: &'static str, kind: &'static str, value: String) -> Self {
        Self {
            name,
            parameter_type: ParameterType { kind, array_type: None },
            parameter_value: ParameterValue {
                value: Some(value),
                ..Default::default()
            },
        }
    }

    fn int64_array(name: &'static str, values: &[u64]) -> Self {
        Self {
            name,
            parameter_type: ParameterType {
                kind: "ARRAY",
                array_type: Some(Box::new(ParameterType { kind: "INT64", array_type: None })),
            },
            parameter_value: ParameterValue {
                value: None,
                array_values: values
                    .iter()
                    .map(|v| ParameterValue {
                        value: Some(v.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    job_reference: Option<JobReference>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Deserialize)]
struct TableField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Zip a page of positional cells with the schema's column names.
fn rows_to_maps(schema: &TableSchema, rows: Vec<TableRow>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            schema
                .fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| (field.name.clone(), cell.v))
                .collect()
        })
        .collect()
}

/// Reject dataset names that could break out of the backtick-quoted table path.
fn validate_dataset(dataset: &str) -> Result<(), DatasetError> {
    let ok = !dataset.is_empty()
        && dataset
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(DatasetError::InvalidDataset(dataset.to_string()))
    }
}

/// Drive a query from its first response to the last row.
///
/// Polls `fetch` without a page token until the job completes (at most
/// `MAX_POLLS` times), then follows `pageToken`s until the result is
/// exhausted. `fetch` receives the job and the token of the page to load.
async fn collect_pages<F, Fut>(mut page: QueryResponse, mut fetch: F) -> Result<Vec<Row>, DatasetError>
where
    F: FnMut(JobReference, Option<String>) -> Fut,
    Fut: Future<Output = Result<QueryResponse, DatasetError>>,
{
    let mut polls = 0;
    while !page.job_complete {
        let Some(job) = page.job_reference.take() else {
            return Err(DatasetError::Decode("incomplete job without jobReference".into()));
        };
        polls += 1;
        if polls > MAX_POLLS {
            warn!(job_id = %job.job_id, polls, "Query still running; giving up");
            return Err(DatasetError::Incomplete(MAX_POLLS));
        }
        debug!(job_id = %job.job_id, polls, "Query not complete yet; polling");
        page = fetch(job, None).await?;
    }

    let schema = page
        .schema
        .take()
        .ok_or_else(|| DatasetError::Decode("completed query without schema".into()))?;
    let job = page.job_reference.take();
    let mut rows = rows_to_maps(&schema, std::mem::take(&mut page.rows));

    let mut token = page.page_token.take();
    while let Some(t) = token {
        let job = job
            .clone()
            .ok_or_else(|| DatasetError::Decode("paged result without jobReference".into()))?;
        debug!(job_id = %job.job_id, rows = rows.len(), "Fetching next page");
        let mut next = fetch(job, Some(t)).await?;
        rows.extend(rows_to_maps(&schema, std::mem::take(&mut next.rows)));
        token = next.page_token;
    }
    Ok(rows)
}

impl BigQueryClient {
    /// Build a client for the configured project.
    pub fn connect(config: BigQueryConfig) -> Result<Self, DatasetError> {
        validate_dataset(&config.dataset)?;
        let http = Client::builder()
            .timeout(Duration::from_millis(QUERY_TIMEOUT_MS + 30_000))
            .build()?;
        info!(project = %config.project, dataset = %config.dataset, "BigQuery client ready");
        Ok(Self { http, config })
    }

    fn table(&self, name: &str) -> String {
        format!("`{}.{}`", self.config.dataset, name)
    }

    async fn check(response: reqwest::Response) -> Result<QueryResponse, DatasetError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| truncate_for_log(&body, 300));
        Err(DatasetError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse, DatasetError> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.config.endpoint, self.config.project, job.job_id
        );
        let mut params = vec![("timeoutMs", QUERY_TIMEOUT_MS.to_string())];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.access_token)
            .query(&params)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Run one parameterised query and return every result row.
    #[instrument(level = "debug", skip_all)]
    async fn run_query(&self, sql: &str, params: &[QueryParameter]) -> Result<Vec<Row>, DatasetError> {
        let t0 = Instant::now();
        let url = format!("{}/projects/{}/queries", self.config.endpoint, self.config.project);
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: params,
            timeout_ms: QUERY_TIMEOUT_MS,
        };
        debug!(%sql, "Submitting query");
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await?;
        let page = Self::check(response).await?;
        let rows = collect_pages(page, |job, token| async move {
            self.get_results(&job, token.as_deref()).await
        })
        .await?;

        info!(
            rows = rows.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Query finished"
        );
        Ok(rows)
    }
}

impl EventDataset for BigQueryClient {
    #[instrument(level = "info", skip(self))]
    async fn events_for_url(&self, url: &str, limit: usize) -> Result<Vec<EventRow>, DatasetError> {
        let sql = format!(
            "SELECT DISTINCT GLOBALEVENTID, SQLDATE, SOURCEURL \
             FROM {} \
             WHERE SOURCEURL = @url \
             ORDER BY SQLDATE \
             LIMIT @limit",
            self.table("events")
        );
        let params = [
            QueryParameter::string("url", url),
            QueryParameter::int64("limit", i64::try_from(limit).unwrap_or(i64::MAX)),
        ];
        self.run_query(&sql, &params)
            .await?
            .iter()
            .map(decode_event_row)
            .collect()
    }

    #[instrument(level = "info", skip_all, fields(ids = event_ids.len(), window = %window))]
    async fn events_in_window(
        &self,
        event_ids: &[u64],
        window: &DateWindow,
    ) -> Result<Vec<EventRow>, DatasetError> {
        let sql = format!(
            "SELECT GLOBALEVENTID, SOURCEURL, SQLDATE, \
                    Actor1Name, Actor1CountryCode, Actor2Name, Actor2CountryCode, \
                    ActionGeo_Type, ActionGeo_FullName, ActionGeo_CountryCode, \
                    CAST(AvgTone AS FLOAT64) AS AvgTone, \
                    CAST(GoldsteinScale AS FLOAT64) AS GoldsteinScale, \
                    NumArticles \
             FROM {} \
             WHERE GLOBALEVENTID IN UNNEST(@event_ids) \
               AND SOURCEURL IS NOT NULL \
               AND SQLDATE BETWEEN @start AND @end \
             ORDER BY SQLDATE, GLOBALEVENTID",
            self.table("events")
        );
        let params = [
            QueryParameter::int64_array("event_ids", event_ids),
            QueryParameter::int64("start", to_sqldate(window.start)),
            QueryParameter::int64("end", to_sqldate(window.end)),
        ];
        self.run_query(&sql, &params)
            .await?
            .iter()
            .map(decode_event_row)
            .collect()
    }

    #[instrument(level = "info", skip_all, fields(window = %window))]
    async fn mentions_in_window(&self, window: &DateWindow) -> Result<Vec<MentionRow>, DatasetError> {
        let sql = format!(
            "SELECT GLOBALEVENTID, MentionIdentifier, MentionTimeDate \
             FROM {} \
             WHERE MentionTimeDate BETWEEN @start AND @end \
             ORDER BY MentionTimeDate",
            self.table("eventmentions")
        );
        // MentionTimeDate is YYYYMMDDHHMMSS
        let params = [
            QueryParameter::int64("start", to_sqldate(window.start) * 1_000_000),
            QueryParameter::int64("end", to_sqldate(window.end) * 1_000_000 + 235_959),
        ];
        self.run_query(&sql, &params)
            .await?
            .iter()
            .map(decode_mention_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const SCHEMA: &str = r#"{ "fields": [ { "name": "GLOBALEVENTID" } ] }"#;

    fn response(value: Value) -> QueryResponse {
        serde_json::from_value(value).unwrap()
    }

    fn pending(job_id: &str) -> QueryResponse {
        response(json!({ "jobComplete": false, "jobReference": { "jobId": job_id } }))
    }

    fn page(ids: &[&str], token: Option<&str>) -> QueryResponse {
        let schema: Value = serde_json::from_str(SCHEMA).unwrap();
        let rows: Vec<Value> = ids.iter().map(|id| json!({ "f": [ { "v": id } ] })).collect();
        response(json!({
            "jobComplete": true,
            "schema": schema,
            "rows": rows,
            "pageToken": token,
            "jobReference": { "jobId": "job_1", "location": "US" }
        }))
    }

    /// Serves queued responses and records `(job_id, page_token)` per call.
    struct Pages {
        queue: RefCell<VecDeque<QueryResponse>>,
        calls: RefCell<Vec<(String, Option<String>)>>,
    }

    impl Pages {
        fn new(responses: Vec<QueryResponse>) -> Self {
            Self {
                queue: RefCell::new(responses.into()),
                calls: RefCell::new(Vec::new()),
            }
        }

        async fn next(&self, job: JobReference, token: Option<String>) -> Result<QueryResponse, DatasetError> {
            self.calls.borrow_mut().push((job.job_id, token));
            self.queue
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| DatasetError::Decode("no more pages".into()))
        }
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r["GLOBALEVENTID"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_polls_until_complete() {
        let pages = Pages::new(vec![pending("job_1"), page(&["7"], None)]);
        let rows = collect_pages(pending("job_1"), |job, token| pages.next(job, token))
            .await
            .unwrap();

        assert_eq!(ids(&rows), vec!["7"]);
        assert_eq!(
            *pages.calls.borrow(),
            vec![("job_1".to_string(), None), ("job_1".to_string(), None)]
        );
    }

    #[tokio::test]
    async fn test_follows_page_tokens() {
        let pages = Pages::new(vec![page(&["3"], Some("t2")), page(&["4", "5"], None)]);
        let rows = collect_pages(page(&["1", "2"], Some("t1")), |job, token| pages.next(job, token))
            .await
            .unwrap();

        assert_eq!(ids(&rows), vec!["1", "2", "3", "4", "5"]);
        let tokens: Vec<Option<String>> = pages.calls.borrow().iter().map(|(_, t)| t.clone()).collect();
        assert_eq!(tokens, vec![Some("t1".to_string()), Some("t2".to_string())]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_polls() {
        let pages = Pages::new((0..MAX_POLLS + 5).map(|_| pending("job_9")).collect());
        let err = collect_pages(pending("job_9"), |job, token| pages.next(job, token))
            .await
            .unwrap_err();

        assert!(matches!(err, DatasetError::Incomplete(n) if n == MAX_POLLS));
        assert_eq!(pages.calls.borrow().len(), MAX_POLLS);
    }

    #[tokio::test]
    async fn test_complete_single_page_makes_no_calls() {
        let pages = Pages::new(Vec::new());
        let rows = collect_pages(page(&["1"], None), |job, token| pages.next(job, token))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(pages.calls.borrow().is_empty());
    }

    #[test]
    fn test_scalar_parameter_serialization() {
        let p = QueryParameter::string("url", "https://example.com/a");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "url",
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": "https://example.com/a" }
            })
        );
    }

    #[test]
    fn test_array_parameter_serialization() {
        let p = QueryParameter::int64_array("event_ids", &[1, 2]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "event_ids",
                "parameterType": { "type": "ARRAY", "arrayType": { "type": "INT64" } },
                "parameterValue": { "arrayValues": [ { "value": "1" }, { "value": "2" } ] }
            })
        );
    }

    #[test]
    fn test_response_rows_become_maps() {
        let response: QueryResponse = serde_json::from_value(json!({
            "jobComplete": true,
            "schema": { "fields": [ { "name": "GLOBALEVENTID", "type": "INTEGER" },
                                    { "name": "SQLDATE", "type": "INTEGER" },
                                    { "name": "SOURCEURL", "type": "STRING" } ] },
            "rows": [ { "f": [ { "v": "1" }, { "v": "20210501" }, { "v": null } ] } ],
            "jobReference": { "projectId": "p", "jobId": "job_1", "location": "US" }
        }))
        .unwrap();

        assert!(response.job_complete);
        let rows = rows_to_maps(response.schema.as_ref().unwrap(), response.rows);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["GLOBALEVENTID"], json!("1"));
        assert_eq!(rows[0]["SOURCEURL"], Value::Null);

        let event = decode_event_row(&rows[0]).unwrap();
        assert_eq!(event.event_id, 1);
        assert_eq!(event.source_url, None);
    }

    #[test]
    fn test_incomplete_response_without_rows() {
        let response: QueryResponse = serde_json::from_value(json!({
            "jobComplete": false,
            "jobReference": { "jobId": "job_2" }
        }))
        .unwrap();
        assert!(!response.job_complete);
        assert!(response.rows.is_empty());
        assert_eq!(response.job_reference.unwrap().job_id, "job_2");
    }

    #[test]
    fn test_validate_dataset() {
        assert!(validate_dataset(DEFAULT_DATASET).is_ok());
        assert!(validate_dataset("my-proj.my_ds").is_ok());
        assert!(validate_dataset("x`; DROP TABLE y; --").is_err());
        assert!(validate_dataset("").is_err());
    }

    #[test]
    fn test_connect_builds_table_paths() {
        let client = BigQueryClient::connect(BigQueryConfig::new("proj", "token")).unwrap();
        assert_eq!(client.table("events"), "`gdelt-bq.gdeltv2.events`");
    }
}
