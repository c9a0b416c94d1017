//! NASA ADS search client.
//!
//! Implements [`SearchClient`] against the ADS `/v1/search/query` endpoint
//! with bearer-token authentication. One planned query may span several
//! pages; the client follows `start` offsets until a short page, the
//! reported hit count, or the configured record cap.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ProviderError, ProviderResult, RawRecord, SearchBatch, SearchClient};
use crate::config::AdsConfig;
use crate::query::{DateWindow, PlannedQuery};

/// Fields requested for every record.
pub const FIELDS: &str = "title,author,aff,abstract,bibcode,identifier,pubdate,arxiv_class,orcid_pub,orcid_user,orcid_other";

/// Newest entries first.
const SORT: &str = "date desc";

/// Client for the ADS search API.
#[derive(Debug, Clone)]
pub struct AdsClient {
    client: Client,
    api_url: String,
    api_key: String,
    rows: u32,
    max_records: u32,
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(rename = "numFound", default)]
    num_found: u64,

    #[serde(default)]
    docs: Vec<RawRecord>,
}

impl AdsClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns [`ProviderError::Config`] when no API token is configured, or
    /// [`ProviderError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &AdsConfig) -> ProviderResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::Config("ADS API token is not set (ads.api_key / ADS_API_KEY)".to_string()))?
            .to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("astro-digest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            rows: config.rows.max(1),
            max_records: config.max_records,
            filter: config.filter.clone(),
        })
    }

    async fn fetch_page(&self, q: &str, start: u32) -> ProviderResult<ResponseBody> {
        let rows = self.rows.to_string();
        let start = start.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("q", q),
            ("fl", FIELDS),
            ("rows", &rows),
            ("start", &start),
            ("sort", SORT),
        ];
        if let Some(filter) = self.filter.as_deref() {
            params.push(("fq", filter));
        }

        let resp = self
            .client
            .get(&self.api_url)
            .bearer_auth(&self.api_key)
            .query(&params)
            .send()
            .await?;
        let resp = check_response(resp).await?;

        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(format!("unexpected ADS response: {e}")))?;
        Ok(body.response)
    }
}

#[async_trait]
impl SearchClient for AdsClient {
    async fn search(&self, query: &PlannedQuery, window: &DateWindow) -> ProviderResult<SearchBatch> {
        let q = query.ads_query(window);
        let cap = self.max_records as usize;
        let mut records = Vec::new();
        let mut capped = false;
        let mut num_found: u64;

        loop {
            let start = u32::try_from(records.len()).unwrap_or(u32::MAX);
            let page = self.fetch_page(&q, start).await?;
            let page_len = page.docs.len();
            num_found = page.num_found;
            debug!(tag = %query.tag, start, page_len, num_found, "Fetched ADS page");

            records.extend(page.docs);

            if page_len < self.rows as usize || records.len() as u64 >= num_found {
                break;
            }
            if records.len() >= cap {
                capped = true;
                break;
            }
        }

        if records.len() > cap {
            capped = true;
            records.truncate(cap);
        }

        let truncated = if capped {
            num_found.saturating_sub(records.len() as u64)
        } else {
            0
        };
        if truncated > 0 {
            warn!(
                tag = %query.tag,
                num_found,
                max_records = self.max_records,
                truncated,
                "ADS reported more hits than the record cap; the rest were not fetched"
            );
        }

        Ok(SearchBatch { records, truncated })
    }

    fn name(&self) -> &str {
        "NASA ADS"
    }
}

/// Map rate limiting and non-success statuses to [`ProviderError`].
async fn check_response(resp: reqwest::Response) -> ProviderResult<reqwest::Response> {
    if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited {
            retry_after_secs: parse_retry_after(&resp),
        });
    }
    if !resp.status().is_success() {
        return Err(ProviderError::Api {
            status: resp.status().as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }
    Ok(resp)
}

/// `Retry-After` in seconds, 60 when absent or unparseable.
fn parse_retry_after(resp: &reqwest::Response) -> u64 {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryTag;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> AdsConfig {
        AdsConfig {
            api_url: format!("{}/v1/search/query", server.uri()),
            api_key: Some("test-token".to_string()),
            rows: 2,
            max_records: 10,
            timeout_secs: 5,
            filter: None,
        }
    }

    fn planned() -> PlannedQuery {
        PlannedQuery {
            position: 0,
            tag: QueryTag::CategoryScan,
            clause: r#"(arxiv_class:"astro-ph.SR")"#.to_string(),
        }
    }

    fn window() -> DateWindow {
        DateWindow::ending(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(), 7)
    }

    fn doc(bibcode: &str) -> serde_json::Value {
        json!({ "bibcode": bibcode, "title": [format!("Paper {bibcode}")] })
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let config = AdsConfig::default();
        let err = AdsClient::new(&config).unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[tokio::test]
    async fn test_search_sends_query_and_parses_docs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search/query"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param(
                "q",
                r#"(arxiv_class:"astro-ph.SR") AND entdate:[2024-01-01 TO 2024-01-08]"#,
            ))
            .and(query_param("sort", "date desc"))
            .and(query_param("fl", FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "numFound": 1, "start": 0, "docs": [doc("2024A")] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AdsClient::new(&config(&server)).unwrap();
        let batch = client.search(&planned(), &window()).await.unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].bibcode.as_deref(), Some("2024A"));
        assert_eq!(batch.truncated, 0);
    }

    #[tokio::test]
    async fn test_search_follows_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "numFound": 3, "docs": [doc("A"), doc("B")] }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("start", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "numFound": 3, "docs": [doc("C")] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AdsClient::new(&config(&server)).unwrap();
        let batch = client.search(&planned(), &window()).await.unwrap();
        let bibcodes: Vec<_> = batch.records.iter().filter_map(|r| r.bibcode.as_deref()).collect();
        assert_eq!(bibcodes, vec!["A", "B", "C"]);
        assert_eq!(batch.truncated, 0);
    }

    #[tokio::test]
    async fn test_search_stops_at_record_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "numFound": 100, "docs": [doc("A"), doc("B")] }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.max_records = 3;
        let client = AdsClient::new(&config).unwrap();
        let batch = client.search(&planned(), &window()).await.unwrap();
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.truncated, 97);
    }

    #[tokio::test]
    async fn test_search_cap_on_page_boundary_reports_remainder() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "numFound": 5, "docs": [doc("A"), doc("B")] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.max_records = 2;
        let client = AdsClient::new(&config).unwrap();
        let batch = client.search(&planned(), &window()).await.unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.truncated, 3);
    }

    #[tokio::test]
    async fn test_rate_limit_uses_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let client = AdsClient::new(&config(&server)).unwrap();
        let err = client.search(&planned(), &window()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 30 }));
    }

    #[tokio::test]
    async fn test_rate_limit_defaults_to_sixty_seconds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = AdsClient::new(&config(&server)).unwrap();
        let err = client.search(&planned(), &window()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 60 }));
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("solr down"))
            .mount(&server)
            .await;

        let client = AdsClient::new(&config(&server)).unwrap();
        let err = client.search(&planned(), &window()).await.unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "solr down");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = AdsClient::new(&config(&server)).unwrap();
        let err = client.search(&planned(), &window()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }
}
