//! Ingestion pipeline module.
//!
//! This module runs the planned searches, normalizes every raw record and
//! merges the results into one deduplicated set of papers.
//!
//! # Usage
//!
//! ```ignore
//! use astro_digest::ingestion::IngestionPipeline;
//! use astro_digest::provider::ads::AdsClient;
//! use astro_digest::query::{DateWindow, QueryPlan};
//!
//! let client = AdsClient::new(&config.ads)?;
//! let pipeline = IngestionPipeline::new(client, config.queries.on_failure);
//! let plan = QueryPlan::from_config(&config);
//! let output = pipeline.run(&plan, &DateWindow::ending_today(config.days_back)).await?;
//! println!("{} unique papers, {} duplicates merged",
//!          output.stats.unique_papers, output.stats.duplicates_merged);
//! ```
//!
//! The pipeline:
//! - Issues every planned query concurrently and buffers all outcomes
//! - Restores plan order before merging, so results never depend on
//!   completion order
//! - Applies the partial failure policy
//! - Drops records without an identifier (logged, not fatal)
//! - Counts hits a provider left unfetched because of its record cap
//! - Merges records sharing an identifier, first-seen value winning

use std::collections::BTreeMap;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PartialFailurePolicy;
use crate::models::{Paper, QueryTag};
use crate::normalize::{normalize_record, DEFAULT_CATEGORY};
use crate::provider::{ProviderError, ProviderResult, SearchBatch, SearchClient};
use crate::query::{DateWindow, PlannedQuery, QueryPlan};

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// A query failed and the policy is to abort
    #[error("Query '{tag}' failed: {source}")]
    QueryFailed {
        tag: QueryTag,
        #[source]
        source: ProviderError,
    },

    /// Every planned query failed
    #[error("All {attempted} queries failed; first error: {first}")]
    AllQueriesFailed {
        attempted: usize,
        #[source]
        first: ProviderError,
    },
}

/// Result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Statistics from an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionStats {
    /// Queries that returned a result list
    pub queries_run: usize,

    /// Queries that failed
    pub queries_failed: usize,

    /// Raw records received across all queries
    pub records_seen: usize,

    /// Hits reported by the provider but not fetched (record cap)
    pub records_truncated: u64,

    /// Records dropped for lacking an identifier
    pub malformed_dropped: usize,

    /// Records merged into an already-seen paper
    pub duplicates_merged: usize,

    /// Papers after deduplication
    pub unique_papers: usize,
}

impl IngestionStats {
    /// Create new empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a query that returned `records` raw records.
    pub fn record_query(&mut self, records: usize) {
        self.queries_run += 1;
        self.records_seen += records;
    }

    /// Record hits a query left unfetched.
    pub fn record_truncated(&mut self, hits: u64) {
        self.records_truncated += hits;
    }

    /// Record a failed query.
    pub fn record_failed_query(&mut self) {
        self.queries_failed += 1;
    }

    /// Record a record dropped by the normalizer.
    pub fn record_malformed(&mut self) {
        self.malformed_dropped += 1;
    }
}

/// Merges normalized papers by identifier.
///
/// Papers must be inserted in plan order: for every scalar field the first
/// non-empty value wins, while query tags and author identifiers are
/// unioned.
#[derive(Debug, Default)]
pub struct Deduplicator {
    papers: BTreeMap<String, Paper>,
    merged: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one paper. Returns `true` if it was merged into an existing one.
    pub fn insert(&mut self, paper: Paper) -> bool {
        match self.papers.get_mut(&paper.identifier) {
            Some(existing) => {
                merge_into(existing, paper);
                self.merged += 1;
                true
            }
            None => {
                self.papers.insert(paper.identifier.clone(), paper);
                false
            }
        }
    }

    /// Merge whole result lists, in the order given.
    pub fn merge<I>(batches: I) -> BTreeMap<String, Paper>
    where
        I: IntoIterator<Item = Vec<Paper>>,
    {
        let mut dedup = Self::new();
        for paper in batches.into_iter().flatten() {
            dedup.insert(paper);
        }
        dedup.into_papers()
    }

    /// Number of distinct papers.
    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    /// Number of inserts that hit an existing identifier.
    pub fn duplicates_merged(&self) -> usize {
        self.merged
    }

    pub fn into_papers(self) -> BTreeMap<String, Paper> {
        self.papers
    }
}

/// Fill every still-empty field of `existing` from `incoming`.
fn merge_into(existing: &mut Paper, incoming: Paper) {
    if existing.title.is_empty() {
        existing.title = incoming.title;
    }
    if existing.abstract_text.is_empty() {
        existing.abstract_text = incoming.abstract_text;
    }
    if existing.authors.is_empty() {
        existing.authors = incoming.authors;
    }
    // The normalizer's fallback category is not informative.
    let placeholder = |c: &str| c.is_empty() || c == DEFAULT_CATEGORY;
    if placeholder(&existing.category) && !placeholder(&incoming.category) {
        existing.category = incoming.category;
    }
    if existing.published_date.is_none() {
        existing.published_date = incoming.published_date;
    }
    if existing.arxiv_id.is_none() {
        existing.arxiv_id = incoming.arxiv_id;
    }
    if existing.bibcode.is_none() {
        existing.bibcode = incoming.bibcode;
    }
    existing.source_queries.extend(incoming.source_queries);
    existing.author_ids.extend(incoming.author_ids);
}

/// Output of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestionOutput {
    /// Deduplicated papers keyed by identifier
    pub papers: BTreeMap<String, Paper>,

    pub stats: IngestionStats,
}

/// Ingestion pipeline coordinator.
///
/// Owns the search client and the partial failure policy; one pipeline can
/// run any number of plans.
pub struct IngestionPipeline<C>
where
    C: SearchClient,
{
    /// Search backend
    client: C,

    /// What to do when some queries fail
    policy: PartialFailurePolicy,
}

impl<C> IngestionPipeline<C>
where
    C: SearchClient,
{
    pub fn new(client: C, policy: PartialFailurePolicy) -> Self {
        Self { client, policy }
    }

    /// Get a reference to the search client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run every query in `plan` for `window` and merge the results.
    ///
    /// # Errors
    /// Returns `IngestionError::QueryFailed` for the first failed query (in
    /// plan order) under [`PartialFailurePolicy::Abort`], and
    /// `IngestionError::AllQueriesFailed` when no query succeeded.
    pub async fn run(&self, plan: &QueryPlan, window: &DateWindow) -> IngestionResult<IngestionOutput> {
        info!(
            provider = self.client.name(),
            queries = plan.len(),
            window = %window.ads_range(),
            "Running query plan"
        );

        let outcomes = join_all(plan.queries().iter().map(|query| async move {
            let result = self.client.search(query, window).await;
            (query.clone(), result)
        }))
        .await;

        self.merge_outcomes(outcomes)
    }

    /// Apply the failure policy to buffered outcomes, then normalize and
    /// deduplicate. Outcomes may be in any order.
    pub fn merge_outcomes(
        &self,
        mut outcomes: Vec<(PlannedQuery, ProviderResult<SearchBatch>)>,
    ) -> IngestionResult<IngestionOutput> {
        outcomes.sort_by_key(|(query, _)| query.position);

        let mut stats = IngestionStats::new();
        let mut succeeded = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();

        for (query, result) in outcomes {
            match result {
                Ok(batch) => {
                    debug!(tag = %query.tag, records = batch.records.len(), "Query succeeded");
                    stats.record_query(batch.records.len());
                    if batch.truncated > 0 {
                        warn!(tag = %query.tag, truncated = batch.truncated, "Query results are incomplete");
                        stats.record_truncated(batch.truncated);
                    }
                    succeeded.push((query, batch.records));
                }
                Err(e) => {
                    warn!(tag = %query.tag, error = %e, "Query failed");
                    stats.record_failed_query();
                    failures.push((query, e));
                }
            }
        }

        if !failures.is_empty() {
            let attempted = succeeded.len() + failures.len();
            let (query, first) = failures.remove(0);
            if succeeded.is_empty() {
                return Err(IngestionError::AllQueriesFailed { attempted, first });
            }
            match self.policy {
                PartialFailurePolicy::Abort => {
                    return Err(IngestionError::QueryFailed {
                        tag: query.tag,
                        source: first,
                    });
                }
                PartialFailurePolicy::Proceed => {
                    warn!(
                        failed = stats.queries_failed,
                        succeeded = stats.queries_run,
                        "Continuing with partial results"
                    );
                }
            }
        }

        let mut dedup = Deduplicator::new();
        for (query, records) in succeeded {
            for raw in &records {
                match normalize_record(raw, &query.tag) {
                    Ok(paper) => {
                        dedup.insert(paper);
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping record");
                        stats.record_malformed();
                    }
                }
            }
        }

        stats.duplicates_merged = dedup.duplicates_merged();
        stats.unique_papers = dedup.len();
        info!(
            unique = stats.unique_papers,
            merged = stats.duplicates_merged,
            dropped = stats.malformed_dropped,
            truncated = stats.records_truncated,
            "Ingestion complete"
        );

        Ok(IngestionOutput {
            papers: dedup.into_papers(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DigestConfig;
    use crate::provider::RawRecord;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // ===== Mock Implementations =====

    /// Mock search client with canned responses per query tag.
    #[derive(Clone, Default)]
    struct MockSearchClient {
        state: Arc<Mutex<MockSearchState>>,
    }

    #[derive(Default)]
    struct MockSearchState {
        responses: HashMap<QueryTag, Vec<RawRecord>>,
        failing: Vec<QueryTag>,
        delays_ms: HashMap<QueryTag, u64>,
        truncated: HashMap<QueryTag, u64>,
        calls: Vec<QueryTag>,
    }

    impl MockSearchClient {
        fn new() -> Self {
            Self::default()
        }

        fn with_records(self, tag: QueryTag, records: Vec<RawRecord>) -> Self {
            self.state.lock().unwrap().responses.insert(tag, records);
            self
        }

        fn fail_on(self, tag: QueryTag) -> Self {
            self.state.lock().unwrap().failing.push(tag);
            self
        }

        fn delay(self, tag: QueryTag, ms: u64) -> Self {
            self.state.lock().unwrap().delays_ms.insert(tag, ms);
            self
        }

        fn truncate(self, tag: QueryTag, hits: u64) -> Self {
            self.state.lock().unwrap().truncated.insert(tag, hits);
            self
        }

        fn calls(&self) -> Vec<QueryTag> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    #[async_trait]
    impl SearchClient for MockSearchClient {
        async fn search(&self, query: &PlannedQuery, _window: &DateWindow) -> ProviderResult<SearchBatch> {
            let delay = {
                let mut state = self.state.lock().unwrap();
                state.calls.push(query.tag.clone());
                state.delays_ms.get(&query.tag).copied()
            };
            if let Some(ms) = delay {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }

            let state = self.state.lock().unwrap();
            if state.failing.contains(&query.tag) {
                return Err(ProviderError::Api {
                    status: 503,
                    message: format!("mock failure for {}", query.tag),
                });
            }
            Ok(SearchBatch {
                records: state.responses.get(&query.tag).cloned().unwrap_or_default(),
                truncated: state.truncated.get(&query.tag).copied().unwrap_or_default(),
            })
        }

        fn name(&self) -> &str {
            "MockSearchClient"
        }
    }

    // ===== Test Helper Functions =====

    fn raw(id: &str) -> RawRecord {
        RawRecord {
            identifier: vec![format!("arXiv:{id}")],
            ..RawRecord::default()
        }
    }

    fn plan() -> QueryPlan {
        let mut config = DigestConfig::default();
        config.queries.search_keywords = vec!["gyrochronology".to_string(), "lithium".to_string()];
        QueryPlan::from_config(&config)
    }

    fn window() -> DateWindow {
        DateWindow::ending(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(), 7)
    }

    fn paper(id: &str, tag: QueryTag) -> Paper {
        let mut p = Paper::new(id);
        p.source_queries.insert(tag);
        p
    }

    // ===== Deduplicator =====

    #[test]
    fn test_same_record_from_two_queries_merges_tags() {
        let a = QueryTag::CategoryScan;
        let b = QueryTag::keyword("lithium");
        let papers = Deduplicator::merge(vec![vec![paper("2401.1", a.clone())], vec![paper("2401.1", b.clone())]]);

        assert_eq!(papers.len(), 1);
        let merged = &papers["2401.1"];
        assert!(merged.source_queries.contains(&a));
        assert!(merged.source_queries.contains(&b));
    }

    #[test]
    fn test_merge_fills_fields_from_either_side() {
        let a = QueryTag::keyword("a");
        let b = QueryTag::keyword("b");

        let mut first = paper("2024.12345", a.clone());
        first.title = "X".to_string();
        let mut second = paper("2024.12345", b.clone());
        second.abstract_text = "Y discusses gyrochronology".to_string();

        let forward = Deduplicator::merge(vec![vec![first.clone()], vec![second.clone()]]);
        let backward = Deduplicator::merge(vec![vec![second], vec![first]]);

        assert_eq!(forward, backward);
        let merged = &forward["2024.12345"];
        assert_eq!(merged.title, "X");
        assert_eq!(merged.abstract_text, "Y discusses gyrochronology");
        assert_eq!(merged.source_queries.len(), 2);
    }

    #[test]
    fn test_first_seen_value_wins() {
        let mut first = paper("x", QueryTag::CategoryScan);
        first.title = "First".to_string();
        let mut second = paper("x", QueryTag::keyword("k"));
        second.title = "Second".to_string();

        let papers = Deduplicator::merge(vec![vec![first], vec![second]]);
        assert_eq!(papers["x"].title, "First");
    }

    #[test]
    fn test_default_category_is_replaced_by_real_one() {
        let mut first = paper("x", QueryTag::CategoryScan);
        first.category = DEFAULT_CATEGORY.to_string();
        let mut second = paper("x", QueryTag::keyword("k"));
        second.category = "astro-ph.EP".to_string();

        let papers = Deduplicator::merge(vec![vec![first], vec![second]]);
        assert_eq!(papers["x"].category, "astro-ph.EP");
    }

    #[test]
    fn test_author_ids_are_unioned() {
        let mut first = paper("x", QueryTag::CategoryScan);
        first.author_ids.insert("0000-0000-0000-0001".to_string());
        let mut second = paper("x", QueryTag::keyword("k"));
        second.author_ids.insert("0000-0000-0000-0002".to_string());

        let papers = Deduplicator::merge(vec![vec![first], vec![second]]);
        assert_eq!(papers["x"].author_ids.len(), 2);
    }

    #[test]
    fn test_dedup_counts_merges() {
        let mut dedup = Deduplicator::new();
        assert!(!dedup.insert(paper("a", QueryTag::CategoryScan)));
        assert!(dedup.insert(paper("a", QueryTag::keyword("k"))));
        assert!(!dedup.insert(paper("b", QueryTag::CategoryScan)));
        assert_eq!(dedup.len(), 2);
        assert_eq!(dedup.duplicates_merged(), 1);
    }

    // ===== Pipeline =====

    #[tokio::test]
    async fn test_run_merges_across_queries() {
        let client = MockSearchClient::new()
            .with_records(QueryTag::CategoryScan, vec![raw("2401.00001"), raw("2401.00002")])
            .with_records(QueryTag::keyword("lithium"), vec![raw("2401.00002"), raw("2401.00003")]);

        let pipeline = IngestionPipeline::new(client.clone(), PartialFailurePolicy::Abort);
        let output = pipeline.run(&plan(), &window()).await.unwrap();

        assert_eq!(output.papers.len(), 3);
        assert_eq!(output.stats.queries_run, 3);
        assert_eq!(output.stats.records_seen, 4);
        assert_eq!(output.stats.duplicates_merged, 1);
        assert_eq!(output.stats.unique_papers, 3);
        assert_eq!(client.calls().len(), 3);

        let shared = &output.papers["2401.00002"];
        assert!(shared.source_queries.contains(&QueryTag::CategoryScan));
        assert!(shared.source_queries.contains(&QueryTag::keyword("lithium")));
    }

    #[tokio::test]
    async fn test_merge_ignores_completion_order() {
        let mut early = raw("2401.00001");
        early.title = vec!["From category scan".to_string()];
        let mut late = raw("2401.00001");
        late.title = vec!["From keyword query".to_string()];

        // The category scan finishes last but still wins the title.
        let client = MockSearchClient::new()
            .with_records(QueryTag::CategoryScan, vec![early])
            .with_records(QueryTag::keyword("gyrochronology"), vec![late])
            .delay(QueryTag::CategoryScan, 50);

        let pipeline = IngestionPipeline::new(client, PartialFailurePolicy::Abort);
        let output = pipeline.run(&plan(), &window()).await.unwrap();
        assert_eq!(output.papers["2401.00001"].title, "From category scan");
    }

    #[tokio::test]
    async fn test_malformed_records_are_dropped() {
        let client = MockSearchClient::new()
            .with_records(QueryTag::CategoryScan, vec![raw("2401.00001"), RawRecord::default()]);

        let pipeline = IngestionPipeline::new(client, PartialFailurePolicy::Abort);
        let output = pipeline.run(&plan(), &window()).await.unwrap();
        assert_eq!(output.papers.len(), 1);
        assert_eq!(output.stats.malformed_dropped, 1);
    }

    #[tokio::test]
    async fn test_capped_results_are_counted() {
        let client = MockSearchClient::new()
            .with_records(QueryTag::CategoryScan, vec![raw("2401.00001"), raw("2401.00002")])
            .truncate(QueryTag::CategoryScan, 40)
            .truncate(QueryTag::keyword("lithium"), 2);

        let pipeline = IngestionPipeline::new(client, PartialFailurePolicy::Abort);
        let output = pipeline.run(&plan(), &window()).await.unwrap();
        assert_eq!(output.papers.len(), 2);
        assert_eq!(output.stats.records_seen, 2);
        assert_eq!(output.stats.records_truncated, 42);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_on_partial_failure() {
        let client = MockSearchClient::new()
            .with_records(QueryTag::CategoryScan, vec![raw("2401.00001")])
            .fail_on(QueryTag::keyword("lithium"));

        let pipeline = IngestionPipeline::new(client, PartialFailurePolicy::Abort);
        let err = pipeline.run(&plan(), &window()).await.unwrap_err();
        match err {
            IngestionError::QueryFailed { tag, .. } => assert_eq!(tag, QueryTag::keyword("lithium")),
            other => panic!("expected QueryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_proceed_policy_keeps_successful_results() {
        let client = MockSearchClient::new()
            .with_records(QueryTag::CategoryScan, vec![raw("2401.00001")])
            .fail_on(QueryTag::keyword("lithium"));

        let pipeline = IngestionPipeline::new(client, PartialFailurePolicy::Proceed);
        let output = pipeline.run(&plan(), &window()).await.unwrap();
        assert_eq!(output.papers.len(), 1);
        assert_eq!(output.stats.queries_failed, 1);
        assert_eq!(output.stats.queries_run, 2);
    }

    #[tokio::test]
    async fn test_all_queries_failing_is_fatal_under_any_policy() {
        for policy in [PartialFailurePolicy::Abort, PartialFailurePolicy::Proceed] {
            let client = MockSearchClient::new()
                .fail_on(QueryTag::CategoryScan)
                .fail_on(QueryTag::keyword("gyrochronology"))
                .fail_on(QueryTag::keyword("lithium"));

            let pipeline = IngestionPipeline::new(client, policy);
            let err = pipeline.run(&plan(), &window()).await.unwrap_err();
            assert!(matches!(err, IngestionError::AllQueriesFailed { attempted: 3, .. }));
        }
    }

    #[tokio::test]
    async fn test_empty_results_are_not_an_error() {
        let pipeline = IngestionPipeline::new(MockSearchClient::new(), PartialFailurePolicy::Abort);
        let output = pipeline.run(&plan(), &window()).await.unwrap();
        assert!(output.papers.is_empty());
        assert_eq!(output.stats.unique_papers, 0);
    }

    #[tokio::test]
    async fn test_empty_plan_yields_empty_output() {
        let pipeline = IngestionPipeline::new(MockSearchClient::new(), PartialFailurePolicy::Abort);
        let output = pipeline.run(&QueryPlan::default(), &window()).await.unwrap();
        assert!(output.papers.is_empty());
        assert_eq!(output.stats, IngestionStats::default());
    }
}
