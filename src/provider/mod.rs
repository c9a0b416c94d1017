//! Search provider module.
//!
//! This module defines the interface for fetching raw paper records for one
//! planned query and date window, and the raw record shape every provider
//! returns.
//!
//! The `SearchClient` trait abstracts the remote search service, allowing the
//! ingestion pipeline to run against NASA ADS in production and against
//! in-memory fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::{DateWindow, PlannedQuery};

pub mod ads;

/// Errors that can occur when fetching records from a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// API rate limit exceeded
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Failed to parse the response body
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid configuration (e.g. missing API token)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other provider-specific errors
    #[error("Provider error: {0}")]
    Other(String),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// A paper record exactly as the provider returned it.
///
/// Field names follow the ADS search API. Every field is optional; the
/// normalizer decides what is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub title: Vec<String>,

    #[serde(default)]
    pub author: Vec<String>,

    /// Affiliations aligned with `author`, `-` as placeholder
    #[serde(default)]
    pub aff: Vec<String>,

    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,

    #[serde(default)]
    pub bibcode: Option<String>,

    /// Alternate identifiers (`arXiv:2401.12345`, DOIs, other bibcodes)
    #[serde(default)]
    pub identifier: Vec<String>,

    /// `YYYY-MM-DD`, with `00` for unknown month or day
    #[serde(default)]
    pub pubdate: Option<String>,

    #[serde(default)]
    pub arxiv_class: Vec<String>,

    /// Publisher-supplied ORCIDs aligned with `author`, `-` as placeholder
    #[serde(default)]
    pub orcid_pub: Vec<String>,

    /// User-claimed ORCIDs aligned with `author`
    #[serde(default)]
    pub orcid_user: Vec<String>,

    /// ORCIDs from other sources aligned with `author`
    #[serde(default)]
    pub orcid_other: Vec<String>,
}

/// Records returned for one planned query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchBatch {
    pub records: Vec<RawRecord>,

    /// Hits the provider reported but that were not fetched because of the
    /// record cap
    pub truncated: u64,
}

impl SearchBatch {
    /// A batch holding every hit the provider reported.
    pub fn complete(records: Vec<RawRecord>) -> Self {
        Self { records, truncated: 0 }
    }
}

impl From<Vec<RawRecord>> for SearchBatch {
    fn from(records: Vec<RawRecord>) -> Self {
        Self::complete(records)
    }
}

/// Trait for fetching raw records from a bibliographic search service.
///
/// # Design Notes
///
/// - One call covers one planned query; the pipeline issues the calls and
///   buffers every result before merging.
/// - Implementations handle their own pagination and surface failures as
///   `ProviderError`; the pipeline never retries.
/// - Records are returned raw: normalization and deduplication happen
///   downstream.
/// - Hits dropped by a record cap are reported in
///   [`SearchBatch::truncated`], never discarded silently.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Fetch the records matching `query` inside `window`.
    ///
    /// # Errors
    /// Returns `ProviderError` if the request fails or the response cannot be
    /// parsed
    async fn search(&self, query: &PlannedQuery, window: &DateWindow) -> ProviderResult<SearchBatch>;

    /// Get a human-readable name of this provider, for logging.
    fn name(&self) -> &str;
}
