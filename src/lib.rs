//! Astro Digest - a relevance-ranked digest of recent astronomy papers.
//!
//! This library provides the core of the digest job: it searches NASA ADS
//! for recent papers, merges the overlapping result lists, scores every
//! paper against configured research interests and assembles a ranked,
//! grouped digest ready to be rendered and mailed.
//!
//! # Architecture
//!
//! The system is organized into several key modules:
//!
//! - **config**: Layered configuration (defaults, TOML, environment)
//! - **models**: Core data structures (Paper, QueryTag, ScoredPaper, etc.)
//! - **query**: Date window and the ordered query plan
//! - **provider**: Search client trait and the ADS implementation
//! - **normalize**: Raw record to canonical Paper
//! - **ingestion**: Concurrent fetch, failure policy and deduplication
//! - **scoring**: Relevance scorer, tiers and the institution affiliation matcher
//! - **digest**: Ordering, grouping and tallying
//! - **render**: Subject, plain-text and HTML bodies
//! - **mailer**: SMTP delivery
//!
//! # Workflow
//!
//! 1. Build the query plan and date window from configuration
//! 2. Run every query and buffer the raw records
//! 3. Normalize records and merge them by identifier
//! 4. Score each merged paper
//! 5. Sort, group and tally into a digest
//! 6. Render and send
//!
//! # Example
//!
//! ```ignore
//! use astro_digest::{build_digest, config::DigestConfig, provider::ads::AdsClient, query::DateWindow};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DigestConfig::load_with_dotenv(None)?;
//!     let client = AdsClient::new(&config.ads)?;
//!     let window = DateWindow::ending_today(config.days_back);
//!
//!     let (digest, _stats) = build_digest(&config, client, &window).await?;
//!     println!("{}", digest.summary());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod config;
pub mod digest;
pub mod ingestion;
pub mod mailer;
pub mod models;
pub mod normalize;
pub mod provider;
pub mod query;
pub mod render;
pub mod scoring;

// Re-export commonly used types at the crate root
pub use config::DigestConfig;
pub use digest::{Digest, DigestAssembler, TierCounts};
pub use ingestion::{Deduplicator, IngestionPipeline, IngestionStats};
pub use models::{Author, Paper, QueryTag, RelevanceTier, ScoredPaper};
pub use provider::{SearchBatch, SearchClient};
pub use query::{DateWindow, QueryPlan};
pub use scoring::RelevanceScorer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the full core pipeline: plan, fetch, merge, score and assemble.
///
/// # Errors
/// Returns `IngestionError` when the failure policy rejects the query
/// outcomes.
pub async fn build_digest<C>(
    config: &DigestConfig,
    client: C,
    window: &DateWindow,
) -> ingestion::IngestionResult<(Digest, IngestionStats)>
where
    C: SearchClient,
{
    let plan = QueryPlan::from_config(config);
    let pipeline = IngestionPipeline::new(client, config.queries.on_failure);
    let output = pipeline.run(&plan, window).await?;

    let scorer = RelevanceScorer::new(config);
    let scored = scorer.score_all(output.papers.into_values());
    let digest = DigestAssembler::new(&config.presentation).assemble(scored);

    Ok((digest, output.stats))
}
