//! Layered configuration loading for the digest using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Legacy environment variables (`ADS_API_KEY`, `DAYS_BACK`, `SMTP_SERVER`,
//!    `SMTP_PORT`, `SENDER_EMAIL`, `SENDER_PASSWORD`, `RECIPIENT_EMAIL`)
//! 2. Environment variables (`ASTRO_DIGEST_*` prefix, `__` as separator)
//! 3. A file passed on the command line (`--config`)
//! 4. `astro-digest.toml` in the working directory
//! 5. Built-in defaults
//!
//! Figment maps `ASTRO_DIGEST_WEIGHTS__HIGH_VALUE` -> `weights.high_value`,
//! `ASTRO_DIGEST_QUERIES__ON_FAILURE` -> `queries.on_failure`, etc.
//!
//! The loaded [`DigestConfig`] is immutable for the rest of the run; the
//! scorer and assembler take it by reference.

pub mod defaults;

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Project-local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "astro-digest.toml";

/// Largest accepted date window, in days.
pub const MAX_DAYS_BACK: u32 = 3650;

/// Prefix for structured environment overrides.
pub const ENV_PREFIX: &str = "ASTRO_DIGEST_";

/// Unprefixed variables honoured for existing deployments, with the key each
/// one maps to.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("ADS_API_KEY", "ads.api_key"),
    ("DAYS_BACK", "days_back"),
    ("SMTP_SERVER", "smtp.server"),
    ("SMTP_PORT", "smtp.port"),
    ("SENDER_EMAIL", "smtp.sender"),
    ("SENDER_PASSWORD", "smtp.password"),
    ("RECIPIENT_EMAIL", "smtp.recipient"),
];

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Figment extraction or merge error.
    #[error("Configuration error: {0}")]
    Figment(#[from] figment::Error),

    /// A configuration field has an invalid value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// An author whose papers always go to the top of the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityAuthor {
    /// ORCID iD, e.g. `0000-0002-1825-0097`
    pub orcid: String,

    /// Display name, used for the lexical fallback when a record carries no
    /// resolved identifiers
    #[serde(default)]
    pub name: String,
}

/// An institution whose authors are flagged in the digest.
///
/// An affiliation belongs to the institution when it contains none of the
/// `exclude` substrings and matches one of the `include` patterns. The
/// exclusions run first, so an ambiguous abbreviation in `include` (say
/// `UW`) can be ruled out for a look-alike institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionConfig {
    /// Label shown next to matched authors, e.g. "UW-Madison"
    pub name: String,

    /// Case-insensitive regular expressions
    pub include: Vec<String>,

    /// Case-insensitive substrings that disqualify an affiliation
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Phrases for the ADS `aff:` search; no institution query when empty
    #[serde(default)]
    pub query_phrases: Vec<String>,
}

/// Research interests driving the relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterestConfig {
    /// Ordered general topic keywords
    pub general_keywords: Vec<String>,

    /// Keywords that mark a paper as squarely on-topic
    pub high_value_keywords: Vec<String>,

    /// Priority authors
    pub priority_authors: Vec<PriorityAuthor>,

    /// Institution whose authors are flagged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<InstitutionConfig>,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            general_keywords: defaults::owned(defaults::GENERAL_KEYWORDS),
            high_value_keywords: defaults::owned(defaults::HIGH_VALUE_KEYWORDS),
            priority_authors: Vec::new(),
            institution: None,
        }
    }
}

/// Per-factor score contributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Added once when a priority author is found
    pub priority_author: f64,

    /// Per distinct high-value keyword matched in the abstract
    pub high_value: f64,

    /// Per distinct high-value keyword matched in the title
    pub high_value_title: f64,

    /// Per distinct general keyword matched in the abstract
    pub general: f64,

    /// Per distinct general keyword matched in the title
    pub general_title: f64,

    /// Added once when an author of the configured institution is found
    pub institution_author: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            priority_author: 25.0,
            high_value: 10.0,
            high_value_title: 15.0,
            general: 3.0,
            general_title: 5.0,
            institution_author: 0.0,
        }
    }
}

/// Inclusive lower score bounds for each tier above GENERAL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub very_relevant: f64,
    pub relevant: f64,
    pub somewhat_relevant: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            very_relevant: 20.0,
            relevant: 10.0,
            somewhat_relevant: 2.0,
        }
    }
}

/// What to do when some, but not all, search queries fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// Fail the run on the first failed query
    #[default]
    Abort,

    /// Log the failures and build the digest from the queries that succeeded
    Proceed,
}

/// Which queries the search plan issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Subject classes; every query is restricted to them
    pub categories: Vec<String>,

    /// Issue the category scan (all papers in `categories`)
    pub category_scan: bool,

    /// One keyword query per phrase, in this order
    pub search_keywords: Vec<String>,

    /// Issue one query per priority author ORCID
    pub priority_author_queries: bool,

    /// Issue the affiliation query when an institution is configured
    pub institution_query: bool,

    /// Partial failure policy
    pub on_failure: PartialFailurePolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            categories: defaults::owned(defaults::CATEGORIES),
            category_scan: true,
            search_keywords: defaults::owned(defaults::HIGH_VALUE_KEYWORDS),
            priority_author_queries: true,
            institution_query: true,
            on_failure: PartialFailurePolicy::default(),
        }
    }
}

/// NASA ADS search API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsConfig {
    /// Search endpoint
    pub api_url: String,

    /// Bearer token
    pub api_key: Option<String>,

    /// Records requested per page
    pub rows: u32,

    /// Upper bound on records fetched for one query
    pub max_records: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Optional filter query (`fq`), e.g. `database:astronomy`
    pub filter: Option<String>,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.adsabs.harvard.edu/v1/search/query".to_string(),
            api_key: None,
            rows: 200,
            max_records: 1000,
            timeout_secs: 30,
            filter: None,
        }
    }
}

/// Outbound mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,

    /// Login name; falls back to `sender`
    pub username: Option<String>,
    pub password: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            sender: None,
            recipient: None,
        }
    }
}

impl SmtpConfig {
    /// Whether enough is set to actually send mail.
    pub fn is_configured(&self) -> bool {
        [&self.sender, &self.password, &self.recipient]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Login name used for SMTP authentication.
    pub fn login(&self) -> Option<&str> {
        self.username.as_deref().or(self.sender.as_deref())
    }
}

/// Presentation options for the assembled digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Heading used by the renderer
    pub heading: String,

    /// Cap on papers shown; tallies always cover the full set
    pub max_papers: Option<usize>,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            heading: "Astro-ph Topic Digest".to_string(),
            max_papers: None,
        }
    }
}

/// Complete, validated configuration for one digest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Size of the date window, ending today
    pub days_back: u32,
    pub interests: InterestConfig,
    pub weights: ScoringWeights,
    pub thresholds: TierThresholds,
    pub queries: QueryConfig,
    pub ads: AdsConfig,
    pub smtp: SmtpConfig,
    pub presentation: PresentationConfig,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            days_back: 1,
            interests: InterestConfig::default(),
            weights: ScoringWeights::default(),
            thresholds: TierThresholds::default(),
            queries: QueryConfig::default(),
            ads: AdsConfig::default(),
            smtp: SmtpConfig::default(),
            presentation: PresentationConfig::default(),
        }
    }
}

impl DigestConfig {
    /// Load and validate configuration from every source.
    ///
    /// Does NOT read `.env`; use [`DigestConfig::load_with_dotenv`] for that.
    pub fn load(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(extra_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env` from the working directory (if present), then [`load`](Self::load).
    pub fn load_with_dotenv(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load(extra_file)
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment or layer providers on top.
    pub fn figment(extra_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let local_path = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        if let Some(path) = extra_file {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Self::legacy_env())
    }

    fn legacy_env() -> Env {
        let names: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
        Env::raw().only(&names).map(|key| {
            LEGACY_ENV
                .iter()
                .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                .map(|(_, target)| *target)
                .unwrap_or("unmapped")
                .into()
        })
    }

    /// Reject configurations that would make scoring or planning meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_DAYS_BACK).contains(&self.days_back) {
            return Err(ConfigError::invalid(
                "days_back",
                format!("must be between 1 and {MAX_DAYS_BACK}, got {}", self.days_back),
            ));
        }

        let w = &self.weights;
        for (field, value) in [
            ("weights.priority_author", w.priority_author),
            ("weights.high_value", w.high_value),
            ("weights.high_value_title", w.high_value_title),
            ("weights.general", w.general),
            ("weights.general_title", w.general_title),
            ("weights.institution_author", w.institution_author),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, format!("must be a non-negative number, got {value}")));
            }
        }
        if w.high_value_title < w.high_value {
            return Err(ConfigError::invalid(
                "weights.high_value_title",
                "must not be lower than weights.high_value",
            ));
        }
        if w.general_title < w.general {
            return Err(ConfigError::invalid(
                "weights.general_title",
                "must not be lower than weights.general",
            ));
        }

        let t = &self.thresholds;
        if ![t.very_relevant, t.relevant, t.somewhat_relevant]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
        {
            return Err(ConfigError::invalid("thresholds", "must be non-negative numbers"));
        }
        if !(t.very_relevant > t.relevant && t.relevant > t.somewhat_relevant) {
            return Err(ConfigError::invalid(
                "thresholds",
                format!(
                    "must be strictly decreasing (very_relevant {} > relevant {} > somewhat_relevant {})",
                    t.very_relevant, t.relevant, t.somewhat_relevant
                ),
            ));
        }

        if let Some(author) = self
            .interests
            .priority_authors
            .iter()
            .find(|a| a.orcid.trim().is_empty())
        {
            return Err(ConfigError::invalid(
                "interests.priority_authors",
                format!("author '{}' has an empty orcid", author.name),
            ));
        }

        if let Some(institution) = &self.interests.institution {
            if institution.name.trim().is_empty() {
                return Err(ConfigError::invalid("interests.institution.name", "must not be empty"));
            }
            if institution.include.is_empty() {
                return Err(ConfigError::invalid(
                    "interests.institution.include",
                    "needs at least one pattern",
                ));
            }
            for pattern in &institution.include {
                if let Err(e) = Regex::new(pattern) {
                    return Err(ConfigError::invalid(
                        "interests.institution.include",
                        format!("invalid pattern '{pattern}': {e}"),
                    ));
                }
            }
        }

        let q = &self.queries;
        if q.category_scan && q.categories.is_empty() {
            return Err(ConfigError::invalid(
                "queries.categories",
                "the category scan needs at least one category",
            ));
        }
        let author_queries =
            q.priority_author_queries && !self.interests.priority_authors.is_empty();
        let institution_query = q.institution_query
            && self
                .interests
                .institution
                .as_ref()
                .is_some_and(|i| !i.query_phrases.is_empty());
        if !q.category_scan && q.search_keywords.is_empty() && !author_queries && !institution_query {
            return Err(ConfigError::invalid("queries", "no queries would be issued"));
        }

        if self.ads.rows == 0 {
            return Err(ConfigError::invalid("ads.rows", "must be at least 1"));
        }
        if self.presentation.max_papers == Some(0) {
            return Err(ConfigError::invalid("presentation.max_papers", "must be at least 1 when set"));
        }

        Ok(())
    }
}
