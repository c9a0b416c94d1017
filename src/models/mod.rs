//! Core data models for the astro digest pipeline.
//!
//! This module contains the structures passed between pipeline stages:
//! the canonical [`Paper`], the tag naming which query surfaced it, and the
//! scored form consumed by the digest assembler.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::TierThresholds;

/// A single author as listed on a paper.
///
/// The ORCID and affiliation are only known when the provider aligns them
/// with the author list; otherwise they stay `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    /// Display name, as printed by the provider (e.g. "Doe, Jane")
    pub name: String,

    /// Persistent author identifier at this position, if resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,

    /// Affiliation string at this position, if the provider listed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

impl Author {
    /// Create an author without a resolved identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            orcid: None,
            affiliation: None,
        }
    }

    /// Attach a resolved ORCID.
    pub fn with_orcid(mut self, orcid: impl Into<String>) -> Self {
        self.orcid = Some(orcid.into());
        self
    }

    /// Attach an affiliation.
    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }
}

/// Tag naming the query that surfaced a record.
///
/// Rendered as `category-scan`, `keyword:<phrase>`, `author:<orcid>` or
/// `institution`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum QueryTag {
    /// Every paper in the configured subject classes
    CategoryScan,

    /// Papers matching one search phrase
    Keyword(String),

    /// Papers claimed by one priority author
    PriorityAuthor(String),

    /// Papers with an author affiliated with the configured institution
    Institution,
}

impl QueryTag {
    /// Convenience constructor for keyword tags.
    pub fn keyword(phrase: impl Into<String>) -> Self {
        QueryTag::Keyword(phrase.into())
    }

    /// Whether this tag came from a keyword query.
    pub fn is_keyword(&self) -> bool {
        matches!(self, QueryTag::Keyword(_))
    }
}

impl fmt::Display for QueryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTag::CategoryScan => f.write_str("category-scan"),
            QueryTag::Keyword(phrase) => write!(f, "keyword:{phrase}"),
            QueryTag::PriorityAuthor(orcid) => write!(f, "author:{orcid}"),
            QueryTag::Institution => f.write_str("institution"),
        }
    }
}

impl FromStr for QueryTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category-scan" => return Ok(QueryTag::CategoryScan),
            "institution" => return Ok(QueryTag::Institution),
            _ => {}
        }
        if let Some(phrase) = s.strip_prefix("keyword:") {
            return Ok(QueryTag::Keyword(phrase.to_string()));
        }
        if let Some(orcid) = s.strip_prefix("author:") {
            return Ok(QueryTag::PriorityAuthor(orcid.to_string()));
        }
        Err(format!("unknown query tag '{s}'"))
    }
}

impl From<QueryTag> for String {
    fn from(tag: QueryTag) -> Self {
        tag.to_string()
    }
}

impl TryFrom<String> for QueryTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Canonical paper record, produced by the normalizer and merged by the
/// deduplicator.
///
/// Every field other than `identifier` may be empty; downstream stages never
/// see a missing required field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Deduplication key: arXiv id when known, bibcode otherwise
    pub identifier: String,

    /// Paper title
    pub title: String,

    /// Abstract text, never truncated by the pipeline
    pub abstract_text: String,

    /// Authors in publication order
    pub authors: Vec<Author>,

    /// Every persistent author identifier attached to the record
    pub author_ids: BTreeSet<String>,

    /// Primary subject class (e.g. "astro-ph.SR")
    pub category: String,

    /// Publication date, if the provider supplied a usable one
    pub published_date: Option<NaiveDate>,

    /// Queries that surfaced this paper
    pub source_queries: BTreeSet<QueryTag>,

    /// arXiv identifier without the `arXiv:` prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arxiv_id: Option<String>,

    /// ADS bibliographic code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bibcode: Option<String>,
}

impl Paper {
    /// Create an otherwise empty paper with the given identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: String::new(),
            abstract_text: String::new(),
            authors: Vec::new(),
            author_ids: BTreeSet::new(),
            category: String::new(),
            published_date: None,
            source_queries: BTreeSet::new(),
            arxiv_id: None,
            bibcode: None,
        }
    }

    /// Link to the paper: the arXiv abstract page when an arXiv id is known,
    /// the ADS abstract page otherwise.
    pub fn url(&self) -> String {
        match (&self.arxiv_id, &self.bibcode) {
            (Some(arxiv_id), _) => format!("https://arxiv.org/abs/{arxiv_id}"),
            (None, Some(bibcode)) => format!("https://ui.adsabs.harvard.edu/abs/{bibcode}"),
            (None, None) => format!("https://ui.adsabs.harvard.edu/abs/{}", self.identifier),
        }
    }

    /// Author display names in publication order.
    pub fn author_names(&self) -> impl Iterator<Item = &str> {
        self.authors.iter().map(|a| a.name.as_str())
    }

    /// True when the only query that surfaced this paper was the category scan.
    pub fn is_category_only(&self) -> bool {
        self.source_queries.len() == 1 && self.source_queries.contains(&QueryTag::CategoryScan)
    }
}

/// Discrete relevance bucket.
///
/// Variants are declared from least to most relevant so the derived
/// ordering ranks `VeryRelevant` highest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelevanceTier {
    /// Below every threshold
    General,

    /// At least the lowest threshold
    SomewhatRelevant,

    /// At least the middle threshold
    Relevant,

    /// At least the top threshold, or written by a priority author
    VeryRelevant,
}

impl RelevanceTier {
    /// All tiers, most relevant first.
    pub const ALL: [RelevanceTier; 4] = [
        RelevanceTier::VeryRelevant,
        RelevanceTier::Relevant,
        RelevanceTier::SomewhatRelevant,
        RelevanceTier::General,
    ];

    /// Determine the tier for an accumulated score.
    ///
    /// Thresholds are inclusive lower bounds; the same score always maps to
    /// the same tier.
    pub fn from_score(score: f64, thresholds: &TierThresholds) -> Self {
        if score >= thresholds.very_relevant {
            RelevanceTier::VeryRelevant
        } else if score >= thresholds.relevant {
            RelevanceTier::Relevant
        } else if score >= thresholds.somewhat_relevant {
            RelevanceTier::SomewhatRelevant
        } else {
            RelevanceTier::General
        }
    }

    /// Human-readable label used in rendered output.
    pub fn label(self) -> &'static str {
        match self {
            RelevanceTier::VeryRelevant => "VERY RELEVANT",
            RelevanceTier::Relevant => "RELEVANT",
            RelevanceTier::SomewhatRelevant => "SOMEWHAT RELEVANT",
            RelevanceTier::General => "GENERAL",
        }
    }

    /// Lowercase label for summary lines.
    pub fn summary_label(self) -> &'static str {
        match self {
            RelevanceTier::VeryRelevant => "very relevant",
            RelevanceTier::Relevant => "relevant",
            RelevanceTier::SomewhatRelevant => "somewhat relevant",
            RelevanceTier::General => "general",
        }
    }
}

impl fmt::Display for RelevanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a priority author was recognised.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriorityMatch {
    /// A persistent identifier on the paper is in the priority set
    Identifier,

    /// No identifiers were resolved; an author name matched lexically.
    /// Lower confidence than [`PriorityMatch::Identifier`].
    NameFallback,
}

/// A paper together with its relevance assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPaper {
    /// The merged paper
    pub paper: Paper,

    /// Accumulated non-negative score
    pub score: f64,

    /// Tier derived from the score and priority floor
    pub tier: RelevanceTier,

    /// Whether a priority author was found
    pub is_priority_author: bool,

    /// How the priority author was found, if at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_match: Option<PriorityMatch>,

    /// Display names of the matched priority authors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priority_authors: Vec<String>,

    /// Display names of authors affiliated with the configured institution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub institution_authors: Vec<String>,
}

impl ScoredPaper {
    /// Whether an author of the configured institution was found.
    pub fn has_institution_author(&self) -> bool {
        !self.institution_authors.is_empty()
    }
}
