//! Query planning.
//!
//! This module turns the configuration into the fixed, ordered list of
//! searches one run issues, and the date window they cover.
//!
//! # Plan order
//!
//! 1. the category scan (every paper in the configured subject classes)
//! 2. one keyword query per search phrase, in configured order
//! 3. one query per priority author ORCID, in configured order
//! 4. the institution affiliation query, when an institution is configured
//!
//! Each query carries its position in this order. The deduplicator merges
//! result lists by position, so the "first-seen" value of a field never
//! depends on which response arrived first.

use std::collections::HashSet;

use chrono::{Duration, Local, NaiveDate};

use crate::config::DigestConfig;
use crate::models::QueryTag;

/// Inclusive range of entry dates covered by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// First day (inclusive)
    pub start: NaiveDate,

    /// Last day (inclusive)
    pub end: NaiveDate,
}

impl DateWindow {
    /// Create a window of `days_back` days ending on `end`.
    ///
    /// The start saturates at the earliest representable date.
    pub fn ending(end: NaiveDate, days_back: u32) -> Self {
        let start = end
            .checked_sub_signed(Duration::days(i64::from(days_back)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// Create a window of `days_back` days ending today (local time).
    pub fn ending_today(days_back: u32) -> Self {
        Self::ending(Local::now().date_naive(), days_back)
    }

    /// Check if a date falls within this window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// ADS range syntax, e.g. `[2024-01-01 TO 2024-01-08]`.
    pub fn ads_range(&self) -> String {
        format!("[{} TO {}]", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }

    /// Human-readable form for rendered output, e.g. `January 01 - January 08, 2024`.
    pub fn display(&self) -> String {
        format!("{} - {}", self.start.format("%B %d"), self.end.format("%B %d, %Y"))
    }
}

/// One search in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    /// Position in the plan; lower positions win "first-seen" merges
    pub position: usize,

    /// Tag recorded on every paper this query surfaces
    pub tag: QueryTag,

    /// ADS query clause, without the date restriction
    pub clause: String,
}

impl PlannedQuery {
    /// Full ADS query string for the given window.
    pub fn ads_query(&self, window: &DateWindow) -> String {
        format!("{} AND entdate:{}", self.clause, window.ads_range())
    }
}

/// The ordered set of searches for one run.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    queries: Vec<PlannedQuery>,
}

impl QueryPlan {
    /// Build the plan from configuration.
    ///
    /// Blank and repeated (case-insensitive) keywords, ORCIDs and affiliation
    /// phrases are skipped.
    pub fn from_config(config: &DigestConfig) -> Self {
        let q = &config.queries;
        let restriction = category_clause(&q.categories);
        let mut plan = Self::default();

        if q.category_scan {
            if let Some(categories) = &restriction {
                plan.push(QueryTag::CategoryScan, categories.clone());
            }
        }

        for keyword in unique_preserve(q.search_keywords.iter().map(String::as_str)) {
            let phrase = escape_phrase(&keyword);
            let clause = format!(r#"(title:"{phrase}" OR abs:"{phrase}")"#);
            plan.push(QueryTag::Keyword(keyword), restrict(&restriction, clause));
        }

        if q.priority_author_queries {
            let orcids = config.interests.priority_authors.iter().map(|a| a.orcid.as_str());
            for orcid in unique_preserve(orcids) {
                let clause = format!("orcid:{orcid}");
                plan.push(QueryTag::PriorityAuthor(orcid), restrict(&restriction, clause));
            }
        }

        if q.institution_query {
            if let Some(institution) = &config.interests.institution {
                let phrases: Vec<String> = unique_preserve(institution.query_phrases.iter().map(String::as_str))
                    .iter()
                    .map(|p| format!(r#"aff:"{}""#, escape_phrase(p)))
                    .collect();
                if !phrases.is_empty() {
                    let clause = format!("({})", phrases.join(" OR "));
                    plan.push(QueryTag::Institution, restrict(&restriction, clause));
                }
            }
        }

        plan
    }

    fn push(&mut self, tag: QueryTag, clause: String) {
        let position = self.queries.len();
        self.queries.push(PlannedQuery { position, tag, clause });
    }

    /// Planned queries in plan order.
    pub fn queries(&self) -> &[PlannedQuery] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Escape a phrase for use inside an ADS double-quoted phrase query.
pub fn escape_phrase(phrase: &str) -> String {
    phrase.trim().replace('"', r#"\""#)
}

/// `(arxiv_class:"a" OR arxiv_class:"b")`, or `None` without categories.
fn category_clause(categories: &[String]) -> Option<String> {
    let parts: Vec<String> = unique_preserve(categories.iter().map(String::as_str))
        .into_iter()
        .map(|c| format!(r#"arxiv_class:"{}""#, escape_phrase(&c)))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(format!("({})", parts.join(" OR ")))
    }
}

fn restrict(restriction: &Option<String>, clause: String) -> String {
    match restriction {
        Some(categories) => format!("{categories} AND {clause}"),
        None => clause,
    }
}

/// Trimmed, non-empty values with case-insensitive repeats removed, in
/// first-seen order.
pub(crate) fn unique_preserve<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_lowercase()))
        .map(str::to_string)
        .collect()
}
