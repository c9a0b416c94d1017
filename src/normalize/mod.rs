//! Record normalization.
//!
//! Converts a raw provider record into the canonical [`Paper`]. Only the
//! identifier is required; every other missing field is defaulted so a
//! partial record still makes it into the digest.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{Author, Paper, QueryTag};
use crate::provider::RawRecord;

/// Category assigned when the record carries no subject class.
pub const DEFAULT_CATEGORY: &str = "astro-ph";

/// Prefix ADS puts in front of arXiv identifiers.
const ARXIV_PREFIX: &str = "arXiv:";

/// Placeholder ADS uses to keep ORCID and affiliation lists aligned with the
/// author list.
const PLACEHOLDER: &str = "-";

/// Errors raised while normalizing a single record.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The record has neither an arXiv id nor a bibcode
    #[error("Malformed record from query '{tag}': {reason}")]
    MalformedRecord { tag: QueryTag, reason: String },
}

/// Result type for normalization.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Normalizes text for display and matching.
///
/// Trims and collapses runs of whitespace (including line breaks) to a
/// single space. Case is preserved.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased form of [`clean_text`], for case-insensitive comparisons.
///
/// # Example
/// ```ignore
/// assert_eq!(normalize_text("  Hello   World  "), "hello world");
/// ```
pub fn normalize_text(text: &str) -> String {
    clean_text(text).to_lowercase()
}

/// Convert one raw record into a [`Paper`] tagged with the query that
/// produced it.
///
/// # Errors
/// Returns [`NormalizeError::MalformedRecord`] when no identifier can be
/// derived from the record.
pub fn normalize_record(raw: &RawRecord, tag: &QueryTag) -> NormalizeResult<Paper> {
    let arxiv_id = extract_arxiv_id(&raw.identifier);
    let bibcode = non_empty(raw.bibcode.as_deref());

    let identifier = arxiv_id
        .clone()
        .or_else(|| bibcode.clone())
        .ok_or_else(|| NormalizeError::MalformedRecord {
            tag: tag.clone(),
            reason: "record has no arXiv id or bibcode".to_string(),
        })?;

    let orcids = aligned_orcids(raw);
    let authors = raw
        .author
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let name = clean_text(name);
            if name.is_empty() {
                return None;
            }
            let mut author = Author::new(name);
            author.orcid = orcids.get(i).cloned().flatten();
            author.affiliation = raw.aff.get(i).and_then(|a| affiliation_value(a));
            Some(author)
        })
        .collect();

    let author_ids: BTreeSet<String> = [&raw.orcid_pub, &raw.orcid_user, &raw.orcid_other]
        .into_iter()
        .flatten()
        .filter_map(|v| orcid_value(v))
        .collect();

    let category = raw
        .arxiv_class
        .iter()
        .find_map(|c| non_empty(Some(c.as_str())))
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let mut paper = Paper::new(identifier);
    paper.title = raw.title.iter().map(|t| clean_text(t)).find(|t| !t.is_empty()).unwrap_or_default();
    paper.abstract_text = raw.abstract_text.as_deref().map(clean_text).unwrap_or_default();
    paper.authors = authors;
    paper.author_ids = author_ids;
    paper.category = category;
    paper.published_date = raw.pubdate.as_deref().and_then(parse_pubdate);
    paper.source_queries.insert(tag.clone());
    paper.arxiv_id = arxiv_id;
    paper.bibcode = bibcode;

    Ok(paper)
}

/// Parse an ADS `pubdate`.
///
/// ADS writes unknown months and days as `00` (`2024-03-00`); those
/// normalize to the first of the month or year.
pub fn parse_pubdate(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let mut parts = raw.get(..10).unwrap_or(raw).splitn(3, '-');

    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next().map_or(Some(1), |m| m.parse().ok())?;
    let day: u32 = parts.next().map_or(Some(1), |d| d.parse().ok())?;

    NaiveDate::from_ymd_opt(year, month.max(1), day.max(1))
}

/// Find the arXiv id among the record's identifiers.
fn extract_arxiv_id(identifiers: &[String]) -> Option<String> {
    identifiers
        .iter()
        .filter_map(|ident| ident.trim().strip_prefix(ARXIV_PREFIX))
        .find_map(|id| non_empty(Some(id)))
}

/// ORCIDs per author position: the first real value across the publisher,
/// user-claimed and other ORCID lists.
fn aligned_orcids(raw: &RawRecord) -> Vec<Option<String>> {
    let len = raw.author.len();
    (0..len)
        .map(|i| {
            [&raw.orcid_pub, &raw.orcid_user, &raw.orcid_other]
                .into_iter()
                .find_map(|list| list.get(i).and_then(|v| orcid_value(v)))
        })
        .collect()
}

fn orcid_value(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == PLACEHOLDER {
        None
    } else {
        Some(value.to_string())
    }
}

fn affiliation_value(value: &str) -> Option<String> {
    let value = clean_text(value);
    if value.is_empty() || value == PLACEHOLDER {
        None
    } else {
        Some(value)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RawRecord {
        RawRecord {
            title: vec!["Gyrochronology of   NGC 188".to_string()],
            author: vec!["Doe, Jane".to_string(), "Roe, Richard".to_string()],
            abstract_text: Some("We measure\nrotation periods.".to_string()),
            bibcode: Some("2024ApJ...970..1D".to_string()),
            identifier: vec![
                "2024ApJ...970..1D".to_string(),
                "arXiv:2401.12345".to_string(),
            ],
            pubdate: Some("2024-01-00".to_string()),
            arxiv_class: vec!["astro-ph.SR".to_string(), "astro-ph.EP".to_string()],
            orcid_pub: vec!["-".to_string(), "0000-0001-0000-0002".to_string()],
            orcid_user: vec!["0000-0001-0000-0001".to_string(), "-".to_string()],
            orcid_other: vec![],
            aff: vec!["Dept. of Astronomy,\n University of Wisconsin-Madison".to_string()],
        }
    }

    #[test]
    fn test_normalize_full_record() {
        let tag = QueryTag::CategoryScan;
        let paper = normalize_record(&record(), &tag).unwrap();

        assert_eq!(paper.identifier, "2401.12345");
        assert_eq!(paper.arxiv_id.as_deref(), Some("2401.12345"));
        assert_eq!(paper.bibcode.as_deref(), Some("2024ApJ...970..1D"));
        assert_eq!(paper.title, "Gyrochronology of NGC 188");
        assert_eq!(paper.abstract_text, "We measure rotation periods.");
        assert_eq!(paper.category, "astro-ph.SR");
        assert_eq!(paper.published_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(paper.source_queries.contains(&tag));
        assert_eq!(paper.author_ids.len(), 2);
        assert_eq!(paper.authors[0].orcid.as_deref(), Some("0000-0001-0000-0001"));
        assert_eq!(paper.authors[1].orcid.as_deref(), Some("0000-0001-0000-0002"));
        assert_eq!(
            paper.authors[0].affiliation.as_deref(),
            Some("Dept. of Astronomy, University of Wisconsin-Madison")
        );
        // Shorter affiliation list: the trailing author has none.
        assert!(paper.authors[1].affiliation.is_none());
    }

    #[test]
    fn test_affiliation_placeholder_is_dropped() {
        let mut raw = record();
        raw.aff = vec!["-".to_string(), "  Univ. of Washington ".to_string()];
        let paper = normalize_record(&raw, &QueryTag::CategoryScan).unwrap();
        assert!(paper.authors[0].affiliation.is_none());
        assert_eq!(paper.authors[1].affiliation.as_deref(), Some("Univ. of Washington"));
    }

    #[test]
    fn test_bibcode_used_when_no_arxiv_id() {
        let mut raw = record();
        raw.identifier = vec!["10.3847/xyz".to_string()];
        let paper = normalize_record(&raw, &QueryTag::CategoryScan).unwrap();
        assert_eq!(paper.identifier, "2024ApJ...970..1D");
        assert!(paper.arxiv_id.is_none());
    }

    #[test]
    fn test_missing_identifier_is_malformed() {
        let raw = RawRecord {
            title: vec!["No id".to_string()],
            bibcode: Some("   ".to_string()),
            ..RawRecord::default()
        };
        let err = normalize_record(&raw, &QueryTag::keyword("lithium")).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedRecord { .. }));
        assert!(err.to_string().contains("keyword:lithium"));
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let raw = RawRecord {
            bibcode: Some("2024MNRAS.1..2X".to_string()),
            ..RawRecord::default()
        };
        let paper = normalize_record(&raw, &QueryTag::CategoryScan).unwrap();
        assert_eq!(paper.title, "");
        assert_eq!(paper.abstract_text, "");
        assert!(paper.authors.is_empty());
        assert!(paper.author_ids.is_empty());
        assert_eq!(paper.category, DEFAULT_CATEGORY);
        assert!(paper.published_date.is_none());
    }

    #[test]
    fn test_abstract_is_not_truncated() {
        let mut raw = record();
        let long = "word ".repeat(2000);
        raw.abstract_text = Some(long.clone());
        let paper = normalize_record(&raw, &QueryTag::CategoryScan).unwrap();
        assert_eq!(paper.abstract_text, long.trim_end());
    }

    #[test]
    fn test_parse_pubdate_variants() {
        assert_eq!(parse_pubdate("2024-03-15"), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(parse_pubdate("2024-03-00"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_pubdate("2024-00-00"), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parse_pubdate("2024"), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parse_pubdate("not a date"), None);
        assert_eq!(parse_pubdate(""), None);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("Hello World"), "hello world");
        assert_eq!(normalize_text("  Multiple   Spaces  "), "multiple spaces");
        assert_eq!(normalize_text("UPPERCASE"), "uppercase");
        assert_eq!(normalize_text("   "), "");
    }
}
