//! Relevance scoring.
//!
//! The scorer is built once from the run configuration and then applied to
//! every merged paper. Scoring is additive, in a fixed order:
//!
//! 1. priority author bonus (identifier match, else name fallback)
//! 2. high-value keywords, once per distinct keyword
//! 3. general keywords that are not also high-value, once per keyword
//! 4. institution author bonus, when an institution is configured
//!
//! A keyword found in the title contributes the title weight, otherwise an
//! abstract match contributes the abstract weight. Being in the configured
//! categories is worth nothing on its own.

use std::collections::{BTreeSet, HashSet};

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::config::{DigestConfig, InstitutionConfig, ScoringWeights, TierThresholds};
use crate::models::{Paper, PriorityMatch, RelevanceTier, ScoredPaper};
use crate::normalize::normalize_text;
use crate::query::unique_preserve;

/// Case-insensitive whole-word or phrase matcher for one keyword.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keyword: String,
    pattern: Regex,
}

impl KeywordMatcher {
    /// Compile a matcher. Returns `None` for blank keywords.
    ///
    /// Word boundaries are only required at edges that are alphanumeric, so
    /// `TTV` does not match inside `TTVs` while `spin-orbit` still matches
    /// `spin-orbit,`. Whitespace inside a phrase matches any whitespace run.
    pub fn new(keyword: &str) -> Option<Self> {
        let keyword = normalize_text(keyword);
        let first = keyword.chars().next()?;
        let last = keyword.chars().last()?;

        let body = keyword
            .split(' ')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        let start = if first.is_alphanumeric() { r"\b" } else { "" };
        let end = if last.is_alphanumeric() { r"\b" } else { "" };

        match Regex::new(&format!("(?i){start}{body}{end}")) {
            Ok(pattern) => Some(Self { keyword, pattern }),
            Err(e) => {
                warn!(keyword = %keyword, error = %e, "Skipping keyword that cannot be compiled");
                None
            }
        }
    }

    /// The normalized keyword.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Decides whether an affiliation string belongs to one institution.
#[derive(Debug, Clone)]
pub struct AffiliationMatcher {
    include: Regex,

    /// Normalized exclusion substrings
    exclude: Vec<String>,
}

impl AffiliationMatcher {
    /// Compile the include patterns into one case-insensitive expression.
    pub fn new(config: &InstitutionConfig) -> Result<Self, regex::Error> {
        let pattern = config
            .include
            .iter()
            .map(|p| format!("(?:{p})"))
            .collect::<Vec<_>>()
            .join("|");
        let include = RegexBuilder::new(&pattern).case_insensitive(true).build()?;
        let exclude = config
            .exclude
            .iter()
            .map(|e| normalize_text(e))
            .filter(|e| !e.is_empty())
            .collect();
        Ok(Self { include, exclude })
    }

    pub fn is_match(&self, affiliation: &str) -> bool {
        let normalized = normalize_text(affiliation);
        if normalized.is_empty() || self.exclude.iter().any(|e| normalized.contains(e.as_str())) {
            return false;
        }
        self.include.is_match(affiliation)
    }
}

/// Scores merged papers against the configured interests.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    weights: ScoringWeights,
    thresholds: TierThresholds,
    high_value: Vec<KeywordMatcher>,
    general: Vec<KeywordMatcher>,
    priority_ids: BTreeSet<String>,

    /// Normalized priority author names for the fallback match
    priority_names: Vec<String>,

    /// Surname and initial of each priority author name
    priority_keys: Vec<NameKey>,

    institution: Option<AffiliationMatcher>,
}

impl RelevanceScorer {
    pub fn new(config: &DigestConfig) -> Self {
        let interests = &config.interests;

        let high_value_keywords = unique_preserve(interests.high_value_keywords.iter().map(String::as_str));
        let high_value_set: HashSet<String> = high_value_keywords.iter().map(|k| normalize_text(k)).collect();

        let high_value = high_value_keywords.iter().filter_map(|k| KeywordMatcher::new(k)).collect();
        let general = unique_preserve(interests.general_keywords.iter().map(String::as_str))
            .iter()
            .filter(|k| !high_value_set.contains(&normalize_text(k)))
            .filter_map(|k| KeywordMatcher::new(k))
            .collect();

        let priority_ids = interests
            .priority_authors
            .iter()
            .map(|a| a.orcid.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let priority_names = interests
            .priority_authors
            .iter()
            .map(|a| normalize_text(&a.name))
            .filter(|n| !n.is_empty())
            .collect();
        let priority_keys = interests
            .priority_authors
            .iter()
            .filter_map(|a| NameKey::parse(&a.name))
            .collect();

        let institution = interests.institution.as_ref().and_then(|inst| {
            AffiliationMatcher::new(inst)
                .map_err(|e| warn!(institution = %inst.name, error = %e, "Ignoring institution patterns"))
                .ok()
        });

        Self {
            weights: config.weights,
            thresholds: config.thresholds,
            high_value,
            general,
            priority_ids,
            priority_names,
            priority_keys,
            institution,
        }
    }

    /// Score one paper.
    pub fn score(&self, paper: &Paper) -> ScoredPaper {
        let mut score = 0.0;

        let (priority_match, priority_authors) = self.find_priority_authors(paper);
        if priority_match.is_some() {
            score += self.weights.priority_author;
        }

        score += keyword_score(
            &self.high_value,
            paper,
            self.weights.high_value_title,
            self.weights.high_value,
        );
        score += keyword_score(&self.general, paper, self.weights.general_title, self.weights.general);

        let institution_authors = self.find_institution_authors(paper);
        if !institution_authors.is_empty() {
            score += self.weights.institution_author;
        }

        let mut tier = RelevanceTier::from_score(score, &self.thresholds);
        if priority_match.is_some() {
            tier = tier.max(RelevanceTier::VeryRelevant);
        }

        ScoredPaper {
            paper: paper.clone(),
            score,
            tier,
            is_priority_author: priority_match.is_some(),
            priority_match,
            priority_authors,
            institution_authors,
        }
    }

    /// Score every paper, consuming them.
    pub fn score_all<I>(&self, papers: I) -> Vec<ScoredPaper>
    where
        I: IntoIterator<Item = Paper>,
    {
        papers.into_iter().map(|p| self.score(&p)).collect()
    }

    fn find_institution_authors(&self, paper: &Paper) -> Vec<String> {
        let Some(matcher) = &self.institution else {
            return Vec::new();
        };
        paper
            .authors
            .iter()
            .filter(|a| a.affiliation.as_deref().is_some_and(|aff| matcher.is_match(aff)))
            .map(|a| a.name.clone())
            .collect()
    }

    /// Lexical fallback: the configured name appears in the display name, or
    /// surname and first initial agree (see [`NameKey`]).
    fn is_priority_name(&self, display: &str) -> bool {
        let normalized = normalize_text(display);
        if self.priority_names.iter().any(|p| normalized.contains(p.as_str())) {
            return true;
        }
        NameKey::parse(display).is_some_and(|name| self.priority_keys.iter().any(|p| p.matches(&name)))
    }

    fn find_priority_authors(&self, paper: &Paper) -> (Option<PriorityMatch>, Vec<String>) {
        if !paper.author_ids.is_empty() {
            if paper.author_ids.is_disjoint(&self.priority_ids) {
                return (None, Vec::new());
            }
            // Names are only known when the ORCID lists were aligned.
            let names = paper
                .authors
                .iter()
                .filter(|a| a.orcid.as_ref().is_some_and(|id| self.priority_ids.contains(id)))
                .map(|a| a.name.clone())
                .collect();
            return (Some(PriorityMatch::Identifier), names);
        }

        let names: Vec<String> = paper
            .authors
            .iter()
            .filter(|a| self.is_priority_name(&a.name))
            .map(|a| a.name.clone())
            .collect();

        if names.is_empty() {
            (None, names)
        } else {
            (Some(PriorityMatch::NameFallback), names)
        }
    }
}

/// Surname and first initial of a person's name.
///
/// Accepts the ADS form `Surname, Given Middle` as well as `Given Surname`.
/// Two names match when the surnames are equal and, if the configured name
/// has a given name, the first initials agree. `Carberry, Josiah` therefore
/// matches `Carberry, J.` and `Josiah S. Carberry`, and also every other
/// J. Carberry: this is the lower-confidence fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NameKey {
    surname: String,
    initial: Option<char>,
}

impl NameKey {
    fn parse(name: &str) -> Option<Self> {
        let name = normalize_text(name);
        let (surname, given) = match name.split_once(',') {
            Some((surname, given)) => (surname.trim(), given.trim()),
            None => match name.rsplit_once(' ') {
                Some((given, surname)) => (surname, given),
                None => (name.as_str(), ""),
            },
        };

        let surname: String = surname
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '\'' || c.is_whitespace())
            .collect();
        if surname.trim().is_empty() {
            return None;
        }

        Some(Self {
            surname: surname.trim().to_string(),
            initial: given.chars().find(|c| c.is_alphabetic()),
        })
    }

    /// `self` is the configured name, `other` an author on a paper.
    fn matches(&self, other: &NameKey) -> bool {
        if self.surname != other.surname {
            return false;
        }
        match self.initial {
            Some(initial) => other.initial == Some(initial),
            None => true,
        }
    }
}

fn keyword_score(matchers: &[KeywordMatcher], paper: &Paper, title_weight: f64, abstract_weight: f64) -> f64 {
    matchers
        .iter()
        .map(|m| {
            if m.is_match(&paper.title) {
                title_weight
            } else if m.is_match(&paper.abstract_text) {
                abstract_weight
            } else {
                0.0
            }
        })
        .sum()
}
