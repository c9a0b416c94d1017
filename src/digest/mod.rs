//! Digest assembly.
//!
//! Orders scored papers, groups them by category and tallies the tiers. The
//! ordering is total, so the same set of papers always produces the same
//! digest regardless of the order they were handed in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::PresentationConfig;
use crate::models::{RelevanceTier, ScoredPaper};

/// Number of papers per tier, over the full deduplicated set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub very_relevant: usize,
    pub relevant: usize,
    pub somewhat_relevant: usize,
    pub general: usize,
}

impl TierCounts {
    /// Tally the tiers of `papers`.
    pub fn tally<'a>(papers: impl IntoIterator<Item = &'a ScoredPaper>) -> Self {
        let mut counts = Self::default();
        for paper in papers {
            *counts.slot(paper.tier) += 1;
        }
        counts
    }

    fn slot(&mut self, tier: RelevanceTier) -> &mut usize {
        match tier {
            RelevanceTier::VeryRelevant => &mut self.very_relevant,
            RelevanceTier::Relevant => &mut self.relevant,
            RelevanceTier::SomewhatRelevant => &mut self.somewhat_relevant,
            RelevanceTier::General => &mut self.general,
        }
    }

    pub fn get(&self, tier: RelevanceTier) -> usize {
        match tier {
            RelevanceTier::VeryRelevant => self.very_relevant,
            RelevanceTier::Relevant => self.relevant,
            RelevanceTier::SomewhatRelevant => self.somewhat_relevant,
            RelevanceTier::General => self.general,
        }
    }

    pub fn total(&self) -> usize {
        self.very_relevant + self.relevant + self.somewhat_relevant + self.general
    }

    /// One-line summary, e.g.
    /// `3 very relevant, 2 relevant, 1 somewhat relevant, 4 general (10 total)`.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = RelevanceTier::ALL
            .iter()
            .map(|tier| format!("{} {}", self.get(*tier), tier.summary_label()))
            .collect();
        format!("{} ({} total)", parts.join(", "), self.total())
    }
}

/// Papers of one category, in digest order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub category: String,
    pub papers: Vec<ScoredPaper>,
}

/// The assembled digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    /// Presented papers, globally ordered
    pub papers: Vec<ScoredPaper>,

    /// The presented papers grouped by category, categories in name order
    pub categories: Vec<CategoryGroup>,

    /// Per-tier counts over every paper, before any truncation
    pub tier_counts: TierCounts,

    /// Size of the deduplicated set
    pub total: usize,

    /// Papers left out by the presentation limit
    pub omitted: usize,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Summary line taken straight from the tally.
    pub fn summary(&self) -> String {
        self.tier_counts.summary()
    }
}

/// Builds a [`Digest`] from scored papers.
#[derive(Debug, Clone, Default)]
pub struct DigestAssembler {
    max_papers: Option<usize>,
}

impl DigestAssembler {
    pub fn new(presentation: &PresentationConfig) -> Self {
        Self {
            max_papers: presentation.max_papers,
        }
    }

    pub fn assemble(&self, mut papers: Vec<ScoredPaper>) -> Digest {
        let tier_counts = TierCounts::tally(&papers);
        let total = papers.len();

        papers.sort_by(digest_order);

        let mut omitted = 0;
        if let Some(limit) = self.max_papers {
            if papers.len() > limit {
                omitted = papers.len() - limit;
                papers.truncate(limit);
            }
        }

        let mut groups: BTreeMap<String, Vec<ScoredPaper>> = BTreeMap::new();
        for paper in &papers {
            groups
                .entry(paper.paper.category.clone())
                .or_default()
                .push(paper.clone());
        }
        let categories = groups
            .into_iter()
            .map(|(category, papers)| CategoryGroup { category, papers })
            .collect();

        Digest {
            papers,
            categories,
            tier_counts,
            total,
            omitted,
        }
    }
}

/// Priority first, then tier, score and recency (all descending), then
/// identifier ascending. Missing dates sort after every known date.
pub fn digest_order(a: &ScoredPaper, b: &ScoredPaper) -> Ordering {
    b.is_priority_author
        .cmp(&a.is_priority_author)
        .then_with(|| b.tier.cmp(&a.tier))
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| b.paper.published_date.cmp(&a.paper.published_date))
        .then_with(|| a.paper.identifier.cmp(&b.paper.identifier))
}
