//! Knowledge items
//!
//! The citable unit of operating knowledge. The score and counts on an item
//! are written only by the aggregator; `version` increases on every write and
//! guards recomputes against lost updates.

use crate::attribution::Attribution;
use crate::ids::KnowledgeItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    Product,
    Technique,
    ToolMethod,
    Combination,
    #[default]
    Procedure,
    Specification,
    Material,
}

/// Knowledge item lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeStatus {
    Draft,
    UnderReview,
    Published,
    /// Published knowledge contradicted by later evidence
    Challenged,
    Archived,
}

impl KnowledgeStatus {
    /// Every status, in lifecycle order
    pub const ALL: [KnowledgeStatus; 5] = [
        KnowledgeStatus::Draft,
        KnowledgeStatus::UnderReview,
        KnowledgeStatus::Published,
        KnowledgeStatus::Challenged,
        KnowledgeStatus::Archived,
    ];

    /// Lifecycle rank; a status never moves to a lower rank except through
    /// the `challenged -> published` recovery edge
    #[inline]
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            KnowledgeStatus::Draft => 0,
            KnowledgeStatus::UnderReview => 1,
            KnowledgeStatus::Published => 2,
            KnowledgeStatus::Challenged => 3,
            KnowledgeStatus::Archived => 4,
        }
    }
}

impl fmt::Display for KnowledgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KnowledgeStatus::Draft => "draft",
            KnowledgeStatus::UnderReview => "under_review",
            KnowledgeStatus::Published => "published",
            KnowledgeStatus::Challenged => "challenged",
            KnowledgeStatus::Archived => "archived",
        })
    }
}

/// Evidence totals an item's score is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EvidenceTally {
    pub observation_count: u32,
    pub experiment_count: u32,
    /// Weighted units of supporting evidence
    pub positive_units: u32,
    /// Weighted units of all evidence
    pub total_units: u32,
}

impl EvidenceTally {
    /// Observations plus experiments
    #[inline]
    #[must_use]
    pub fn sample_size(&self) -> u32 {
        self.observation_count.saturating_add(self.experiment_count)
    }
}

/// Identity fields of a new item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSeed {
    pub title: String,
    pub knowledge_type: KnowledgeType,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: String,
}

impl KnowledgeSeed {
    /// Seed filed under an attribution key
    #[must_use]
    pub fn for_attribution(
        title: impl Into<String>,
        knowledge_type: KnowledgeType,
        attribution: &Attribution,
    ) -> Self {
        Self {
            title: title.into(),
            knowledge_type,
            category: attribution.category.clone(),
            tags: attribution.tags.clone(),
            summary: String::new(),
        }
    }
}

/// Confidence-scored unit of knowledge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: KnowledgeItemId,
    pub title: String,
    pub knowledge_type: KnowledgeType,
    pub category: String,
    pub tags: Vec<String>,
    pub summary: String,
    pub confidence_score: u8,
    pub evidence: EvidenceTally,
    pub status: KnowledgeStatus,
    /// Sample size when a manual review was triggered; promotion waits for
    /// the sample to grow past it
    pub review_hold: Option<u32>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeItem {
    /// New draft item with no evidence
    #[must_use]
    pub fn draft(id: KnowledgeItemId, seed: KnowledgeSeed, now: DateTime<Utc>) -> Self {
        let attribution = Attribution::new(&seed.category, seed.tags.iter().map(String::as_str));
        Self {
            id,
            title: seed.title,
            knowledge_type: seed.knowledge_type,
            category: attribution.category,
            tags: attribution.tags,
            summary: seed.summary,
            confidence_score: 0,
            evidence: EvidenceTally::default(),
            status: KnowledgeStatus::Draft,
            review_hold: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    #[must_use]
    pub fn observation_count(&self) -> u32 {
        self.evidence.observation_count
    }

    #[inline]
    #[must_use]
    pub fn experiment_count(&self) -> u32 {
        self.evidence.experiment_count
    }

    /// Attribution key of this item
    #[must_use]
    pub fn attribution(&self) -> Attribution {
        Attribution::new(&self.category, self.tags.iter().map(String::as_str))
    }

    /// Item accepts new evidence under the given key
    #[must_use]
    pub fn attracts(&self, evidence: &Attribution) -> bool {
        self.status != KnowledgeStatus::Archived && self.attribution().overlaps(evidence)
    }
}
