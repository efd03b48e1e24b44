//! Evidence badges for checklist steps
//!
//! Each observation-generating step shows the strongest knowledge item its
//! evidence feeds: published beats anything else, then higher confidence,
//! then more evidence, then age.

use crate::attribution::AttributionResolver;
use labs_model::{
    Attribution, KnowledgeItem, KnowledgeItemId, KnowledgeStatus, ScriptPhase, SopId,
};
use labs_store::{KnowledgeStore, Lookup, SopCatalog};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Knowledge item cited on a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBadge {
    pub knowledge_item_id: KnowledgeItemId,
    pub confidence_score: u8,
    pub status: KnowledgeStatus,
}

impl From<&KnowledgeItem> for EvidenceBadge {
    fn from(item: &KnowledgeItem) -> Self {
        Self {
            knowledge_item_id: item.id,
            confidence_score: item.confidence_score,
            status: item.status,
        }
    }
}

/// Badge slot for one checklist step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBadge {
    pub step_order: u32,
    pub script_phase: Option<ScriptPhase>,
    /// None until some evidence has produced an item
    pub badge: Option<EvidenceBadge>,
}

/// Strongest non-archived item attracting `attribution`
#[must_use]
pub fn best_item(
    resolver: &dyn AttributionResolver,
    knowledge: &KnowledgeStore,
    attribution: &Attribution,
) -> Option<KnowledgeItem> {
    resolver
        .resolve(knowledge, attribution)
        .into_iter()
        .filter(|item| item.status != KnowledgeStatus::Archived)
        .max_by_key(|item| {
            (
                item.status == KnowledgeStatus::Published,
                item.confidence_score,
                item.evidence.sample_size(),
                Reverse(item.id),
            )
        })
}

/// Badges for every live observation-generating step of `sop_id`.
///
/// An unknown SOP has no steps, so no badges.
#[must_use]
pub fn evidence_badges(
    catalog: &dyn SopCatalog,
    resolver: &dyn AttributionResolver,
    knowledge: &KnowledgeStore,
    sop_id: &SopId,
) -> Vec<StepBadge> {
    let sop = match catalog.sop(sop_id) {
        Lookup::Found(sop) => sop,
        Lookup::NotFound => {
            tracing::debug!(%sop_id, "no procedure for badges");
            return Vec::new();
        }
    };
    let badge = best_item(resolver, knowledge, &sop.attribution()).map(|item| EvidenceBadge::from(&item));
    sop.steps()
        .iter()
        .filter(|step| step.generates_observation && !step.retired)
        .map(|step| StepBadge {
            step_order: step.order,
            script_phase: step.script_phase,
            badge: badge.clone(),
        })
        .collect()
}
