//! Procedures (SOPs) and their checklist step templates
//!
//! Only the metadata the knowledge pipeline reads is modelled here: whether a
//! step produces an observation, its script phase, and the SOP's observation
//! and training configuration.

use crate::attribution::Attribution;
use crate::error::SopError;
use crate::ids::SopId;
use serde::{Deserialize, Serialize};

/// How much detail a checklist-triggered observation asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    /// One-tap confirmation
    #[default]
    Minimal,
    /// Note required unless the step went as expected
    Standard,
    /// Note and photo always required
    Detailed,
}

/// Six-stage field lifecycle used to organise work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptPhase {
    Shield,
    Clear,
    Ready,
    Install,
    Punch,
    Turnover,
}

/// A single checklist step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// 1-based position within the SOP
    pub order: u32,
    /// Short label shown on the checklist
    pub title: String,
    /// Checking this step produces an observation
    pub generates_observation: bool,
    /// Script phase tag, if any
    pub script_phase: Option<ScriptPhase>,
    /// Soft-invalidated: kept because observations reference it
    pub retired: bool,
}

/// Per-SOP configuration consumed by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SopConfig {
    /// Observation detail level for triggered steps
    pub default_observation_mode: ObservationMode,
    /// Supervised completions before the crew member is review-ready
    pub required_supervised_completions: u32,
    /// Number of questions in the review set
    pub review_question_count: u32,
    /// Correct answers needed to pass the review
    pub review_pass_threshold: u32,
}

impl Default for SopConfig {
    fn default() -> Self {
        Self {
            default_observation_mode: ObservationMode::Minimal,
            required_supervised_completions: 3,
            review_question_count: 10,
            review_pass_threshold: 8,
        }
    }
}

/// Standard operating procedure
///
/// Deserializing checks the same rules as [`Sop::validate`], so a catalog
/// file with gapped step orders or an unpassable review is rejected on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SopRecord")]
pub struct Sop {
    pub id: SopId,
    pub title: String,
    /// Work category observations are attributed to
    pub category: String,
    pub tags: Vec<String>,
    pub config: SopConfig,
    steps: Vec<StepTemplate>,
}

impl Sop {
    /// Create an SOP without steps
    #[inline]
    #[must_use]
    pub fn new(id: SopId, title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            category: category.into(),
            tags: Vec::new(),
            config: SopConfig::default(),
            steps: Vec::new(),
        }
    }

    /// With tags
    #[inline]
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// With configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: SopConfig) -> Self {
        self.config = config;
        self
    }

    /// With observation mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ObservationMode) -> Self {
        self.config.default_observation_mode = mode;
        self
    }

    /// Append a step; its order is the next slot in the dense sequence
    #[must_use]
    pub fn with_step(
        mut self,
        title: impl Into<String>,
        generates_observation: bool,
        script_phase: Option<ScriptPhase>,
    ) -> Self {
        self.push_step(title, generates_observation, script_phase);
        self
    }

    /// Append a step and return its order
    pub fn push_step(
        &mut self,
        title: impl Into<String>,
        generates_observation: bool,
        script_phase: Option<ScriptPhase>,
    ) -> u32 {
        let order = self.next_order();
        self.steps.push(StepTemplate {
            order,
            title: title.into(),
            generates_observation,
            script_phase,
            retired: false,
        });
        order
    }

    /// Remove a step and renumber the rest densely from 1.
    ///
    /// Callers must check that no observation references the SOP's steps;
    /// referenced steps are retired instead.
    pub fn remove_step(&mut self, order: u32) -> Option<StepTemplate> {
        let idx = self.steps.iter().position(|s| s.order == order)?;
        let removed = self.steps.remove(idx);
        for (step, order) in self.steps.iter_mut().zip(1u32..) {
            step.order = order;
        }
        Some(removed)
    }

    /// Mark a step as retired
    pub fn retire_step(&mut self, order: u32) -> bool {
        match self.steps.iter_mut().find(|s| s.order == order) {
            Some(step) => {
                step.retired = true;
                true
            }
            None => false,
        }
    }

    /// Look up a step by order
    #[must_use]
    pub fn step(&self, order: u32) -> Option<&StepTemplate> {
        self.steps.iter().find(|s| s.order == order)
    }

    /// All steps in order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[StepTemplate] {
        &self.steps
    }

    /// Steps form 1..=n with no gaps
    #[must_use]
    pub fn is_densely_ordered(&self) -> bool {
        self.steps
            .iter()
            .zip(1u32..)
            .all(|(step, expected)| step.order == expected)
    }

    /// Check the rules every catalog entry must satisfy
    ///
    /// # Errors
    /// - `StepOrder` when steps are not numbered 1..=n in list order
    /// - `PassThreshold` when the review needs more correct answers than it
    ///   has questions
    pub fn validate(&self) -> Result<(), SopError> {
        if let Some((step, position)) = self
            .steps
            .iter()
            .zip(1u32..)
            .find(|(step, expected)| step.order != *expected)
        {
            return Err(SopError::StepOrder {
                position,
                found: step.order,
            });
        }
        if self.config.review_pass_threshold > self.config.review_question_count {
            return Err(SopError::PassThreshold {
                threshold: self.config.review_pass_threshold,
                questions: self.config.review_question_count,
            });
        }
        Ok(())
    }

    /// Attribution key for evidence captured under this SOP
    #[must_use]
    pub fn attribution(&self) -> Attribution {
        Attribution::new(&self.category, self.tags.iter().map(String::as_str))
    }

    fn next_order(&self) -> u32 {
        u32::try_from(self.steps.len()).map_or(u32::MAX, |n| n + 1)
    }
}

/// Wire shape of [`Sop`], validated before it becomes one
#[derive(Deserialize)]
struct SopRecord {
    id: SopId,
    title: String,
    category: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    config: SopConfig,
    #[serde(default)]
    steps: Vec<StepTemplate>,
}

impl TryFrom<SopRecord> for Sop {
    type Error = SopError;

    fn try_from(record: SopRecord) -> Result<Self, Self::Error> {
        let sop = Sop {
            id: record.id,
            title: record.title,
            category: record.category,
            tags: record.tags,
            config: record.config,
            steps: record.steps,
        };
        sop.validate()?;
        Ok(sop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_sop() -> Sop {
        Sop::new(SopId::new("tile-floor"), "Tile floor install", "Tile")
            .with_step("Protect adjacent rooms", false, Some(ScriptPhase::Shield))
            .with_step("Check substrate flatness", true, Some(ScriptPhase::Ready))
            .with_step("Set tile", true, Some(ScriptPhase::Install))
    }

    #[test]
    fn steps_are_dense_from_one() {
        let sop = tile_sop();
        assert!(sop.is_densely_ordered());
        assert_eq!(sop.step(2).unwrap().title, "Check substrate flatness");
    }

    #[test]
    fn remove_step_renumbers() {
        let mut sop = tile_sop();
        let removed = sop.remove_step(1).unwrap();
        assert_eq!(removed.title, "Protect adjacent rooms");
        assert!(sop.is_densely_ordered());
        assert_eq!(sop.step(1).unwrap().title, "Check substrate flatness");
    }

    #[test]
    fn gapped_step_orders_are_rejected_on_load() {
        let mut raw = serde_json::to_value(tile_sop()).unwrap();
        raw["steps"][0]["order"] = 5.into();
        raw["steps"][1]["order"] = 0.into();
        let err = serde_json::from_value::<Sop>(raw).unwrap_err();
        assert!(err.to_string().contains("position 1 has order 5"), "{err}");

        let valid = serde_json::to_value(tile_sop()).unwrap();
        assert_eq!(serde_json::from_value::<Sop>(valid).unwrap(), tile_sop());
    }

    #[test]
    fn unpassable_reviews_are_rejected() {
        let sop = tile_sop().with_config(SopConfig {
            review_question_count: 5,
            review_pass_threshold: 6,
            ..SopConfig::default()
        });
        assert_eq!(
            sop.validate(),
            Err(SopError::PassThreshold {
                threshold: 6,
                questions: 5
            })
        );
        assert_eq!(tile_sop().validate(), Ok(()));
    }

    #[test]
    fn removing_from_a_gapped_list_renumbers_instead_of_wrapping() {
        let mut raw = serde_json::to_value(tile_sop()).unwrap();
        raw["steps"][0]["order"] = 5.into();
        raw["steps"][1]["order"] = 0.into();
        let record: SopRecord = serde_json::from_value(raw).unwrap();
        let mut sop = Sop {
            id: record.id,
            title: record.title,
            category: record.category,
            tags: record.tags,
            config: record.config,
            steps: record.steps,
        };

        let removed = sop.remove_step(5).unwrap();
        assert_eq!(removed.title, "Protect adjacent rooms");
        assert!(sop.is_densely_ordered());
        assert_eq!(sop.step(1).unwrap().title, "Check substrate flatness");
    }

    #[test]
    fn retire_keeps_order() {
        let mut sop = tile_sop();
        assert!(sop.retire_step(2));
        assert!(sop.step(2).unwrap().retired);
        assert_eq!(sop.steps().len(), 3);
        assert!(!sop.retire_step(9));
    }
}
