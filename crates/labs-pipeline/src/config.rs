//! Pipeline configuration
//!
//! Thresholds default to the named constants below and may be overridden
//! from a TOML file:
//!
//! ```toml
//! journal_path = "/var/lib/labs/journal.jsonl"
//!
//! [scoring]
//! publication_threshold = 75
//! challenge_threshold = 60
//! ```

use crate::error::PipelineError;
use labs_model::KnowledgeType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Confidence needed to publish, and to recover from challenged
pub const PUBLICATION_THRESHOLD: u8 = 70;
/// Published items below this confidence become challenged
pub const CHALLENGE_THRESHOLD: u8 = 60;
/// Observations plus experiments before a draft goes under review
pub const MIN_REVIEW_EVIDENCE: u32 = 5;
/// Observations needed before an item may publish
pub const MIN_PUBLISHED_OBSERVATIONS: u32 = 3;
/// Evidence units one completed experiment is worth
pub const EXPERIMENT_WEIGHT: u32 = 3;
/// Largest accepted experiment weight
pub const MAX_EXPERIMENT_WEIGHT: u32 = 100;
/// Normal quantile for the 95% Wilson lower bound
pub const WILSON_Z: f64 = 1.96;

/// Thresholds driving confidence scores and status transitions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Score needed to publish
    pub publication_threshold: u8,
    /// Score below which a published item is challenged
    pub challenge_threshold: u8,
    /// Sample size needed to leave draft
    pub min_review_evidence: u32,
    /// Observations needed to publish
    pub min_published_observations: u32,
    /// Weight of one completed experiment
    pub experiment_weight: u32,
    /// Wilson interval quantile
    pub z: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            publication_threshold: PUBLICATION_THRESHOLD,
            challenge_threshold: CHALLENGE_THRESHOLD,
            min_review_evidence: MIN_REVIEW_EVIDENCE,
            min_published_observations: MIN_PUBLISHED_OBSERVATIONS,
            experiment_weight: EXPERIMENT_WEIGHT,
            z: WILSON_Z,
        }
    }
}

impl ScoringPolicy {
    /// Reject combinations that would let an item flap between states
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.publication_threshold > 100 {
            return Err(PipelineError::Config(format!(
                "publication_threshold {} exceeds 100",
                self.publication_threshold
            )));
        }
        if self.challenge_threshold >= self.publication_threshold {
            return Err(PipelineError::Config(format!(
                "challenge_threshold {} must be below publication_threshold {}",
                self.challenge_threshold, self.publication_threshold
            )));
        }
        if !(1..=MAX_EXPERIMENT_WEIGHT).contains(&self.experiment_weight) {
            return Err(PipelineError::Config(format!(
                "experiment_weight must be between 1 and {MAX_EXPERIMENT_WEIGHT}, got {}",
                self.experiment_weight
            )));
        }
        if !(self.z.is_finite() && self.z > 0.0) {
            return Err(PipelineError::Config(format!(
                "z must be a positive number, got {}",
                self.z
            )));
        }
        Ok(())
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where the write journal is persisted
    pub journal_path: Option<PathBuf>,
    /// Bound on queued background recomputes
    pub recompute_queue_depth: usize,
    /// Type given to knowledge items created from field evidence
    pub default_knowledge_type: KnowledgeType,
    /// Scoring thresholds
    pub scoring: ScoringPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            journal_path: None,
            recompute_queue_depth: 256,
            default_knowledge_type: KnowledgeType::Procedure,
            scoring: ScoringPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With scoring policy
    #[inline]
    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    /// With journal path
    #[inline]
    #[must_use]
    pub fn with_journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// With background queue depth
    #[inline]
    #[must_use]
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.recompute_queue_depth = depth.max(1);
        self
    }

    /// Parse and validate TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, PipelineError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded pipeline configuration");
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.scoring.validate()?;
        if self.recompute_queue_depth == 0 {
            return Err(PipelineError::Config(
                "recompute_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scoring.publication_threshold, 70);
        assert_eq!(config.scoring.challenge_threshold, 60);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            journal_path = "/tmp/journal.jsonl"

            [scoring]
            publication_threshold = 80
            "#,
        )
        .unwrap();
        assert_eq!(config.scoring.publication_threshold, 80);
        assert_eq!(config.scoring.min_review_evidence, MIN_REVIEW_EVIDENCE);
        assert_eq!(config.journal_path, Some(PathBuf::from("/tmp/journal.jsonl")));
    }

    #[test]
    fn thresholds_must_leave_a_gap() {
        let err = PipelineConfig::from_toml_str(
            r"
            [scoring]
            publication_threshold = 60
            challenge_threshold = 60
            ",
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn experiment_weight_is_bounded() {
        for weight in [0, MAX_EXPERIMENT_WEIGHT + 1, u32::MAX] {
            let err = PipelineConfig::from_toml_str(&format!(
                "[scoring]\nexperiment_weight = {weight}\n"
            ))
            .unwrap_err();
            assert!(matches!(err, PipelineError::Config(_)), "{weight}");
        }
        let raw = format!("[scoring]\nexperiment_weight = {MAX_EXPERIMENT_WEIGHT}\n");
        let config = PipelineConfig::from_toml_str(&raw).unwrap();
        assert_eq!(config.scoring.experiment_weight, MAX_EXPERIMENT_WEIGHT);
    }

    #[test]
    fn renders_back_to_toml() {
        let config = PipelineConfig::new().with_journal_path("/tmp/j.jsonl");
        let raw = config.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&raw).unwrap(), config);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labs.toml");
        std::fs::write(&path, "recompute_queue_depth = 8\n").unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.recompute_queue_depth, 8);
        assert!(PipelineConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
