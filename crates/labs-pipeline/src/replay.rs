//! Journal persistence and replay
//!
//! A device that captured offline ships its journal; the authority verifies
//! the hash chain and replays the events in order into a fresh store.
//! Events carry facts, not scores, so every knowledge item is recomputed
//! once the last event has been applied.

use crate::attribution::AttributionResolver;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::LabsPipeline;
use labs_store::{verify_entries, Journal, JournalEntry, LabsStore, SopCatalog};
use std::path::Path;
use std::sync::Arc;

impl LabsPipeline {
    /// Rebuild a pipeline from journal entries.
    ///
    /// The new pipeline's journal holds the same entries with the same
    /// hashes.
    ///
    /// # Errors
    /// - `Store(IntegrityViolation)` if the chain does not verify
    /// - whatever the first failing event returns
    pub fn replay(
        config: PipelineConfig,
        catalog: Arc<dyn SopCatalog>,
        resolver: Arc<dyn AttributionResolver>,
        entries: &[JournalEntry],
    ) -> Result<Self, PipelineError> {
        verify_entries(entries)?;
        let pipeline = Self::open(config, catalog, Arc::new(LabsStore::new()), resolver)?;
        for entry in entries {
            pipeline
                .commit_at(entry.event.clone(), entry.recorded_at)
                .map_err(|err| {
                    tracing::error!(seq = entry.seq, event = entry.event.name(), "Replay failed: {}", err);
                    err
                })?;
        }
        let items = pipeline.recompute_all()?;
        tracing::info!(
            events = entries.len(),
            knowledge_items = items.len(),
            "journal replayed"
        );
        Ok(pipeline)
    }

    /// Replay the journal file at `path`
    pub fn replay_file(
        config: PipelineConfig,
        catalog: Arc<dyn SopCatalog>,
        resolver: Arc<dyn AttributionResolver>,
        path: &Path,
    ) -> Result<Self, PipelineError> {
        let entries = Journal::read_from(path)?;
        Self::replay(config, catalog, resolver, &entries)
    }

    /// Check the journal's hash chain
    pub fn verify(&self) -> Result<(), PipelineError> {
        self.store.journal.verify_integrity()?;
        Ok(())
    }

    /// Write the journal to the configured path
    ///
    /// # Errors
    /// - `Config` when no journal path is configured
    pub fn persist_journal(&self) -> Result<(), PipelineError> {
        let path = self
            .config
            .journal_path
            .as_deref()
            .ok_or_else(|| PipelineError::Config("journal_path is not set".to_string()))?;
        self.store.journal.write_to(path)?;
        tracing::debug!(path = %path.display(), entries = self.store.journal.len(), "journal persisted");
        Ok(())
    }
}
