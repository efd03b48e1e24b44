//! Background recompute worker
//!
//! Deferred recomputes run on a tokio task fed by a bounded queue. Requests
//! that pile up while the worker is busy are coalesced, so an item queued
//! ten times is recomputed once. The guarantees are the aggregator's own:
//! per-item serialisation and compare-and-swap writes.

use crate::aggregator::Aggregator;
use crate::error::PipelineError;
use indexmap::IndexSet;
use labs_model::KnowledgeItemId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Messages accepted by the worker
#[derive(Debug)]
pub enum RecomputeMessage {
    /// Recompute one item
    Recompute(KnowledgeItemId),
    /// Recompute every item
    RecomputeAll,
    /// Reply once everything queued before this message is done
    Flush(oneshot::Sender<()>),
    /// Finish queued work, then stop
    Shutdown,
}

/// Counters reported when the worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Batches drained from the queue
    pub batches: usize,
    /// Successful recomputes
    pub recomputed: usize,
    /// Requests merged into an earlier one
    pub coalesced: usize,
    /// Recomputes that returned an error
    pub failed: usize,
}

/// Sending side of the worker queue
#[derive(Debug, Clone)]
pub struct RecomputeHandle {
    sender: mpsc::Sender<RecomputeMessage>,
}

impl RecomputeHandle {
    /// Queue a recompute of `id`
    pub async fn enqueue(&self, id: KnowledgeItemId) -> Result<(), PipelineError> {
        self.send(RecomputeMessage::Recompute(id)).await
    }

    /// Queue a recompute of every item
    pub async fn enqueue_all(&self) -> Result<(), PipelineError> {
        self.send(RecomputeMessage::RecomputeAll).await
    }

    /// Wait until everything queued so far has been processed
    pub async fn flush(&self) -> Result<(), PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.send(RecomputeMessage::Flush(tx)).await?;
        rx.await.map_err(|_| PipelineError::WorkerStopped)
    }

    /// Ask the worker to stop after draining its queue
    pub async fn shutdown(&self) -> Result<(), PipelineError> {
        self.send(RecomputeMessage::Shutdown).await
    }

    async fn send(&self, message: RecomputeMessage) -> Result<(), PipelineError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| PipelineError::WorkerStopped)
    }
}

/// Spawns the background task
#[derive(Debug)]
pub struct RecomputeWorker;

impl RecomputeWorker {
    /// Spawn a worker with a queue bounded at `depth` messages
    #[must_use]
    pub fn spawn(
        aggregator: Arc<Aggregator>,
        depth: usize,
    ) -> (RecomputeHandle, JoinHandle<WorkerStats>) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let task = tokio::spawn(worker_task(aggregator, rx));
        (RecomputeHandle { sender: tx }, task)
    }
}

#[derive(Default)]
struct Batch {
    ids: IndexSet<KnowledgeItemId>,
    all: bool,
    waiters: Vec<oneshot::Sender<()>>,
    stop: bool,
    coalesced: usize,
}

impl Batch {
    fn push(&mut self, message: RecomputeMessage) {
        match message {
            RecomputeMessage::Recompute(id) => {
                if !self.ids.insert(id) {
                    self.coalesced += 1;
                }
            }
            RecomputeMessage::RecomputeAll => self.all = true,
            RecomputeMessage::Flush(waiter) => self.waiters.push(waiter),
            RecomputeMessage::Shutdown => self.stop = true,
        }
    }
}

async fn worker_task(
    aggregator: Arc<Aggregator>,
    mut rx: mpsc::Receiver<RecomputeMessage>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while let Some(first) = rx.recv().await {
        let mut batch = Batch::default();
        batch.push(first);
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }
        stats.batches += 1;
        stats.coalesced += batch.coalesced;

        if batch.all {
            match aggregator.recompute_all() {
                Ok(items) => stats.recomputed += items.len(),
                Err(err) => {
                    stats.failed += 1;
                    tracing::warn!("Background recompute_all failed: {}", err);
                }
            }
        } else {
            for id in batch.ids {
                match aggregator.recompute(id) {
                    Ok(_) => stats.recomputed += 1,
                    Err(err) => {
                        stats.failed += 1;
                        tracing::warn!(knowledge_item_id = %id, "Background recompute failed: {}", err);
                    }
                }
            }
        }

        for waiter in batch.waiters {
            let _ = waiter.send(());
        }
        if batch.stop {
            break;
        }
    }

    tracing::debug!(?stats, "recompute worker stopped");
    stats
}
