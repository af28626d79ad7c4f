//! Sync progress reporting.
//!
//! A [`ProgressionReporter`] publishes a snapshot of the operation in flight:
//! where it started, the highest block any selected peer advertises, and how
//! far the local chain has moved. The current block follows the chain
//! collaborator's head events, so it stays accurate regardless of which code
//! path performed the write.

use crate::chain::ChainEvent;
use std::sync::{Arc, Mutex, MutexGuard};
use stratus_common::types::BlockNumber;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Snapshot of an in-flight sync operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncProgression {
    /// First block targeted by the operation.
    pub starting_block: BlockNumber,
    /// Latest block accepted locally since the operation started.
    pub current_block: BlockNumber,
    /// Highest block advertised by the peers synced against so far.
    pub highest_block: BlockNumber,
}

#[derive(Clone, Default)]
pub struct ProgressionReporter {
    progression: Arc<Mutex<Option<SyncProgression>>>,
    watcher: Arc<Mutex<Option<CancellationToken>>>,
}

impl ProgressionReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn progression_mut(&self) -> MutexGuard<'_, Option<SyncProgression>> {
        self.progression
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Begins a progression at `start` and follows head movements published
    /// on `events` until [`ProgressionReporter::stop_progression`].
    pub fn start_progression(
        &self,
        start: BlockNumber,
        mut events: broadcast::Receiver<ChainEvent>,
    ) {
        *self.progression_mut() = Some(SyncProgression {
            starting_block: start,
            current_block: start.saturating_sub(1),
            highest_block: 0,
        });

        let token = CancellationToken::new();
        let progression = self.progression.clone();
        let watcher_token = token.clone();
        if let Some(previous) = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(token)
        {
            previous.cancel();
        }

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = watcher_token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(ChainEvent::NewHead { number }) => {
                            let mut progression = progression
                                .lock()
                                .unwrap_or_else(|poisoned| poisoned.into_inner());
                            if let Some(progression) = progression.as_mut() {
                                progression.current_block =
                                    progression.current_block.max(number);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "progression watcher lagged behind head events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    /// Raises the advertised target; lower values are ignored.
    pub fn update_highest_progression(&self, highest: BlockNumber) {
        if let Some(progression) = self.progression_mut().as_mut() {
            progression.highest_block = progression.highest_block.max(highest);
        }
    }

    /// Ends the progression; the snapshot is cleared and the watcher task
    /// stops.
    pub fn stop_progression(&self) {
        if let Some(token) = self
            .watcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            token.cancel();
        }
        *self.progression_mut() = None;
    }

    /// Snapshot of the operation in flight, or `None` when idle.
    pub fn get_sync_progression(&self) -> Option<SyncProgression> {
        *self.progression_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn progression_follows_head_events() {
        let reporter = ProgressionReporter::new();
        let (events, _keep) = broadcast::channel(16);
        reporter.start_progression(1, events.subscribe());
        reporter.update_highest_progression(10);

        let _ = events.send(ChainEvent::NewHead { number: 1 });
        let _ = events.send(ChainEvent::NewHead { number: 2 });

        let mut snapshot = None;
        for _ in 0..100 {
            snapshot = reporter.get_sync_progression();
            if snapshot.is_some_and(|p| p.current_block == 2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let progression = snapshot.expect("progression is active");
        assert_eq!(progression.starting_block, 1);
        assert_eq!(progression.current_block, 2);
        assert_eq!(progression.highest_block, 10);

        reporter.stop_progression();
        assert_eq!(reporter.get_sync_progression(), None);
    }

    #[tokio::test]
    async fn highest_never_moves_backwards() {
        let reporter = ProgressionReporter::new();
        let (events, _keep) = broadcast::channel(16);
        reporter.start_progression(5, events.subscribe());
        reporter.update_highest_progression(42);
        reporter.update_highest_progression(7);
        assert_eq!(
            reporter.get_sync_progression().map(|p| p.highest_block),
            Some(42)
        );
    }
}
