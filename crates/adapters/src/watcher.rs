// SPDX-License-Identifier: MIT

//! Debounced filesystem watch over a session's transcript, turning
//! raw fs-events into `UsageEvent`s the engine can react to without
//! re-parsing the transcript on every single write.

use crate::transcript::TranscriptReader;
use fray_core::TokenUsageWithModel;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DEBOUNCE: Duration = Duration::from_millis(500);
/// Bound on the event channel; overflow drops the newest event rather than
/// blocking the watcher task, since a later poll will re-derive the delta.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct UsageEvent {
    pub driver: String,
    pub session_id: String,
    pub prev: TokenUsageWithModel,
    pub next: TokenUsageWithModel,
}

/// Watches a single session's transcript file for writes and reports token
/// usage deltas on a bounded channel. Falls back to polling on the same
/// cadence if the underlying fs watch can't be established (e.g. the file
/// doesn't exist yet).
pub struct TranscriptWatcher {
    _watcher: Option<RecommendedWatcher>,
}

impl TranscriptWatcher {
    /// Starts watching `driver`/`session_id`'s transcript, sending
    /// `UsageEvent`s whenever its parsed usage changes. Returns the watcher
    /// (keep it alive to keep watching) and the receiving end.
    pub fn spawn(
        reader: Arc<dyn TranscriptReader>,
        driver: impl Into<String>,
        session_id: impl Into<String>,
    ) -> (Self, mpsc::Receiver<UsageEvent>) {
        let driver = driver.into();
        let session_id = session_id.into();
        let (fs_tx, mut fs_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let watch_path = reader.locate(&driver, &session_id);
        let watcher = watch_path.as_deref().and_then(|path| {
            create_file_watcher(path, fs_tx.clone())
                .inspect_err(|e| tracing::warn!(%driver, %session_id, error = %e, "fs watch failed, falling back to polling"))
                .ok()
        });

        tokio::spawn(async move {
            let mut prev = TokenUsageWithModel::default();
            let mut ticker = tokio::time::interval(DEBOUNCE);
            loop {
                tokio::select! {
                    biased;
                    maybe_event = fs_rx.recv() => {
                        if maybe_event.is_none() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {}
                }
                let next = reader.read(&driver, &session_id).unwrap_or_default();
                if next != prev {
                    let event = UsageEvent {
                        driver: driver.clone(),
                        session_id: session_id.clone(),
                        prev: prev.clone(),
                        next: next.clone(),
                    };
                    // Drop-newest on a full channel: a later tick will carry
                    // forward the latest usage anyway.
                    let _ = event_tx.try_send(event);
                    prev = next;
                }
            }
        });

        (
            Self {
                _watcher: watcher,
            },
            event_rx,
        )
    }
}

fn create_file_watcher(
    path: &Path,
    tx: mpsc::Sender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if res.is_ok() {
            let _ = tx.try_send(());
        }
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
