//! Build status tracking: persisted history plus one polling task per build.
//!
//! History lives in the key-value store as a JSON array, newest first, capped
//! at [`MAX_HISTORY`] entries. Read-merge-write runs under a single mutex so
//! concurrent pollers cannot lose each other's updates.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::error::ApiError;
use crate::events::{BuildEvent, EventBus, FactoryEvent};
use crate::models::{BuildRecord, BuildStatus};
use crate::services::codemagic::CodemagicApi;
use crate::store::{self, KeyValueStore, BUILD_HISTORY_KEY};

/// Most recent builds kept in history.
pub const MAX_HISTORY: usize = 100;
/// Records older than this are dropped at initialization.
pub const RETENTION_DAYS: i64 = 30;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(45);
/// About six hours at the default interval.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 480;

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// Ticks without a terminal status before the build is marked `timeout`; 0 = unbounded.
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }
}

struct Poller {
    token: u64,
    handle: JoinHandle<()>,
}

pub struct BuildStatusTracker {
    store: Arc<dyn KeyValueStore>,
    codemagic: Arc<dyn CodemagicApi>,
    events: EventBus,
    settings: PollSettings,
    pollers: Mutex<HashMap<String, Poller>>,
    next_token: AtomicU64,
    history_lock: Mutex<()>,
}

impl BuildStatusTracker {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        codemagic: Arc<dyn CodemagicApi>,
        events: EventBus,
        settings: PollSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            codemagic,
            events,
            settings,
            pollers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            history_lock: Mutex::new(()),
        })
    }

    /// Drop expired records, then resume polling every unfinished build.
    pub fn initialize(self: &Arc<Self>) -> usize {
        self.clean_expired_builds();
        self.start_polling_active_builds()
    }

    // ── History ──

    /// Upsert a record by `build_id`, merging onto any stored version.
    ///
    /// Persistence failures are reported as a `build:error` event and `None`.
    pub fn save_build(&self, info: &BuildRecord) -> Option<BuildRecord> {
        match self.upsert(info) {
            Ok(record) => {
                self.events.emit(BuildEvent::Saved {
                    build_id: record.build_id.clone(),
                });
                Some(record)
            }
            Err(e) => {
                tracing::error!(build_id = %info.build_id, "Failed to persist build: {e:#}");
                self.events.emit(BuildEvent::Error {
                    build_id: Some(info.build_id.clone()),
                    message: format!("failed to persist build: {e}"),
                });
                None
            }
        }
    }

    fn upsert(&self, info: &BuildRecord) -> anyhow::Result<BuildRecord> {
        let _guard = self
            .history_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("build history lock poisoned"))?;

        let mut history = self.load_history()?;
        let record = match history.iter().position(|r| r.build_id == info.build_id) {
            Some(idx) => {
                let merged = merge_record(&history[idx], info)?;
                history[idx] = merged.clone();
                merged
            }
            None => {
                let mut fresh = info.clone();
                fresh.updated_at = Utc::now();
                history.insert(0, fresh.clone());
                fresh
            }
        };

        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history.truncate(MAX_HISTORY);
        store::save_json(self.store.as_ref(), BUILD_HISTORY_KEY, &history)?;
        Ok(record)
    }

    fn load_history(&self) -> anyhow::Result<Vec<BuildRecord>> {
        Ok(store::load_json(self.store.as_ref(), BUILD_HISTORY_KEY)?.unwrap_or_default())
    }

    /// All records, newest first. Unreadable history is logged and treated as empty.
    pub fn list_builds(&self) -> Vec<BuildRecord> {
        match self.load_history() {
            Ok(history) => history,
            Err(e) => {
                tracing::error!("Failed to read build history: {e:#}");
                Vec::new()
            }
        }
    }

    pub fn get_build(&self, build_id: &str) -> Option<BuildRecord> {
        self.list_builds()
            .into_iter()
            .find(|r| r.build_id == build_id)
    }

    /// Records that have not reached a terminal status.
    pub fn active_builds(&self) -> Vec<BuildRecord> {
        self.list_builds()
            .into_iter()
            .filter(|r| !r.is_terminal())
            .collect()
    }

    /// Drop records created more than [`RETENTION_DAYS`] ago. Returns how many were removed.
    pub fn clean_expired_builds(&self) -> usize {
        let result = (|| -> anyhow::Result<usize> {
            let _guard = self
                .history_lock
                .lock()
                .map_err(|_| anyhow::anyhow!("build history lock poisoned"))?;
            let mut history = self.load_history()?;
            let cutoff = Utc::now() - chrono::Duration::days(RETENTION_DAYS);
            let before = history.len();
            history.retain(|r| r.created_at >= cutoff);
            let removed = before - history.len();
            if removed > 0 {
                store::save_json(self.store.as_ref(), BUILD_HISTORY_KEY, &history)?;
            }
            Ok(removed)
        })();

        match result {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "Expired builds removed from history");
                    self.events.emit(BuildEvent::Expired { removed });
                }
                removed
            }
            Err(e) => {
                tracing::error!("Failed to clean build history: {e:#}");
                self.events.emit(BuildEvent::Error {
                    build_id: None,
                    message: format!("failed to clean build history: {e}"),
                });
                0
            }
        }
    }

    /// Stop every poller and forget all records.
    pub fn clear_history(&self) -> anyhow::Result<()> {
        self.stop_all_polling();
        let _guard = self
            .history_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("build history lock poisoned"))?;
        self.store.delete(BUILD_HISTORY_KEY)?;
        tracing::info!("Build history cleared");
        self.events.emit(BuildEvent::HistoryCleared);
        Ok(())
    }

    // ── Status refresh ──

    /// Refresh one build from Codemagic.
    ///
    /// A build already in a terminal status is returned as stored, without a
    /// remote call, unless `force` is set.
    pub async fn update_build_status(
        &self,
        build_id: &str,
        force: bool,
    ) -> Result<BuildRecord, ApiError> {
        let existing = self.get_build(build_id);
        if let Some(record) = &existing {
            if record.is_terminal() && !force {
                tracing::debug!(build_id, status = %record.status, "Build already finished, skipping poll");
                return Ok(record.clone());
            }
        }

        let remote = self.codemagic.get_build(build_id).await?;
        let observed = BuildStatus::from_codemagic(&remote.status);

        let previous = existing.as_ref().map(|r| r.status);
        let mut update = existing.unwrap_or_else(|| BuildRecord::new(build_id));
        let status = merge_status(update.status, observed);
        update.status = status;
        update.started_at = remote.started_at.or(update.started_at);
        update.finished_at = remote.finished_at.or(update.finished_at);
        if status.is_terminal() && update.finished_at.is_none() {
            update.finished_at = Some(Utc::now());
        }
        if let (Some(started), Some(finished)) = (update.started_at, update.finished_at) {
            update.duration = Some((finished - started).num_seconds().max(0));
        }

        if status == BuildStatus::Success {
            match self.codemagic.get_artifacts(build_id).await {
                Ok(artifacts) => update.artifacts = artifacts,
                Err(e) => {
                    tracing::warn!(build_id, kind = %e.kind, "Failed to fetch artifacts: {}", e.message)
                }
            }
        }

        let saved = self.save_build(&update).unwrap_or(update);

        if previous != Some(status) {
            crate::metrics::build_status_changed(status.as_str());
            tracing::info!(
                build_id,
                remote = %remote.status,
                status = %status,
                "Build status changed"
            );
        }

        self.events.emit(BuildEvent::Updated {
            record: saved.clone(),
        });

        if status.is_terminal() {
            self.stop_polling(build_id);
            self.events.emit(BuildEvent::Completed {
                build_id: build_id.to_string(),
                status,
            });
        }

        Ok(saved)
    }

    // ── Polling ──

    /// Start the polling task for a build.
    ///
    /// Returns `false` if one is already running or the stored record has
    /// already finished.
    pub fn start_polling(self: &Arc<Self>, build_id: &str) -> bool {
        if let Some(record) = self.get_build(build_id) {
            if record.is_terminal() {
                tracing::debug!(build_id, status = %record.status, "Build already finished, not polling");
                return false;
            }
        }

        let mut pollers = match self.pollers.lock() {
            Ok(p) => p,
            Err(_) => {
                tracing::error!(build_id, "Poller map poisoned");
                return false;
            }
        };

        if let Some(existing) = pollers.get(build_id) {
            if !existing.handle.is_finished() {
                tracing::debug!(build_id, "Already polling");
                return false;
            }
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let tracker = Arc::clone(self);
        let id = build_id.to_string();
        let handle = tokio::spawn(async move { tracker.poll_loop(id, token).await });

        pollers.insert(build_id.to_string(), Poller { token, handle });
        crate::metrics::active_pollers(pollers.len());
        drop(pollers);

        tracing::info!(
            build_id,
            interval_secs = self.settings.interval.as_secs(),
            "Polling started"
        );
        self.events.emit(BuildEvent::PollingStarted {
            build_id: build_id.to_string(),
        });
        true
    }

    async fn poll_loop(self: Arc<Self>, build_id: String, token: u64) {
        let mut attempts: u32 = 0;
        loop {
            tokio::time::sleep(self.settings.interval).await;
            attempts += 1;

            match self.update_build_status(&build_id, false).await {
                Ok(record) if record.is_terminal() => break,
                Ok(record) => {
                    tracing::debug!(build_id = %build_id, status = %record.status, attempts, "Build still running");
                }
                Err(e) => {
                    crate::metrics::poll_failed();
                    tracing::warn!(build_id = %build_id, kind = %e.kind, attempts, "Status poll failed: {}", e.message);
                    self.events.emit(BuildEvent::Error {
                        build_id: Some(build_id.clone()),
                        message: e.to_string(),
                    });
                }
            }

            if self.settings.max_attempts > 0 && attempts >= self.settings.max_attempts {
                self.expire_poll(&build_id, attempts);
                break;
            }
        }
        self.release_poller(&build_id, token);
    }

    /// Give up on a build that never reached a terminal status.
    fn expire_poll(&self, build_id: &str, attempts: u32) {
        tracing::warn!(build_id, attempts, "Poll attempts exhausted, marking build timed out");

        let mut record = self
            .get_build(build_id)
            .unwrap_or_else(|| BuildRecord::new(build_id));
        record.status = BuildStatus::Timeout;
        record.finished_at = Some(Utc::now());
        let saved = self.save_build(&record).unwrap_or(record);

        crate::metrics::build_status_changed(BuildStatus::Timeout.as_str());
        self.events.emit(BuildEvent::Updated { record: saved });
        self.stop_polling(build_id);
        self.events.emit(BuildEvent::Completed {
            build_id: build_id.to_string(),
            status: BuildStatus::Timeout,
        });
    }

    /// Remove a poller that ended on its own, unless it was replaced meanwhile.
    fn release_poller(&self, build_id: &str, token: u64) {
        let Ok(mut pollers) = self.pollers.lock() else {
            return;
        };
        if pollers.get(build_id).map(|p| p.token) == Some(token) {
            pollers.remove(build_id);
            crate::metrics::active_pollers(pollers.len());
            drop(pollers);
            self.events.emit(BuildEvent::PollingStopped {
                build_id: build_id.to_string(),
            });
        }
    }

    /// Cancel the polling task for a build. Returns `false` if none was running.
    pub fn stop_polling(&self, build_id: &str) -> bool {
        let removed = match self.pollers.lock() {
            Ok(mut pollers) => {
                let removed = pollers.remove(build_id);
                crate::metrics::active_pollers(pollers.len());
                removed
            }
            Err(_) => None,
        };

        match removed {
            Some(poller) => {
                poller.handle.abort();
                tracing::info!(build_id, "Polling stopped");
                self.events.emit(BuildEvent::PollingStopped {
                    build_id: build_id.to_string(),
                });
                true
            }
            None => false,
        }
    }

    pub fn stop_all_polling(&self) {
        let drained: Vec<(String, Poller)> = match self.pollers.lock() {
            Ok(mut pollers) => pollers.drain().collect(),
            Err(_) => Vec::new(),
        };
        crate::metrics::active_pollers(0);

        for (build_id, poller) in drained {
            poller.handle.abort();
            self.events.emit(BuildEvent::PollingStopped { build_id });
        }
    }

    /// Resume polling every persisted build that has not finished.
    pub fn start_polling_active_builds(self: &Arc<Self>) -> usize {
        let active = self.active_builds();
        let mut started = 0;
        for record in &active {
            if self.start_polling(&record.build_id) {
                started += 1;
            }
        }
        if started > 0 {
            tracing::info!(resumed = started, "Resumed polling for active builds");
        }
        started
    }

    /// Poll `build_ids` until each has finished or `shutdown` resolves.
    ///
    /// Builds whose stored record is already terminal are not waited on.
    /// Returns the ids still unfinished when the wait ended.
    pub async fn watch(
        self: &Arc<Self>,
        build_ids: Vec<String>,
        shutdown: impl Future<Output = ()>,
    ) -> Vec<String> {
        // Subscribe before filtering so a completion in between is not missed.
        let mut rx = self.events.subscribe();
        let mut pending: HashSet<String> = build_ids
            .into_iter()
            .filter(|id| !self.is_finished(id))
            .collect();
        for id in &pending {
            self.start_polling(id);
        }

        tokio::pin!(shutdown);
        while !pending.is_empty() {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(FactoryEvent::Build(BuildEvent::Completed { build_id, .. })) => {
                        pending.remove(&build_id);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event stream lagged, rechecking stored builds");
                        pending.retain(|id| !self.is_finished(id));
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = &mut shutdown => break,
            }
        }
        pending.into_iter().collect()
    }

    fn is_finished(&self, build_id: &str) -> bool {
        self.get_build(build_id).is_some_and(|r| r.is_terminal())
    }

    pub fn is_polling(&self, build_id: &str) -> bool {
        self.pollers
            .lock()
            .map(|p| p.get(build_id).is_some_and(|p| !p.handle.is_finished()))
            .unwrap_or(false)
    }

    pub fn active_poll_count(&self) -> usize {
        self.pollers
            .lock()
            .map(|p| p.values().filter(|p| !p.handle.is_finished()).count())
            .unwrap_or(0)
    }
}

/// A forced refresh may replace one terminal status with another; otherwise
/// status only moves forward.
fn merge_status(current: BuildStatus, observed: BuildStatus) -> BuildStatus {
    if current.is_terminal() && observed.is_terminal() {
        observed
    } else {
        current.advance(observed)
    }
}

/// Overlay the present fields of `incoming` onto `existing`, keeping identity.
fn merge_record(existing: &BuildRecord, incoming: &BuildRecord) -> anyhow::Result<BuildRecord> {
    let mut base = serde_json::to_value(existing)?;
    let overlay = serde_json::to_value(incoming)?;
    if let (Some(base_obj), Some(overlay_obj)) = (base.as_object_mut(), overlay.as_object()) {
        for (key, value) in overlay_obj {
            base_obj.insert(key.clone(), value.clone());
        }
    }

    let mut merged: BuildRecord = serde_json::from_value(base)?;
    merged.id = existing.id.clone();
    merged.created_at = existing.created_at;
    merged.status = merge_status(existing.status, incoming.status);
    merged.updated_at = Utc::now();
    Ok(merged)
}
