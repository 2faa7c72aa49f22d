//! Per-domain result store with an explicit load-status state machine.
//!
//! A store caches one session's results for one analysis domain. It holds no
//! network logic: `load` runs a caller-supplied loader, and the status guard
//! (`Idle -> Loading` under the store mutex) makes sure at most one loader is
//! in flight per store. `clear` bumps a generation counter so a load that
//! completes after a reset can never write into the next session's store.
//! A load whose future is dropped mid-flight hands the store back to `Idle`
//! so later loads and waiters are not stuck behind it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};

use varlens_core::types::{LoadFailure, LoadStatus, SessionId, StoreKind};

use crate::error::LoadError;

/// Result of asking a store to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The store holds data for the session.
    Loaded,
    /// The backend has nothing for this session.
    NoData,
    /// The load failed; the store is in `Error` and will not retry.
    Failed(String),
    /// The store was not `Idle`, so no load was issued.
    Skipped(LoadStatus),
    /// The store was reset while the load was in flight; its result was dropped.
    Superseded,
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded)
    }
}

/// Read view of a store at one point in time.
#[derive(Debug)]
pub struct StoreSnapshot<T> {
    pub status: LoadStatus,
    pub data: Option<Arc<T>>,
    pub session_id: Option<SessionId>,
    pub failure: Option<LoadFailure>,
}

impl<T> Clone for StoreSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            session_id: self.session_id.clone(),
            failure: self.failure.clone(),
        }
    }
}

#[derive(Debug)]
struct StoreInner<T> {
    status: LoadStatus,
    data: Option<Arc<T>>,
    session_id: Option<SessionId>,
    failure: Option<LoadFailure>,
    generation: u64,
}

enum Begin {
    Started(u64),
    InFlight,
    Settled(LoadStatus),
}

/// Session-scoped cache of one domain's results.
#[derive(Debug)]
pub struct ResultStore<T> {
    kind: StoreKind,
    inner: Mutex<StoreInner<T>>,
    status_tx: watch::Sender<LoadStatus>,
}

impl<T> ResultStore<T> {
    /// Create an empty store in the `Idle` state.
    pub fn new(kind: StoreKind) -> Self {
        let (status_tx, _) = watch::channel(LoadStatus::Idle);
        Self {
            kind,
            inner: Mutex::new(StoreInner {
                status: LoadStatus::Idle,
                data: None,
                session_id: None,
                failure: None,
                generation: 0,
            }),
            status_tx,
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn status(&self) -> LoadStatus {
        self.lock().status
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.lock().data.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot<T> {
        let inner = self.lock();
        StoreSnapshot {
            status: inner.status,
            data: inner.data.clone(),
            session_id: inner.session_id.clone(),
            failure: inner.failure.clone(),
        }
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.status_tx.subscribe()
    }

    /// Reset to `{data: None, status: Idle}` unconditionally.
    ///
    /// Any load still in flight is orphaned: its result is discarded when it
    /// completes.
    pub fn clear(&self) {
        let mut inner = self.lock();
        self.reset(&mut inner);
    }

    fn reset(&self, inner: &mut StoreInner<T>) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.data = None;
        inner.session_id = None;
        inner.failure = None;
        self.transition(inner, LoadStatus::Idle);
    }

    /// Move to `target` if the status table allows it, publishing the change.
    ///
    /// Returns `false` and leaves the store untouched otherwise.
    fn transition(&self, inner: &mut StoreInner<T>, target: LoadStatus) -> bool {
        if !inner.status.can_transition_to(&target) {
            warn!(
                store = %self.kind,
                from = %inner.status,
                to = %target,
                "Invalid result store transition"
            );
            return false;
        }
        if inner.status != target {
            debug!(store = %self.kind, "Result store: {} -> {}", inner.status, target);
        }
        inner.status = target;
        self.status_tx.send_replace(target);
        true
    }

    /// Load results for `session_id` using `loader`.
    ///
    /// - `Idle`: flips to `Loading` before `loader` is polled, runs it, and
    ///   commits the result.
    /// - `Loading`: waits for the in-flight load and reports its outcome
    ///   without calling `loader`.
    /// - `Loaded` / `Error`: returns `Skipped` immediately.
    ///
    /// Failures are recorded on the store and never retried here.
    pub async fn load<F, Fut>(&self, session_id: &SessionId, loader: F) -> LoadOutcome
    where
        F: FnOnce(SessionId) -> Fut,
        Fut: Future<Output = Result<T, LoadError>>,
    {
        let generation = match self.try_begin(session_id) {
            Begin::Started(generation) => generation,
            Begin::InFlight => return self.wait_in_flight().await,
            Begin::Settled(status) => return LoadOutcome::Skipped(status),
        };

        let mut guard = InFlight {
            store: self,
            generation,
            armed: true,
        };
        let result = loader(session_id.clone()).await;
        guard.armed = false;
        self.commit(generation, result)
    }

    fn try_begin(&self, session_id: &SessionId) -> Begin {
        let mut inner = self.lock();
        match inner.status {
            LoadStatus::Idle => {
                inner.session_id = Some(session_id.clone());
                inner.failure = None;
                self.transition(&mut inner, LoadStatus::Loading);
                debug!(store = %self.kind, session_id = %session_id, "Result store loading");
                Begin::Started(inner.generation)
            }
            LoadStatus::Loading => Begin::InFlight,
            settled => Begin::Settled(settled),
        }
    }

    fn commit(&self, generation: u64, result: Result<T, LoadError>) -> LoadOutcome {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(store = %self.kind, "Discarding load result for a superseded session");
            return LoadOutcome::Superseded;
        }

        let target = if result.is_ok() {
            LoadStatus::Loaded
        } else {
            LoadStatus::Error
        };
        if !self.transition(&mut inner, target) {
            return LoadOutcome::Superseded;
        }

        match result {
            Ok(data) => {
                inner.data = Some(Arc::new(data));
                LoadOutcome::Loaded
            }
            Err(LoadError::NoData) => {
                debug!(store = %self.kind, "No data for session");
                inner.failure = Some(LoadFailure::NoData);
                LoadOutcome::NoData
            }
            Err(err) => {
                warn!(store = %self.kind, error = %err, "Result load failed");
                inner.failure = Some(err.to_failure());
                LoadOutcome::Failed(err.to_string())
            }
        }
    }

    /// Called when a started load is dropped before it commits.
    fn abandon(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.status == LoadStatus::Loading {
            warn!(store = %self.kind, "In-flight load dropped, store reset to Idle");
            self.reset(&mut inner);
        }
    }

    async fn wait_in_flight(&self) -> LoadOutcome {
        let mut rx = self.status_tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|status| *status != LoadStatus::Loading).await;

        let inner = self.lock();
        match (inner.status, &inner.failure) {
            (LoadStatus::Loaded, _) => LoadOutcome::Loaded,
            (LoadStatus::Error, Some(LoadFailure::NoData)) => LoadOutcome::NoData,
            (LoadStatus::Error, Some(LoadFailure::Failed(msg))) => {
                LoadOutcome::Failed(msg.clone())
            }
            (LoadStatus::Error, None) => LoadOutcome::Failed(String::new()),
            (LoadStatus::Idle, _) => LoadOutcome::Superseded,
            // A fresh load started after a reset; report it as in progress.
            (LoadStatus::Loading, _) => LoadOutcome::Skipped(LoadStatus::Loading),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resets the store if a started load is dropped before committing.
struct InFlight<'a, T> {
    store: &'a ResultStore<T>,
    generation: u64,
    armed: bool,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.store.abandon(self.generation);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
