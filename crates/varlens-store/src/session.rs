//! Active-session tracking and store resets.
//!
//! `SessionSource` is the publishing side: whoever resolves the session id
//! (URL routing, CLI flags) pushes it here. `SessionMonitor` observes it and
//! clears every registered store synchronously whenever the id changes, so
//! the load orchestrator sees `Idle` again and stale data is never served.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info};

use varlens_core::types::{LoadStatus, SessionId, StoreKind};

use crate::store::ResultStore;

/// A store the session monitor can reset.
pub trait ResettableStore: Send + Sync {
    fn kind(&self) -> StoreKind;
    fn status(&self) -> LoadStatus;
    fn clear(&self);
}

impl<T: Send + Sync> ResettableStore for ResultStore<T> {
    fn kind(&self) -> StoreKind {
        ResultStore::kind(self)
    }

    fn status(&self) -> LoadStatus {
        ResultStore::status(self)
    }

    fn clear(&self) {
        ResultStore::clear(self)
    }
}

/// Publisher of the active session id.
#[derive(Debug, Clone)]
pub struct SessionSource {
    tx: Arc<watch::Sender<Option<SessionId>>>,
}

impl Default for SessionSource {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionSource {
    pub fn new(initial: Option<SessionId>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Publish a session id. Re-publishing the current value notifies no one.
    pub fn publish(&self, session: Option<SessionId>) {
        self.tx.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session;
                true
            }
        });
    }

    pub fn current(&self) -> Option<SessionId> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SessionId>> {
        self.tx.subscribe()
    }
}

/// A change of the active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub previous: Option<SessionId>,
    pub current: Option<SessionId>,
}

/// Resets dependent stores when the active session changes.
pub struct SessionMonitor {
    stores: Vec<Arc<dyn ResettableStore>>,
    active: Mutex<Option<SessionId>>,
}

impl SessionMonitor {
    pub fn new(stores: Vec<Arc<dyn ResettableStore>>) -> Self {
        Self {
            stores,
            active: Mutex::new(None),
        }
    }

    /// The last session id this monitor observed.
    pub fn active(&self) -> Option<SessionId> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Observe the current session id.
    ///
    /// When it differs from the last observed value (including a change to
    /// no session), every store is cleared before this returns.
    pub fn observe(&self, session: Option<SessionId>) -> Option<SessionChange> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *active == session {
            return None;
        }

        let mut reset = 0;
        for store in &self.stores {
            if store.status() != LoadStatus::Idle {
                debug!(store = %store.kind(), from = %store.status(), "Resetting store");
                reset += 1;
            }
            store.clear();
        }

        let change = SessionChange {
            previous: std::mem::replace(&mut *active, session.clone()),
            current: session,
        };
        info!(
            previous = ?change.previous.as_ref().map(SessionId::as_str),
            current = ?change.current.as_ref().map(SessionId::as_str),
            stores = self.stores.len(),
            reset,
            "Active session changed, stores reset"
        );
        Some(change)
    }

    /// Follow a session source until it is dropped.
    ///
    /// `on_change` runs after the stores have been reset, once for the
    /// initial value (if it is a change) and once per subsequent change.
    pub async fn watch<F>(&self, mut rx: watch::Receiver<Option<SessionId>>, mut on_change: F)
    where
        F: FnMut(SessionChange),
    {
        let initial = rx.borrow_and_update().clone();
        if let Some(change) = self.observe(initial) {
            on_change(change);
        }

        while rx.changed().await.is_ok() {
            let current = rx.borrow_and_update().clone();
            if let Some(change) = self.observe(current) {
                on_change(change);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
