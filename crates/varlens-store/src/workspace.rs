//! Session scope: the three result stores, the monitor that resets them and
//! the orchestrator that fills them.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use varlens_core::types::{
    AggregatedPhenotypeResults, LiteratureResults, ScreeningResponse, SessionId, StoreKind,
};

use crate::backend::ResultsBackend;
use crate::orchestrator::{DataLoadOrchestrator, OrchestrationReport};
use crate::session::{ResettableStore, SessionMonitor};
use crate::store::{ResultStore, StoreSnapshot};

/// Everything that is scoped to one analysis session.
///
/// Stores are created once and live for the process; a session change is a
/// hard reset, never a merge.
pub struct AnalysisWorkspace {
    screening: Arc<ResultStore<ScreeningResponse>>,
    phenotype: Arc<ResultStore<AggregatedPhenotypeResults>>,
    literature: Arc<ResultStore<LiteratureResults>>,
    monitor: SessionMonitor,
    orchestrator: DataLoadOrchestrator,
}

impl AnalysisWorkspace {
    pub fn new(backend: Arc<dyn ResultsBackend>) -> Self {
        let screening = Arc::new(ResultStore::new(StoreKind::Screening));
        let phenotype = Arc::new(ResultStore::new(StoreKind::Phenotype));
        let literature = Arc::new(ResultStore::new(StoreKind::Literature));

        let monitor = SessionMonitor::new(vec![
            Arc::clone(&screening) as Arc<dyn ResettableStore>,
            Arc::clone(&phenotype) as Arc<dyn ResettableStore>,
            Arc::clone(&literature) as Arc<dyn ResettableStore>,
        ]);
        let orchestrator = DataLoadOrchestrator::new(
            backend,
            Arc::clone(&screening),
            Arc::clone(&phenotype),
            Arc::clone(&literature),
        );

        Self {
            screening,
            phenotype,
            literature,
            monitor,
            orchestrator,
        }
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.monitor.active()
    }

    pub fn screening(&self) -> StoreSnapshot<ScreeningResponse> {
        self.screening.snapshot()
    }

    pub fn phenotype(&self) -> StoreSnapshot<AggregatedPhenotypeResults> {
        self.phenotype.snapshot()
    }

    pub fn literature(&self) -> StoreSnapshot<LiteratureResults> {
        self.literature.snapshot()
    }

    /// Make `session` the active session and load it.
    ///
    /// A changed session resets every store first. With no session nothing
    /// is loaded and `None` is returned; the host decides whether to redirect.
    pub async fn set_session(&self, session: Option<SessionId>) -> Option<OrchestrationReport> {
        self.monitor.observe(session.clone());
        match session {
            Some(id) => Some(self.orchestrator.run(&id).await),
            None => None,
        }
    }

    /// Follow a session source until it is dropped, loading each new session
    /// on its own task so a slow load never delays the next reset.
    pub async fn follow(self: Arc<Self>, rx: watch::Receiver<Option<SessionId>>) {
        let workspace = Arc::clone(&self);
        self.monitor
            .watch(rx, move |change| {
                let Some(session_id) = change.current else {
                    return;
                };
                let workspace = Arc::clone(&workspace);
                tokio::spawn(async move {
                    let report = workspace.orchestrator.run(&session_id).await;
                    info!(
                        session_id = %report.session_id,
                        all_loaded = report.all_loaded(),
                        "Session results loaded"
                    );
                });
            })
            .await;
    }
}
