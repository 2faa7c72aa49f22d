//! Data load orchestrator: one independent load per store for a session.
//!
//! For each store, a load is issued only if the store is `Idle`; the store's
//! own status guard turns repeated invocations (re-renders, duplicate
//! triggers) into no-ops. The three loads run concurrently and are awaited
//! independently, so one store failing never blocks or cancels another.

use std::sync::Arc;

use tracing::{info, warn};

use varlens_core::types::{
    AggregatedPhenotypeResults, LiteratureResults, ScreeningResponse, SessionId, StoreKind,
};

use crate::backend::ResultsBackend;
use crate::store::{LoadOutcome, ResultStore};

/// Per-store outcome of one orchestration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationReport {
    pub session_id: SessionId,
    pub outcomes: Vec<(StoreKind, LoadOutcome)>,
}

impl OrchestrationReport {
    pub fn outcome(&self, kind: StoreKind) -> Option<&LoadOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }

    pub fn all_loaded(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_loaded())
    }

    /// Number of stores whose load was actually issued in this pass.
    pub fn issued(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !matches!(outcome, LoadOutcome::Skipped(_)))
            .count()
    }
}

/// Issues at-most-one in-flight load per store for the active session.
pub struct DataLoadOrchestrator {
    backend: Arc<dyn ResultsBackend>,
    screening: Arc<ResultStore<ScreeningResponse>>,
    phenotype: Arc<ResultStore<AggregatedPhenotypeResults>>,
    literature: Arc<ResultStore<LiteratureResults>>,
}

impl DataLoadOrchestrator {
    pub fn new(
        backend: Arc<dyn ResultsBackend>,
        screening: Arc<ResultStore<ScreeningResponse>>,
        phenotype: Arc<ResultStore<AggregatedPhenotypeResults>>,
        literature: Arc<ResultStore<LiteratureResults>>,
    ) -> Self {
        Self {
            backend,
            screening,
            phenotype,
            literature,
        }
    }

    /// Load every `Idle` store for `session_id`.
    ///
    /// Never fails: each store's failure is recorded on that store and
    /// reported in the returned outcomes.
    pub async fn run(&self, session_id: &SessionId) -> OrchestrationReport {
        let backend = &self.backend;

        let (screening, phenotype, literature) = tokio::join!(
            self.screening.load(session_id, |sid| async move {
                backend.load_screening_results(&sid).await
            }),
            self.phenotype.load(session_id, |sid| async move {
                backend.load_all_phenotype_results(&sid).await
            }),
            self.literature.load(session_id, |sid| async move {
                backend.load_all_literature_results(&sid).await
            }),
        );

        let report = OrchestrationReport {
            session_id: session_id.clone(),
            outcomes: vec![
                (StoreKind::Screening, screening),
                (StoreKind::Phenotype, phenotype),
                (StoreKind::Literature, literature),
            ],
        };

        for (kind, outcome) in &report.outcomes {
            if let LoadOutcome::Failed(msg) = outcome {
                warn!(
                    session_id = %session_id,
                    store = %kind,
                    error = %msg,
                    "Store has nothing to show"
                );
            }
        }
        info!(
            session_id = %session_id,
            issued = report.issued(),
            all_loaded = report.all_loaded(),
            "Orchestration pass complete"
        );
        report
    }
}

// =============================================================================
// Tests
// =============================================================================
