use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VarlensError};

// =============================================================================
// Session
// =============================================================================

/// Opaque identifier of one uploaded dataset under analysis.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Parse a session id, rejecting empty or whitespace-only input.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VarlensError::Session("session id is empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Result stores
// =============================================================================

/// The analysis domain a result store caches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Screening,
    Phenotype,
    Literature,
}

impl StoreKind {
    pub const ALL: [StoreKind; 3] = [
        StoreKind::Screening,
        StoreKind::Phenotype,
        StoreKind::Literature,
    ];
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Screening => write!(f, "screening"),
            StoreKind::Phenotype => write!(f, "phenotype"),
            StoreKind::Literature => write!(f, "literature"),
        }
    }
}

/// Load status of a result store.
///
/// Transitions are `Idle -> Loading -> {Loaded | Error}`; only a reset
/// returns a store to `Idle`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error,
}

impl LoadStatus {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &LoadStatus) -> bool {
        matches!(
            (self, target),
            (LoadStatus::Idle, LoadStatus::Loading)
                | (LoadStatus::Loading, LoadStatus::Loaded)
                | (LoadStatus::Loading, LoadStatus::Error)
                // Reset
                | (_, LoadStatus::Idle)
        )
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Idle => write!(f, "Idle"),
            LoadStatus::Loading => write!(f, "Loading"),
            LoadStatus::Loaded => write!(f, "Loaded"),
            LoadStatus::Error => write!(f, "Error"),
        }
    }
}

/// Why a store ended in `LoadStatus::Error`.
///
/// Both variants mean "nothing to show" to a UI; the split only exists so
/// callers can tell an absent analysis from a failed request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "message")]
pub enum LoadFailure {
    NoData,
    Failed(String),
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::NoData => write!(f, "no data for this session"),
            LoadFailure::Failed(msg) => write!(f, "load failed: {}", msg),
        }
    }
}

/// A per-domain analysis result held by one result store.
pub trait AnalysisPayload: DeserializeOwned + Send + Sync + 'static {
    /// The store this payload belongs to; also names its backend endpoint.
    const KIND: StoreKind;

    /// Whether the backend produced nothing worth showing.
    fn is_empty(&self) -> bool;
}

// =============================================================================
// Screening
// =============================================================================

/// Variant screening output for a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningResponse {
    pub session_id: String,
    pub status: String,
    pub results: Vec<ScreeningResult>,
    pub summary: Option<ScreeningSummary>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisPayload for ScreeningResponse {
    const KIND: StoreKind = StoreKind::Screening;

    fn is_empty(&self) -> bool {
        self.results.is_empty() && self.summary.is_none()
    }
}

/// One screened variant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningResult {
    pub gene: String,
    pub variant: String,
    pub classification: Option<String>,
    pub zygosity: Option<String>,
    pub score: Option<f64>,
}

/// Screening totals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningSummary {
    pub total_variants: u64,
    pub flagged_variants: u64,
}

// =============================================================================
// Phenotype
// =============================================================================

/// Phenotype matching results aggregated across all analysis batches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatedPhenotypeResults {
    pub session_id: String,
    pub patient_phenotypes: Vec<String>,
    pub results: Vec<PhenotypeMatch>,
    pub total_variants: u64,
}

impl AnalysisPayload for AggregatedPhenotypeResults {
    const KIND: StoreKind = StoreKind::Phenotype;

    fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// A variant ranked against the patient's phenotype terms.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhenotypeMatch {
    pub gene: String,
    pub variant: String,
    pub hpo_terms: Vec<String>,
    pub score: f64,
}

// =============================================================================
// Literature
// =============================================================================

/// Literature evidence gathered for a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiteratureResults {
    pub session_id: String,
    pub articles: Vec<LiteratureArticle>,
    pub total: u64,
}

impl AnalysisPayload for LiteratureResults {
    const KIND: StoreKind = StoreKind::Literature;

    fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// One publication referenced by the analysis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiteratureArticle {
    pub pmid: String,
    pub title: String,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub genes: Vec<String>,
}
