//! Integration tests for the HTTP results backend and the workspace that
//! loads through it.
//!
//! Each test serves a small axum app on an ephemeral port standing in for
//! the analysis service's results API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use varlens_core::config::BackendConfig;
use varlens_core::types::{LoadFailure, LoadStatus, SessionId, StoreKind};
use varlens_store::{AnalysisWorkspace, HttpResultsBackend, LoadError, LoadOutcome, ResultsBackend};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Clone, Default)]
struct ServerState {
    literature_calls: Arc<AtomicUsize>,
    phenotype_calls: Arc<AtomicUsize>,
}

async fn screening(Path(session_id): Path<String>) -> Response {
    if session_id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(json!({
        "session_id": session_id,
        "status": "complete",
        "results": [
            {"gene": "BRCA2", "variant": "c.5946del", "classification": "pathogenic"}
        ],
        "summary": {"total_variants": 41230, "flagged_variants": 1}
    }))
    .into_response()
}

/// Fails with 503 on the first call, then succeeds.
async fn literature(State(state): State<ServerState>, Path(session_id): Path<String>) -> Response {
    let call = state.literature_calls.fetch_add(1, Ordering::SeqCst);
    if call == 0 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    Json(json!({
        "session_id": session_id,
        "articles": [{"pmid": "20301425", "title": "BRCA2 hereditary cancer", "year": 2016}],
        "total": 1
    }))
    .into_response()
}

/// Always rejects with a client error.
async fn phenotype(State(state): State<ServerState>) -> Response {
    state.phenotype_calls.fetch_add(1, Ordering::SeqCst);
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

async fn serve(state: ServerState) -> String {
    let app = Router::new()
        .route("/api/sessions/{session_id}/screening", get(screening))
        .route("/api/sessions/{session_id}/literature", get(literature))
        .route("/api/sessions/{session_id}/phenotype", get(phenotype))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn backend(base_url: String, max_retries: u32) -> HttpResultsBackend {
    let config = BackendConfig {
        base_url,
        max_retries,
        retry_backoff_ms: 1,
        ..BackendConfig::default()
    };
    HttpResultsBackend::new(&config).unwrap()
}

fn sid(raw: &str) -> SessionId {
    SessionId::parse(raw).unwrap()
}

// =============================================================================
// Backend
// =============================================================================

#[tokio::test]
async fn test_screening_decodes_payload() {
    let base = serve(ServerState::default()).await;
    let backend = backend(base, 0);

    let resp = backend.load_screening_results(&sid("s1")).await.unwrap();
    assert_eq!(resp.session_id, "s1");
    assert_eq!(resp.results.len(), 1);
    assert_eq!(resp.results[0].gene, "BRCA2");
    assert_eq!(resp.summary.unwrap().total_variants, 41230);
}

#[tokio::test]
async fn test_not_found_is_no_data() {
    let base = serve(ServerState::default()).await;
    let backend = backend(base, 3);

    let result = backend.load_screening_results(&sid("missing")).await;
    assert_eq!(result.unwrap_err(), LoadError::NoData);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let state = ServerState::default();
    let base = serve(state.clone()).await;
    let backend = backend(base, 2);

    let resp = backend.load_all_literature_results(&sid("s1")).await.unwrap();
    assert_eq!(resp.articles[0].pmid, "20301425");
    assert_eq!(state.literature_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_server_error_without_retries_fails() {
    let state = ServerState::default();
    let base = serve(state.clone()).await;
    let backend = backend(base, 0);

    let result = backend.load_all_literature_results(&sid("s1")).await;
    assert_eq!(result.unwrap_err(), LoadError::Status(503));
    assert_eq!(state.literature_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let state = ServerState::default();
    let base = serve(state.clone()).await;
    let backend = backend(base, 3);

    let result = backend.load_all_phenotype_results(&sid("s1")).await;
    assert_eq!(result.unwrap_err(), LoadError::Status(403));
    assert_eq!(state.phenotype_calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Workspace over HTTP
// =============================================================================

#[tokio::test]
async fn test_workspace_over_http_isolates_failures() {
    let base = serve(ServerState::default()).await;
    let workspace = AnalysisWorkspace::new(Arc::new(backend(base, 1)));

    let report = workspace.set_session(Some(sid("s1"))).await.unwrap();

    assert_eq!(report.outcome(StoreKind::Screening), Some(&LoadOutcome::Loaded));
    assert_eq!(report.outcome(StoreKind::Literature), Some(&LoadOutcome::Loaded));
    assert!(matches!(
        report.outcome(StoreKind::Phenotype),
        Some(LoadOutcome::Failed(_))
    ));
    assert_eq!(workspace.phenotype().status, LoadStatus::Error);
    assert!(matches!(
        workspace.phenotype().failure,
        Some(LoadFailure::Failed(_))
    ));
}

#[tokio::test]
async fn test_workspace_missing_screening_is_no_data() {
    let base = serve(ServerState::default()).await;
    let workspace = AnalysisWorkspace::new(Arc::new(backend(base, 0)));

    let report = workspace.set_session(Some(sid("missing"))).await.unwrap();

    assert_eq!(report.outcome(StoreKind::Screening), Some(&LoadOutcome::NoData));
    assert_eq!(workspace.screening().failure, Some(LoadFailure::NoData));
    assert!(workspace.screening().data.is_none());
}
