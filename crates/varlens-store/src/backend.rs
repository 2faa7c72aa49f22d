//! Results backend: the three per-domain load calls.
//!
//! `ResultsBackend` is the seam the orchestrator loads through. The HTTP
//! implementation maps "nothing for this session" (404, 204, an empty body or
//! an empty payload) to `LoadError::NoData` and retries only transient
//! failures, with a doubling backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::{debug, instrument, warn};

use varlens_core::config::BackendConfig;
use varlens_core::types::{
    AggregatedPhenotypeResults, AnalysisPayload, LiteratureResults, ScreeningResponse, SessionId,
};

use crate::error::LoadError;

/// Source of per-session analysis results.
#[async_trait]
pub trait ResultsBackend: Send + Sync {
    async fn load_screening_results(
        &self,
        session_id: &SessionId,
    ) -> Result<ScreeningResponse, LoadError>;

    async fn load_all_phenotype_results(
        &self,
        session_id: &SessionId,
    ) -> Result<AggregatedPhenotypeResults, LoadError>;

    async fn load_all_literature_results(
        &self,
        session_id: &SessionId,
    ) -> Result<LiteratureResults, LoadError>;
}

/// `ResultsBackend` over the analysis service's REST API.
///
/// Endpoints are `GET {base_url}/api/sessions/{session_id}/{kind}` where
/// `kind` is `screening`, `phenotype` or `literature`.
#[derive(Debug, Clone)]
pub struct HttpResultsBackend {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpResultsBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LoadError::Transport(e.to_string()))?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: reqwest::Client, config: &BackendConfig) -> Result<Self, LoadError> {
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|e| LoadError::Transport(format!("invalid base url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(LoadError::Transport(format!(
                "invalid base url: {}",
                config.base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// URL of one store's endpoint for a session.
    pub fn endpoint<T: AnalysisPayload>(&self, session_id: &SessionId) -> Url {
        let mut url = self.base_url.clone();
        let kind = T::KIND.to_string();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "sessions", session_id.as_str(), kind.as_str()]);
        }
        url
    }

    #[instrument(level = "debug", skip(self), fields(store = %T::KIND))]
    async fn fetch<T: AnalysisPayload>(&self, session_id: &SessionId) -> Result<T, LoadError> {
        let mut attempt = 0;
        let mut delay = self.retry_backoff;
        loop {
            match self.fetch_once::<T>(session_id).await {
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        store = %T::KIND,
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "Result load failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }

    async fn fetch_once<T: AnalysisPayload>(&self, session_id: &SessionId) -> Result<T, LoadError> {
        let url = self.endpoint::<T>(session_id);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Err(LoadError::NoData);
        }
        if !status.is_success() {
            return Err(LoadError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LoadError::Transport(e.to_string()))?;
        let trimmed = body.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Err(LoadError::NoData);
        }

        let payload: T =
            serde_json::from_str(trimmed).map_err(|e| LoadError::Decode(e.to_string()))?;
        if payload.is_empty() {
            debug!(store = %T::KIND, session_id = %session_id, "Backend returned an empty payload");
            return Err(LoadError::NoData);
        }
        Ok(payload)
    }
}

#[async_trait]
impl ResultsBackend for HttpResultsBackend {
    async fn load_screening_results(
        &self,
        session_id: &SessionId,
    ) -> Result<ScreeningResponse, LoadError> {
        self.fetch(session_id).await
    }

    async fn load_all_phenotype_results(
        &self,
        session_id: &SessionId,
    ) -> Result<AggregatedPhenotypeResults, LoadError> {
        self.fetch(session_id).await
    }

    async fn load_all_literature_results(
        &self,
        session_id: &SessionId,
    ) -> Result<LiteratureResults, LoadError> {
        self.fetch(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_url: &str) -> HttpResultsBackend {
        let config = BackendConfig {
            base_url: base_url.to_string(),
            ..BackendConfig::default()
        };
        HttpResultsBackend::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_layout() {
        let backend = backend("http://localhost:8000");
        let sid = SessionId::parse("abc").unwrap();
        assert_eq!(
            backend.endpoint::<ScreeningResponse>(&sid).as_str(),
            "http://localhost:8000/api/sessions/abc/screening"
        );
        assert_eq!(
            backend.endpoint::<AggregatedPhenotypeResults>(&sid).as_str(),
            "http://localhost:8000/api/sessions/abc/phenotype"
        );
        assert_eq!(
            backend.endpoint::<LiteratureResults>(&sid).as_str(),
            "http://localhost:8000/api/sessions/abc/literature"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_trailing_slash() {
        let backend = backend("https://host.example/prefix/");
        let sid = SessionId::parse("s1").unwrap();
        assert_eq!(
            backend.endpoint::<LiteratureResults>(&sid).as_str(),
            "https://host.example/prefix/api/sessions/s1/literature"
        );
    }

    #[test]
    fn test_endpoint_escapes_session_id() {
        let backend = backend("http://localhost:8000");
        let sid = SessionId::parse("a/b c").unwrap();
        assert_eq!(
            backend.endpoint::<ScreeningResponse>(&sid).as_str(),
            "http://localhost:8000/api/sessions/a%2Fb%20c/screening"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = BackendConfig {
            base_url: "not a url".to_string(),
            ..BackendConfig::default()
        };
        assert!(matches!(
            HttpResultsBackend::new(&config),
            Err(LoadError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            ..BackendConfig::default()
        };
        let backend = HttpResultsBackend::new(&config).unwrap();
        let sid = SessionId::parse("s1").unwrap();
        let result = backend.load_screening_results(&sid).await;
        assert!(matches!(result, Err(LoadError::Transport(_))));
    }
}
