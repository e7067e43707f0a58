//! Therapist-search backend collaborator.
//!
//! The HTTP implementation talks to the external provider-search service.
//! Transient failures get a small bounded retry with short backoff; the
//! caller treats any remaining failure as "no results".

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::response::TherapistResult;

/// Backoff between retry attempts; the attempt count is the length + 1.
const RETRY_DELAYS: [Duration; 2] = [Duration::from_millis(400), Duration::from_millis(800)];

/// Provider search. `specialty` must be omittable.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        location: &str,
        radius_km: u32,
        specialty: Option<&str>,
        limit: u32,
    ) -> Result<Vec<TherapistResult>, SearchError>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    location: &'a str,
    radius_km: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    specialty: Option<&'a str>,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TherapistResult>,
}

/// reqwest-based backend POSTing to the configured search service.
pub struct HttpSearchBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSearchBackend {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Backend {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn attempt(
        &self,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<TherapistResult>, SearchError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    SearchError::Backend {
                        reason: format!("{e}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Backend {
                reason: format!("search service returned {status}"),
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(format!("{e}")))?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(
        &self,
        location: &str,
        radius_km: u32,
        specialty: Option<&str>,
        limit: u32,
    ) -> Result<Vec<TherapistResult>, SearchError> {
        let request = SearchRequest {
            location,
            radius_km,
            specialty,
            limit,
        };

        let mut last_error = SearchError::Backend {
            reason: "search failed without error detail".to_string(),
        };
        for attempt in 0..=RETRY_DELAYS.len() {
            match self.attempt(&request).await {
                Ok(results) => {
                    debug!(location, radius_km, count = results.len(), "Search succeeded");
                    return Ok(results);
                }
                Err(e) => {
                    warn!(location, attempt, "Search attempt failed: {e}");
                    last_error = e;
                    if attempt < RETRY_DELAYS.len() {
                        tokio::time::sleep(RETRY_DELAYS[attempt]).await;
                    }
                }
            }
        }
        Err(last_error)
    }
}

/// Backend used when no search service is configured. Every call fails,
/// which the therapist agent collapses to an empty result set.
pub struct UnconfiguredSearchBackend;

#[async_trait]
impl SearchBackend for UnconfiguredSearchBackend {
    async fn search(
        &self,
        _location: &str,
        _radius_km: u32,
        _specialty: Option<&str>,
        _limit: u32,
    ) -> Result<Vec<TherapistResult>, SearchError> {
        Err(SearchError::Backend {
            reason: "search backend not configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_absent_specialty() {
        let request = SearchRequest {
            location: "Stockholm",
            radius_km: 25,
            specialty: None,
            limit: 10,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("specialty").is_none());
        assert_eq!(json["radius_km"], 25);
    }

    #[test]
    fn response_tolerates_missing_results_field() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_backend_always_fails() {
        let backend = UnconfiguredSearchBackend;
        let result = backend.search("Stockholm", 25, None, 10).await;
        assert!(matches!(result, Err(SearchError::Backend { .. })));
    }
}
