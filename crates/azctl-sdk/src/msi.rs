//! Managed-identity token retrieval
//!
//! Azure-assigned identities hand out tokens over a local metadata
//! endpoint, no stored secret involved. The endpoint is flaky while an
//! instance warms up, so the fetch retries transient failures (connection
//! errors and non-200 statuses) on a fixed budget with a fixed delay, then
//! surfaces the last error.

use crate::error::{AuthError, AuthResult};
use crate::types::AccessToken;
use azctl_common::constants::DEFAULT_MSI_PORT;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct MsiClient {
    http: reqwest::Client,
    endpoint: String,
    retries: u32,
    retry_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct MsiTokenResponse {
    token_type: String,
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
}

impl MsiClient {
    /// Client against the conventional localhost endpoint, honoring the
    /// `MSI_ENDPOINT` override used by cloud shell and container hosts.
    pub fn new(port: Option<u16>) -> AuthResult<Self> {
        let endpoint = azctl_common::env::msi_endpoint_override().unwrap_or_else(|| {
            format!(
                "http://localhost:{}/oauth2/token",
                port.unwrap_or(DEFAULT_MSI_PORT)
            )
        });
        Self::with_policy(endpoint, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY)
    }

    /// Fully parameterized constructor, used by tests and the cloud-shell
    /// passthrough path.
    pub fn with_policy(
        endpoint: impl Into<String>,
        retries: u32,
        retry_delay: Duration,
    ) -> AuthResult<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| AuthError::Validation(format!("could not build HTTP client: {e}")))?,
            endpoint: endpoint.into(),
            retries: retries.max(1),
            retry_delay,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch a token for `resource` from the local metadata endpoint.
    pub async fn acquire_token(&self, resource: &str) -> AuthResult<AccessToken> {
        let mut last_error = None;

        for attempt in 1..=self.retries {
            match self.try_acquire(resource).await {
                Ok(token) => {
                    debug!("Managed-identity token acquired on attempt {attempt}");
                    return Ok(token);
                }
                Err(err) => {
                    warn!(
                        "Managed-identity token attempt {attempt}/{} failed: {err}",
                        self.retries
                    );
                    last_error = Some(err);
                }
            }

            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AuthError::connectivity("managed-identity endpoint did not respond")
        }))
    }

    async fn try_acquire(&self, resource: &str) -> AuthResult<AccessToken> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("Metadata", "true")
            .form(&[("resource", resource)])
            .send()
            .await
            .map_err(|e| AuthError::connectivity(format!("managed-identity endpoint: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::connectivity(format!("managed-identity endpoint: {e}")))?;

        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "managed-identity endpoint returned {status}: {body}"
            )));
        }

        let parsed: MsiTokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(format!("managed-identity token: {e}")))?;

        Ok(AccessToken {
            token: parsed.access_token,
            token_type: parsed.token_type,
            expires_on: parse_expires_on(parsed.expires_on.as_deref()),
        })
    }
}

/// `expires_on` arrives as a Unix-seconds string when present; fall back
/// to a conservative hour.
fn parse_expires_on(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(|| Utc::now() + ChronoDuration::hours(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client(endpoint: String, retries: u32) -> MsiClient {
        MsiClient::with_policy(endpoint, retries, Duration::from_millis(1)).unwrap()
    }

    #[tokio::test]
    async fn two_transient_failures_then_success_uses_exactly_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("warming up"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("Metadata", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "access_token": "msi-token",
                "expires_on": "4102444800"
            })))
            .mount(&server)
            .await;

        let client = fast_client(format!("{}/oauth2/token", server.uri()), 5);
        let token = client
            .acquire_token("https://management.azure.com/")
            .await
            .unwrap();

        assert_eq!(token.token, "msi-token");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_the_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("still not ready"))
            .mount(&server)
            .await;

        let client = fast_client(format!("{}/oauth2/token", server.uri()), 3);
        let err = client
            .acquire_token("https://management.azure.com/")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("still not ready"));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connectivity_error() {
        // Port 9 (discard) is safe to assume closed.
        let client = fast_client("http://127.0.0.1:9/oauth2/token".to_string(), 2);
        let err = client.acquire_token("https://r").await.unwrap_err();
        assert!(matches!(err, AuthError::Connectivity { .. }));
    }
}
