//! Resource Manager client
//!
//! Only the two control-plane surfaces the account subsystem needs:
//! listing the subscriptions visible to a token and listing the tenants an
//! identity belongs to. Responses are paged via `nextLink`; every request
//! carries a correlation id.

use crate::error::{AuthError, AuthResult};
use crate::types::{AccessToken, SubscriptionState};
use azctl_common::constants::ARM_API_VERSION;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const CONNECTIVITY_ATTEMPTS: u32 = 3;
const CONNECTIVITY_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
}

/// A subscription as returned by the `subscriptions` list API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmSubscription {
    /// Fully qualified id, `/subscriptions/<guid>`.
    pub id: String,
    pub subscription_id: String,
    pub display_name: String,
    pub state: SubscriptionState,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// A tenant as returned by the `tenants` list API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmTenant {
    pub tenant_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

impl ArmClient {
    pub fn new(endpoint: impl Into<String>) -> AuthResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if azctl_common::env::tls_verification_disabled() {
            warn!("TLS certificate verification is DISABLED for Resource Manager requests");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder
                .build()
                .map_err(|e| AuthError::Validation(format!("could not build HTTP client: {e}")))?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn list_subscriptions(
        &self,
        token: &AccessToken,
    ) -> AuthResult<Vec<ArmSubscription>> {
        let url = format!(
            "{}/subscriptions?api-version={}",
            self.endpoint, ARM_API_VERSION
        );
        self.get_paged(&url, token).await
    }

    pub async fn list_tenants(&self, token: &AccessToken) -> AuthResult<Vec<ArmTenant>> {
        let url = format!("{}/tenants?api-version={}", self.endpoint, ARM_API_VERSION);
        self.get_paged(&url, token).await
    }

    /// Cheap reachability probe run before login-time network operations.
    /// Any HTTP status counts as connected; only transport failures are
    /// retried, a small fixed number of times.
    pub async fn check_connectivity(&self) -> AuthResult<()> {
        let mut last_error = None;

        for attempt in 1..=CONNECTIVITY_ATTEMPTS {
            match self.http.get(&self.endpoint).send().await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    debug!("Connectivity probe attempt {attempt} failed: {err}");
                    last_error = Some(err);
                }
            }
            if attempt < CONNECTIVITY_ATTEMPTS {
                tokio::time::sleep(CONNECTIVITY_RETRY_DELAY).await;
            }
        }

        Err(AuthError::connectivity(format!(
            "could not reach {}: {}",
            self.endpoint,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no response".to_string())
        )))
    }

    async fn get_paged<T: DeserializeOwned>(
        &self,
        first_url: &str,
        token: &AccessToken,
    ) -> AuthResult<Vec<T>> {
        let mut results = Vec::new();
        let mut next = Some(first_url.to_string());

        while let Some(url) = next {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token.token)
                .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
                .send()
                .await
                .map_err(AuthError::from_transport)?;

            let status = response.status();
            let body = response.text().await.map_err(AuthError::from_transport)?;

            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(AuthError::authentication(format!(
                    "Resource Manager rejected the credential ({status}): {body}"
                )));
            }
            if !status.is_success() {
                return Err(AuthError::InvalidResponse(format!(
                    "Resource Manager returned {status}: {body}"
                )));
            }

            let page: Page<T> = serde_json::from_str(&body)
                .map_err(|e| AuthError::InvalidResponse(format!("Resource Manager page: {e}")))?;
            results.extend(page.value);
            next = page.next_link;
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> AccessToken {
        AccessToken {
            token: "arm-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_on: Utc::now() + ChronoDuration::hours(1),
        }
    }

    #[tokio::test]
    async fn subscriptions_follow_next_link_paging() {
        let server = MockServer::start().await;
        let second_page = format!(
            "{}/subscriptions?api-version={}&$skiptoken=abc",
            server.uri(),
            ARM_API_VERSION
        );

        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .and(query_param("$skiptoken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{
                    "id": "/subscriptions/2222",
                    "subscriptionId": "2222",
                    "displayName": "Second",
                    "state": "Enabled"
                }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{
                    "id": "/subscriptions/1111",
                    "subscriptionId": "1111",
                    "displayName": "First",
                    "state": "Disabled",
                    "tenantId": "t-1"
                }],
                "nextLink": second_page
            })))
            .mount(&server)
            .await;

        let client = ArmClient::new(server.uri()).unwrap();
        let subs = client.list_subscriptions(&token()).await.unwrap();

        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].subscription_id, "1111");
        assert_eq!(subs[0].state, SubscriptionState::Disabled);
        assert_eq!(subs[1].display_name, "Second");
    }

    #[tokio::test]
    async fn unauthorized_is_an_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tenants"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let client = ArmClient::new(server.uri()).unwrap();
        let err = client.list_tenants(&token()).await.unwrap_err();
        assert!(matches!(err, AuthError::Authentication { .. }));
    }

    #[tokio::test]
    async fn unknown_subscription_state_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{
                    "id": "/subscriptions/3333",
                    "subscriptionId": "3333",
                    "displayName": "Odd",
                    "state": "SomethingNew"
                }]
            })))
            .mount(&server)
            .await;

        let client = ArmClient::new(server.uri()).unwrap();
        let subs = client.list_subscriptions(&token()).await.unwrap();
        assert_eq!(subs[0].state, SubscriptionState::Unknown);
    }
}
