//! End-to-end tests for the login → discovery → storage pipeline, with the
//! identity service and Resource Manager both mocked.

use azctl_common::clouds::Cloud;
use azctl_sdk::{
    AuthError, PersistMode, Profile, ServicePrincipalSecret, SubscriptionState, TokenQuery,
    UserType,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Cloud whose authority and Resource Manager both point at the mock.
fn mock_cloud(server: &MockServer) -> Cloud {
    Cloud {
        name: "AzureCloud".to_string(),
        authority_host: server.uri(),
        resource_manager: server.uri(),
    }
}

fn token_json(access: &str, refresh: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": "3599"
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::Value::String(refresh.to_string());
    }
    body
}

fn subscription_json(id: &str, name: &str, state: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("/subscriptions/{id}"),
        "subscriptionId": id,
        "displayName": name,
        "state": state,
        "tenantId": "tenant-1"
    })
}

#[tokio::test]
async fn password_login_discovers_tenants_and_stores_one_default() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/common/oauth2/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("root-token", Some("rt-1"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tenants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [{ "tenantId": "tenant-1", "displayName": "Contoso" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("tenant-token", Some("rt-2"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                subscription_json("1111", "Frozen", "Disabled"),
                subscription_json("2222", "Active", "Enabled"),
            ]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut profile = Profile::load(dir.path(), mock_cloud(&server), PersistMode::Sync).await;

    let records = profile
        .login_with_password("alice@contoso.com", "hunter2", None, false)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|r| r.is_default).count(), 1);
    // Skip-disabled tie-break: the enabled subscription wins.
    let default = records.iter().find(|r| r.is_default).unwrap();
    assert_eq!(default.id, "2222");
    assert_eq!(default.state, SubscriptionState::Enabled);
    assert_eq!(default.user.name, "alice@contoso.com");
    assert_eq!(default.user.user_type, UserType::User);
    assert_eq!(default.tenant_id, "tenant-1");

    // Both the common and the per-tenant tokens were cached.
    let cached = profile.cache().find(&TokenQuery::default());
    assert_eq!(cached.len(), 2);

    // The tenant token satisfies raw-token retrieval without another
    // network round-trip.
    let (token_type, token, entry) = profile.get_raw_token(None, None).await.unwrap();
    assert_eq!(token_type, "Bearer");
    assert_eq!(token, "tenant-token");
    assert_eq!(entry.user_id, "alice@contoso.com");
}

#[tokio::test]
async fn tenants_that_refuse_the_account_are_skipped_not_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/common/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("root-token", Some("rt-1"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tenants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [
                { "tenantId": "tenant-bad" },
                { "tenantId": "tenant-1" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-bad/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "AADSTS50057: The user account is disabled."
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("tenant-token", Some("rt-2"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [subscription_json("2222", "Active", "Enabled")]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut profile = Profile::load(dir.path(), mock_cloud(&server), PersistMode::Sync).await;

    let records = profile
        .login_with_password("alice@contoso.com", "hunter2", None, false)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tenant_id, "tenant-1");
}

#[tokio::test]
async fn service_principal_login_persists_the_credential_for_reuse() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("sp-token", None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [subscription_json("3333", "SP owned", "Enabled")]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut profile = Profile::load(dir.path(), mock_cloud(&server), PersistMode::Sync).await;

    let records = profile
        .login_with_service_principal(
            "app-1234",
            ServicePrincipalSecret::Secret {
                access_token: "sp-secret".to_string(),
            },
            "tenant-1",
            false,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user.user_type, UserType::ServicePrincipal);
    assert!(records[0].is_default);

    let stored = profile
        .cache()
        .retrieve_secret_of_service_principal("app-1234")
        .unwrap();
    assert_eq!(stored.service_principal_tenant, "tenant-1");

    // Logging out removes the records and the stored credential, nothing
    // else.
    profile.logout("app-1234").await.unwrap();
    assert!(profile.subscriptions().await.unwrap().is_empty());
    assert!(profile
        .cache()
        .retrieve_secret_of_service_principal("app-1234")
        .is_err());
}

#[tokio::test]
async fn no_subscriptions_is_an_error_unless_explicitly_allowed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json("sp-token", None)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "value": [] })),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut profile = Profile::load(dir.path(), mock_cloud(&server), PersistMode::Sync).await;

    let secret = ServicePrincipalSecret::Secret {
        access_token: "sp-secret".to_string(),
    };
    let err = profile
        .login_with_service_principal("app-1234", secret.clone(), "tenant-1", false)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoSubscriptions(_)));

    let records = profile
        .login_with_service_principal("app-1234", secret, "tenant-1", true)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "tenant-1");
    assert_eq!(records[0].name, "N/A(tenant level account)");
}

#[tokio::test]
async fn expired_cached_tokens_are_silently_refreshed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "stale-token",
            "refresh_token": "rt-1",
            "token_type": "Bearer",
            "expires_in": "0"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("fresh-token", Some("rt-2"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [subscription_json("2222", "Active", "Enabled")]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut profile = Profile::load(dir.path(), mock_cloud(&server), PersistMode::Sync).await;
    profile
        .login_with_password("alice@contoso.com", "hunter2", Some("tenant-1"), false)
        .await
        .unwrap();

    // The cached access token is already expired; retrieval must redeem
    // the refresh token instead of handing back the stale one.
    let (_, token, entry) = profile.get_raw_token(None, None).await.unwrap();
    assert_eq!(token, "fresh-token");
    assert_eq!(entry.refresh_token.as_deref(), Some("rt-2"));

    // The refreshed entry replaced the stale one in the cache.
    let cached = profile.cache().find(&TokenQuery::default());
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].access_token, "fresh-token");
}

#[tokio::test]
async fn login_credentials_resolve_lazily_from_the_cache() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_json("tenant-token", Some("rt-1"))),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "value": [subscription_json("2222", "Active", "Enabled")]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut profile = Profile::load(dir.path(), mock_cloud(&server), PersistMode::Sync).await;
    profile
        .login_with_password("alice@contoso.com", "hunter2", Some("tenant-1"), false)
        .await
        .unwrap();

    let requests_after_login = server.received_requests().await.unwrap().len();

    // Building the adaptor performs no network I/O.
    let adaptor = profile.get_login_credentials(None, &[]).await.unwrap();
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        requests_after_login
    );

    // The first token request is served from the cache file.
    let (primary, auxiliary) = adaptor.get_token(&[]).await.unwrap();
    assert_eq!(primary.token, "tenant-token");
    assert!(auxiliary.is_empty());
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        requests_after_login
    );
}
