//! Subscription discovery at login time
//!
//! Exchanges the caller's credentials for tokens, then walks the tenants
//! visible to the identity and lists subscriptions in each. Tokens picked
//! up along the way are written into the credential cache so later
//! commands can run silently.

use crate::adaptor::classify_failure;
use crate::arm::{ArmClient, ArmSubscription};
use crate::cache::TokenCache;
use crate::error::{AuthError, AuthResult};
use crate::identity::{AadClient, DeviceCodeChallenge};
use crate::types::{AccessToken, ServicePrincipalSecret, TokenEntry};
use azctl_common::clouds::Cloud;
use std::path::Path;
use tracing::{debug, warn};

/// Subscriptions found in one tenant.
#[derive(Debug, Clone)]
pub struct TenantSubscriptions {
    pub tenant_id: String,
    pub subscriptions: Vec<ArmSubscription>,
}

pub struct SubscriptionFinder {
    cloud: Cloud,
    arm: ArmClient,
}

impl SubscriptionFinder {
    pub fn new(cloud: Cloud) -> AuthResult<Self> {
        let arm = ArmClient::new(cloud.resource_manager.clone())?;
        Ok(Self { cloud, arm })
    }

    /// Username/password sign-in, then subscription discovery. With no
    /// tenant given the identity's tenants are enumerated and each one is
    /// scanned.
    pub async fn find_with_password(
        &self,
        cache: &mut TokenCache,
        client_id: &str,
        username: &str,
        password: &str,
        tenant: Option<&str>,
    ) -> AuthResult<Vec<TenantSubscriptions>> {
        self.arm.check_connectivity().await?;

        let login_tenant = tenant.unwrap_or("common");
        let aad = AadClient::new(&self.cloud, login_tenant)?;
        let entry = aad
            .acquire_token_with_password(
                client_id,
                username,
                password,
                &self.cloud.resource_manager,
            )
            .await
            .map_err(classify_failure)?;

        self.scan(cache, client_id, entry, tenant).await
    }

    /// Interactive device-code sign-in. `prompt` receives the challenge to
    /// show the user; the method returns once the user completed (or
    /// declined) sign-in in their browser. Returns the signed-in user id
    /// along with the discovery result.
    pub async fn find_with_device_code<F>(
        &self,
        cache: &mut TokenCache,
        client_id: &str,
        tenant: Option<&str>,
        prompt: F,
    ) -> AuthResult<(String, Vec<TenantSubscriptions>)>
    where
        F: FnOnce(&DeviceCodeChallenge),
    {
        self.arm.check_connectivity().await?;

        let login_tenant = tenant.unwrap_or("common");
        let aad = AadClient::new(&self.cloud, login_tenant)?;
        let challenge = aad
            .initiate_device_code(client_id, &self.cloud.resource_manager)
            .await
            .map_err(classify_failure)?;
        prompt(&challenge);

        let entry = aad
            .poll_device_code(client_id, &challenge, &self.cloud.resource_manager)
            .await
            .map_err(classify_failure)?;

        let user_id = entry.user_id.clone();
        let found = self.scan(cache, client_id, entry, tenant).await?;
        Ok((user_id, found))
    }

    /// Service-principal sign-in with a secret or a certificate. Service
    /// principals authenticate against one tenant; `tenant` is required.
    pub async fn find_from_service_principal_id(
        &self,
        cache: &mut TokenCache,
        sp_id: &str,
        tenant: &str,
        secret: &ServicePrincipalSecret,
    ) -> AuthResult<Vec<TenantSubscriptions>> {
        self.arm.check_connectivity().await?;

        let aad = AadClient::new(&self.cloud, tenant)?;
        let entry = match secret {
            ServicePrincipalSecret::Secret { access_token } => {
                aad.acquire_token_for_client(sp_id, access_token, &self.cloud.resource_manager)
                    .await
            }
            ServicePrincipalSecret::Certificate {
                certificate_file, ..
            } => {
                aad.acquire_token_with_certificate(
                    sp_id,
                    Path::new(certificate_file),
                    &self.cloud.resource_manager,
                )
                .await
            }
        }
        .map_err(classify_failure)?;

        let token = entry.access_token();
        cache.upsert_token_entries(vec![entry]).await?;

        let subscriptions = self.arm.list_subscriptions(&token).await?;
        Ok(vec![TenantSubscriptions {
            tenant_id: tenant.to_string(),
            subscriptions,
        }])
    }

    /// Subscription discovery with a pre-acquired token (managed identity
    /// or cloud-shell passthrough). The home tenant is read from the
    /// token's `tid` claim when present.
    pub async fn find_from_access_token(
        &self,
        token: &AccessToken,
    ) -> AuthResult<Vec<TenantSubscriptions>> {
        let tenant_id = crate::types::decode_jwt_claim(&token.token, "tid")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| "common".to_string());

        let subscriptions = self.arm.list_subscriptions(token).await?;
        Ok(vec![TenantSubscriptions {
            tenant_id,
            subscriptions,
        }])
    }

    /// Walk the tenants reachable from `root_entry`. When the caller named
    /// a tenant the scan is just that tenant; otherwise each tenant is
    /// entered by redeeming the multi-resource refresh token against it.
    /// Tenants that refuse the account (disabled, policy-blocked) are
    /// logged and skipped; connectivity failures abort.
    async fn scan(
        &self,
        cache: &mut TokenCache,
        client_id: &str,
        root_entry: TokenEntry,
        tenant: Option<&str>,
    ) -> AuthResult<Vec<TenantSubscriptions>> {
        let root_token = root_entry.access_token();
        let fallback_user = root_entry.user_id.clone();
        let refresh_token = root_entry.refresh_token.clone();

        cache.upsert_token_entries(vec![root_entry]).await?;

        if let Some(tenant) = tenant {
            let subscriptions = self.arm.list_subscriptions(&root_token).await?;
            return Ok(vec![TenantSubscriptions {
                tenant_id: tenant.to_string(),
                subscriptions,
            }]);
        }

        let tenants = self.arm.list_tenants(&root_token).await?;
        debug!("Identity can see {} tenant(s)", tenants.len());

        let Some(refresh_token) = refresh_token else {
            // No refresh token to hop tenants with; list with what we have.
            let subscriptions = self.arm.list_subscriptions(&root_token).await?;
            return Ok(vec![TenantSubscriptions {
                tenant_id: "common".to_string(),
                subscriptions,
            }]);
        };

        let mut found = Vec::new();
        for tenant in tenants {
            let aad = AadClient::new(&self.cloud, &tenant.tenant_id)?;
            let entry = match aad
                .acquire_token_with_refresh_token(
                    client_id,
                    &refresh_token,
                    &self.cloud.resource_manager,
                    &fallback_user,
                )
                .await
                .map_err(classify_failure)
            {
                Ok(entry) => entry,
                Err(err @ AuthError::Authentication { .. }) => {
                    warn!(
                        "Skipping tenant {}: {err}",
                        tenant.display_name.as_deref().unwrap_or(&tenant.tenant_id)
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };

            let token = entry.access_token();
            cache.upsert_token_entries(vec![entry]).await?;

            let subscriptions = self.arm.list_subscriptions(&token).await?;
            found.push(TenantSubscriptions {
                tenant_id: tenant.tenant_id,
                subscriptions,
            });
        }

        Ok(found)
    }
}
