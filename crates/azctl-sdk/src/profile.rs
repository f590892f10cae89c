//! Account profile
//!
//! The profile owns the credential cache and the subscription storage file
//! for the duration of one command; no other component touches either
//! file. Storage is re-read at the start of every operation because other
//! azctl processes may have written it, and every write is an atomic
//! replace.
//!
//! Login modes are terminal: each ends in a populated subscription list or
//! a propagated authentication failure. The profile never falls back from
//! one mode to another on the caller's behalf.

use crate::adaptor::{
    classify_failure, scope_to_resource, CompatOptions, CredentialAdaptor, CredentialKind,
    TokenCredential,
};
use crate::arm::ArmSubscription;
use crate::cache::{PersistMode, TokenCache};
use crate::error::{AuthError, AuthResult};
use crate::finder::{SubscriptionFinder, TenantSubscriptions};
use crate::identity::{AadClient, DeviceCodeChallenge};
use crate::msi::MsiClient;
use crate::persist::write_atomic;
use crate::types::{
    AccessToken, AccountUser, ServicePrincipalEntry, ServicePrincipalSecret, SubscriptionRecord,
    SubscriptionState, TokenEntry, TokenQuery, UserType,
};
use async_trait::async_trait;
use azctl_common::clouds::Cloud;
use azctl_common::constants::{CLI_CLIENT_ID, TENANT_LEVEL_ACCOUNT_NAME};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Account name recorded for managed-identity sign-ins.
pub const MSI_ACCOUNT_NAME: &str = "systemAssignedIdentity";

const PROFILE_FILE: &str = "azureProfile.json";
const CACHE_FILE: &str = "accessTokens.json";

pub struct Profile {
    storage_path: PathBuf,
    cache: TokenCache,
    cloud: Cloud,
    compat: CompatOptions,
    client_id: String,
}

impl Profile {
    /// Open the profile rooted at `config_dir`, loading the credential
    /// cache alongside it.
    pub async fn load(config_dir: &Path, cloud: Cloud, persist: PersistMode) -> Self {
        let cache = TokenCache::open(config_dir.join(CACHE_FILE), persist).await;
        Self {
            storage_path: config_dir.join(PROFILE_FILE),
            cache,
            cloud,
            compat: CompatOptions::default(),
            client_id: CLI_CLIENT_ID.to_string(),
        }
    }

    pub fn with_compat(mut self, compat: CompatOptions) -> Self {
        self.compat = compat;
        self
    }

    /// Override the client id used for token acquisition.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn cloud(&self) -> &Cloud {
        &self.cloud
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Process-exit barrier; must run before the command returns when the
    /// cache flushes in the background.
    pub async fn shutdown(&mut self) -> AuthResult<()> {
        self.cache.shutdown().await
    }

    // ------------------------------------------------------------------
    // Subscription storage

    /// Current subscription records, read fresh from disk. Missing file is
    /// an empty profile; a corrupt file is recovered as empty with a debug
    /// log, matching the cache's posture.
    pub async fn subscriptions(&self) -> AuthResult<Vec<SubscriptionRecord>> {
        let raw = match tokio::fs::read_to_string(&self.storage_path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(err) => {
                debug!(
                    "Subscription storage at {} is corrupt ({err}), treating as empty",
                    self.storage_path.display()
                );
                Ok(Vec::new())
            }
        }
    }

    async fn write_subscriptions(&self, records: &[SubscriptionRecord]) -> AuthResult<()> {
        let contents = serde_json::to_string_pretty(records)?;
        write_atomic(&self.storage_path, &contents)
            .await
            .map_err(|err| {
                AuthError::Storage(format!(
                    "could not write {}: {err}",
                    self.storage_path.display()
                ))
            })
    }

    /// Convert raw subscription API objects into normalized records. Pure:
    /// no I/O, deterministic, default markers all cleared.
    pub fn normalize_properties(
        user: &AccountUser,
        tenant_id: &str,
        subscriptions: &[ArmSubscription],
        cloud: &Cloud,
    ) -> Vec<SubscriptionRecord> {
        subscriptions
            .iter()
            .map(|s| SubscriptionRecord {
                id: s.subscription_id.clone(),
                name: s.display_name.clone(),
                state: s.state,
                user: user.clone(),
                is_default: false,
                tenant_id: s.tenant_id.clone().unwrap_or_else(|| tenant_id.to_string()),
                environment_name: cloud.name.clone(),
            })
            .collect()
    }

    /// The record synthesized when an identity can reach a tenant but owns
    /// no subscription in it, so the CLI stays usable.
    pub fn tenant_level_record(
        user: &AccountUser,
        tenant_id: &str,
        cloud: &Cloud,
    ) -> SubscriptionRecord {
        SubscriptionRecord {
            id: tenant_id.to_string(),
            name: TENANT_LEVEL_ACCOUNT_NAME.to_string(),
            state: SubscriptionState::Enabled,
            user: user.clone(),
            is_default: false,
            tenant_id: tenant_id.to_string(),
            environment_name: cloud.name.clone(),
        }
    }

    /// Merge `new_records` into storage. Colliding records (same
    /// subscription, user, tenant) are replaced, never duplicated, and
    /// exactly one record ends up default: the first new record whose
    /// state is not disabled/past-due, else the first new record.
    pub async fn set_subscriptions(
        &self,
        mut new_records: Vec<SubscriptionRecord>,
        merge: bool,
    ) -> AuthResult<Vec<SubscriptionRecord>> {
        let mut existing = if merge {
            self.subscriptions().await?
        } else {
            Vec::new()
        };

        existing.retain(|old| !new_records.iter().any(|new| new.same_identity(old)));

        if !new_records.is_empty() {
            for record in existing.iter_mut().chain(new_records.iter_mut()) {
                record.is_default = false;
            }
            let default_idx = new_records
                .iter()
                .position(|r| r.state.is_usable_as_default())
                .unwrap_or(0);
            new_records[default_idx].is_default = true;
        }

        existing.extend(new_records);
        self.write_subscriptions(&existing).await?;
        Ok(existing)
    }

    /// Switch the default subscription by id or, failing that, by name
    /// (case-insensitive). Idempotent.
    pub async fn set_active_subscription(
        &self,
        id_or_name: &str,
    ) -> AuthResult<SubscriptionRecord> {
        let mut records = self.subscriptions().await?;

        let index = records
            .iter()
            .position(|r| r.id.eq_ignore_ascii_case(id_or_name))
            .or_else(|| {
                records
                    .iter()
                    .position(|r| r.name.eq_ignore_ascii_case(id_or_name))
            })
            .ok_or_else(|| AuthError::NotFound {
                kind: "subscription",
                identifier: id_or_name.to_string(),
            })?;

        for (i, record) in records.iter_mut().enumerate() {
            record.is_default = i == index;
        }
        self.write_subscriptions(&records).await?;
        Ok(records[index].clone())
    }

    /// The active subscription, or a named one.
    pub async fn get_subscription(
        &self,
        id_or_name: Option<&str>,
    ) -> AuthResult<SubscriptionRecord> {
        let records = self.subscriptions().await?;
        if records.is_empty() {
            return Err(AuthError::NotLoggedIn);
        }

        match id_or_name {
            None => records
                .into_iter()
                .find(|r| r.is_default)
                .ok_or_else(|| AuthError::Validation(
                    "no subscription is marked active; run `azctl account set --subscription <id>`"
                        .to_string(),
                )),
            Some(wanted) => records
                .iter()
                .find(|r| r.id.eq_ignore_ascii_case(wanted))
                .or_else(|| records.iter().find(|r| r.name.eq_ignore_ascii_case(wanted)))
                .cloned()
                .ok_or_else(|| AuthError::NotFound {
                    kind: "subscription",
                    identifier: wanted.to_string(),
                }),
        }
    }

    // ------------------------------------------------------------------
    // Login modes

    /// Username/password sign-in.
    pub async fn login_with_password(
        &mut self,
        username: &str,
        password: &str,
        tenant: Option<&str>,
        allow_no_subscriptions: bool,
    ) -> AuthResult<Vec<SubscriptionRecord>> {
        let finder = SubscriptionFinder::new(self.cloud.clone())?;
        let found = finder
            .find_with_password(&mut self.cache, &self.client_id, username, password, tenant)
            .await?;

        let user = AccountUser {
            name: username.to_string(),
            user_type: UserType::User,
        };
        self.finalize_login(user, found, allow_no_subscriptions).await
    }

    /// Interactive device-code sign-in; `prompt` shows the challenge.
    pub async fn login_with_device_code<F>(
        &mut self,
        tenant: Option<&str>,
        allow_no_subscriptions: bool,
        prompt: F,
    ) -> AuthResult<Vec<SubscriptionRecord>>
    where
        F: FnOnce(&DeviceCodeChallenge),
    {
        let finder = SubscriptionFinder::new(self.cloud.clone())?;
        let (user_id, found) = finder
            .find_with_device_code(&mut self.cache, &self.client_id, tenant, prompt)
            .await?;

        let user = AccountUser {
            name: user_id,
            user_type: UserType::User,
        };
        self.finalize_login(user, found, allow_no_subscriptions).await
    }

    /// Service-principal sign-in. The credential is persisted so later
    /// commands can re-acquire tokens without prompting.
    pub async fn login_with_service_principal(
        &mut self,
        sp_id: &str,
        secret: ServicePrincipalSecret,
        tenant: &str,
        allow_no_subscriptions: bool,
    ) -> AuthResult<Vec<SubscriptionRecord>> {
        let finder = SubscriptionFinder::new(self.cloud.clone())?;
        let found = finder
            .find_from_service_principal_id(&mut self.cache, sp_id, tenant, &secret)
            .await?;

        self.cache
            .save_service_principal_entry(ServicePrincipalEntry {
                service_principal_id: sp_id.to_string(),
                service_principal_tenant: tenant.to_string(),
                secret,
            })
            .await?;

        let user = AccountUser {
            name: sp_id.to_string(),
            user_type: UserType::ServicePrincipal,
        };
        self.finalize_login(user, found, allow_no_subscriptions).await
    }

    /// Managed-identity sign-in via the local metadata endpoint.
    pub async fn login_with_managed_identity(
        &mut self,
        port: Option<u16>,
        allow_no_subscriptions: bool,
    ) -> AuthResult<Vec<SubscriptionRecord>> {
        let msi = MsiClient::new(port)?;
        let token = msi.acquire_token(&self.cloud.resource_manager).await?;

        let finder = SubscriptionFinder::new(self.cloud.clone())?;
        let found = finder.find_from_access_token(&token).await?;

        let user = AccountUser {
            name: MSI_ACCOUNT_NAME.to_string(),
            user_type: UserType::ServicePrincipal,
        };
        self.finalize_login(user, found, allow_no_subscriptions).await
    }

    /// Cloud-console sign-in: the console injects a token endpoint for the
    /// already-signed-in user, so this is a passthrough, not a prompt.
    pub async fn login_with_cloud_shell(
        &mut self,
        allow_no_subscriptions: bool,
    ) -> AuthResult<Vec<SubscriptionRecord>> {
        let msi = MsiClient::new(None)?;
        let token = msi.acquire_token(&self.cloud.resource_manager).await?;

        let user_name = crate::types::decode_jwt_claim(&token.token, "upn")
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| MSI_ACCOUNT_NAME.to_string());

        let finder = SubscriptionFinder::new(self.cloud.clone())?;
        let found = finder.find_from_access_token(&token).await?;

        let user = AccountUser {
            name: user_name,
            user_type: UserType::User,
        };
        self.finalize_login(user, found, allow_no_subscriptions).await
    }

    /// Persist discovery results: normalize, synthesize the tenant-level
    /// pseudo-subscription when allowed and nothing was found, then merge
    /// into storage. Returns the signed-in identity's records.
    async fn finalize_login(
        &mut self,
        user: AccountUser,
        found: Vec<TenantSubscriptions>,
        allow_no_subscriptions: bool,
    ) -> AuthResult<Vec<SubscriptionRecord>> {
        let mut consolidated: Vec<SubscriptionRecord> = found
            .iter()
            .flat_map(|ts| {
                Self::normalize_properties(&user, &ts.tenant_id, &ts.subscriptions, &self.cloud)
            })
            .collect();

        if consolidated.is_empty() {
            if !allow_no_subscriptions {
                return Err(AuthError::NoSubscriptions(user.name));
            }
            for ts in &found {
                consolidated.push(Self::tenant_level_record(&user, &ts.tenant_id, &self.cloud));
            }
            if consolidated.is_empty() {
                return Err(AuthError::NoSubscriptions(user.name));
            }
        }

        info!(
            "Storing {} subscription(s) for '{}'",
            consolidated.len(),
            user.name
        );
        let all = self.set_subscriptions(consolidated, true).await?;
        Ok(all
            .into_iter()
            .filter(|r| r.user.name.eq_ignore_ascii_case(&user.name))
            .collect())
    }

    // ------------------------------------------------------------------
    // Token retrieval

    /// Resolve a raw `(token_type, token, entry)` for the active (or
    /// named) subscription, refreshing or re-acquiring as needed.
    pub async fn get_raw_token(
        &mut self,
        resource: Option<&str>,
        subscription: Option<&str>,
    ) -> AuthResult<(String, String, TokenEntry)> {
        let record = self.get_subscription(subscription).await?;
        let resource = resource
            .unwrap_or(self.cloud.resource_manager.as_str())
            .to_string();

        let entry = resolve_token_entry(
            &mut self.cache,
            &self.cloud,
            &record,
            &self.client_id,
            &resource,
        )
        .await?;
        Ok((entry.token_type.clone(), entry.access_token.clone(), entry))
    }

    /// Credential for the HTTP pipeline. Token acquisition is deferred
    /// until the pipeline first asks, so commands that never hit the
    /// network never touch the identity service. `aux_tenants` adds one
    /// credential per extra tenant for cross-tenant requests.
    pub async fn get_login_credentials(
        &self,
        subscription: Option<&str>,
        aux_tenants: &[String],
    ) -> AuthResult<CredentialAdaptor> {
        let record = self.get_subscription(subscription).await?;

        let credential = ProfileCredential {
            cloud: self.cloud.clone(),
            record: record.clone(),
            cache_path: self.cache.path().to_path_buf(),
            client_id: self.client_id.clone(),
        };

        let auxiliary = aux_tenants
            .iter()
            .map(|tenant| {
                let mut aux_record = record.clone();
                aux_record.tenant_id = tenant.clone();
                Arc::new(ProfileCredential {
                    cloud: self.cloud.clone(),
                    record: aux_record,
                    cache_path: self.cache.path().to_path_buf(),
                    client_id: self.client_id.clone(),
                }) as Arc<dyn TokenCredential>
            })
            .collect();

        Ok(CredentialAdaptor::new(
            CredentialKind::TokenBearer(Arc::new(credential)),
            self.cloud.resource_manager.clone(),
        )
        .with_auxiliary(auxiliary)
        .with_compat(self.compat))
    }

    // ------------------------------------------------------------------
    // Logout

    /// Remove one identity's subscription records and cached credentials,
    /// leaving every other identity untouched.
    pub async fn logout(&mut self, user: &str) -> AuthResult<()> {
        let records = self.subscriptions().await?;
        let kept: Vec<SubscriptionRecord> = records
            .iter()
            .filter(|r| !r.user.name.eq_ignore_ascii_case(user))
            .cloned()
            .collect();

        if kept.len() == records.len() {
            return Err(AuthError::NotFound {
                kind: "account",
                identifier: user.to_string(),
            });
        }

        self.write_subscriptions(&kept).await?;
        self.cache.remove_cached_creds(user).await
    }

    /// Remove every account: empties subscription storage and deletes the
    /// credential cache file.
    pub async fn logout_all(&mut self) -> AuthResult<()> {
        self.write_subscriptions(&[]).await?;
        self.cache.clear_all().await
    }
}

/// Resolve a token entry for `record`, honoring the cache: an unexpired
/// cached token wins, then a refresh-token renewal, then (for service
/// principals) re-acquisition from the stored secret. Managed-identity and
/// cloud-console accounts mint from the local endpoint every time.
async fn resolve_token_entry(
    cache: &mut TokenCache,
    cloud: &Cloud,
    record: &SubscriptionRecord,
    client_id: &str,
    resource: &str,
) -> AuthResult<TokenEntry> {
    if record.user.name == MSI_ACCOUNT_NAME || azctl_common::env::in_cloud_shell() {
        let msi = MsiClient::new(None)?;
        let token = msi.acquire_token(resource).await?;
        return Ok(msi_entry(cloud, record, client_id, resource, token));
    }

    // The on-disk cache is the source of truth; another process may have
    // refreshed since we loaded.
    cache.load().await;

    match record.user.user_type {
        UserType::User => {
            let authority = cloud.authority(&record.tenant_id);
            let hits = cache.find(&TokenQuery {
                authority: Some(authority.clone()),
                client_id: Some(client_id.to_string()),
                user_id: Some(record.user.name.clone()),
            });

            if let Some(entry) = hits
                .iter()
                .find(|e| e.resource.eq_ignore_ascii_case(resource) && !e.is_expired())
            {
                return Ok(entry.clone());
            }

            // Any refresh token under this authority will do; a
            // multi-resource one from another tenant works too.
            let refreshable = hits
                .iter()
                .find(|e| e.refresh_token.is_some())
                .cloned()
                .or_else(|| {
                    cache
                        .find(&TokenQuery {
                            authority: None,
                            client_id: Some(client_id.to_string()),
                            user_id: Some(record.user.name.clone()),
                        })
                        .into_iter()
                        .find(|e| e.refresh_token.is_some() && e.is_mrrt)
                });

            let Some(source) = refreshable else {
                return Err(AuthError::NotLoggedIn);
            };
            let refresh_token = source.refresh_token.as_deref().unwrap_or_default();

            let aad = AadClient::with_authority(authority)?;
            let entry = aad
                .acquire_token_with_refresh_token(
                    client_id,
                    refresh_token,
                    resource,
                    &record.user.name,
                )
                .await
                .map_err(classify_failure)?;
            cache.upsert_token_entries(vec![entry.clone()]).await?;
            Ok(entry)
        }
        UserType::ServicePrincipal => {
            let sp_id = &record.user.name;
            let hits = cache.find(&TokenQuery {
                authority: None,
                client_id: Some(sp_id.clone()),
                user_id: Some(sp_id.clone()),
            });
            if let Some(entry) = hits
                .iter()
                .find(|e| e.resource.eq_ignore_ascii_case(resource) && !e.is_expired())
            {
                return Ok(entry.clone());
            }

            let sp = cache.retrieve_secret_of_service_principal(sp_id)?.clone();
            let aad = AadClient::new(cloud, &sp.service_principal_tenant)?;
            let entry = match &sp.secret {
                ServicePrincipalSecret::Secret { access_token } => {
                    aad.acquire_token_for_client(sp_id, access_token, resource)
                        .await
                }
                ServicePrincipalSecret::Certificate {
                    certificate_file, ..
                } => {
                    aad.acquire_token_with_certificate(
                        sp_id,
                        Path::new(certificate_file),
                        resource,
                    )
                    .await
                }
            }
            .map_err(classify_failure)?;

            cache.upsert_token_entries(vec![entry.clone()]).await?;
            Ok(entry)
        }
    }
}

fn msi_entry(
    cloud: &Cloud,
    record: &SubscriptionRecord,
    client_id: &str,
    resource: &str,
    token: AccessToken,
) -> TokenEntry {
    TokenEntry {
        client_id: client_id.to_string(),
        authority: cloud.authority(&record.tenant_id),
        user_id: record.user.name.clone(),
        access_token: token.token,
        refresh_token: None,
        token_type: token.token_type,
        resource: resource.to_string(),
        expires_on: token.expires_on,
        is_mrrt: false,
    }
}

/// Lazily-evaluated credential backed by the profile's cache file. Opens
/// its own cache handle on use so the on-disk state stays authoritative.
struct ProfileCredential {
    cloud: Cloud,
    record: SubscriptionRecord,
    cache_path: PathBuf,
    client_id: String,
}

#[async_trait]
impl TokenCredential for ProfileCredential {
    async fn get_token(&self, scopes: &[String]) -> AuthResult<AccessToken> {
        let resource = scopes
            .first()
            .map(|s| scope_to_resource(s).to_string())
            .unwrap_or_else(|| self.cloud.resource_manager.clone());

        let mut cache = TokenCache::open(&self.cache_path, PersistMode::Sync).await;
        let entry = resolve_token_entry(
            &mut cache,
            &self.cloud,
            &self.record,
            &self.client_id,
            &resource,
        )
        .await?;
        Ok(entry.access_token())
    }

    fn name(&self) -> &str {
        "profile"
    }
}
