//! On-disk and in-memory data model for the authentication subsystem
//!
//! Field names on the wire match the historical cache and profile file
//! formats (camelCase, with the `_clientId`/`_authority` prefixes on token
//! entries), so the files stay readable across versions. The schema is
//! additive-only.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cached OAuth token, uniquely identified by
/// (authority, client id, user id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEntry {
    #[serde(rename = "_clientId")]
    pub client_id: String,
    #[serde(rename = "_authority")]
    pub authority: String,
    pub user_id: String,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub resource: String,
    pub expires_on: DateTime<Utc>,
    /// Multi-resource refresh token: the refresh token can be redeemed for
    /// other resources and other tenants of the same authority.
    #[serde(rename = "isMRRT", default)]
    pub is_mrrt: bool,
}

impl TokenEntry {
    /// The identity tuple this entry is keyed by.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.authority, &self.client_id, &self.user_id)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }

    pub fn access_token(&self) -> AccessToken {
        AccessToken {
            token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_on: self.expires_on,
        }
    }
}

/// Partial-entry query for [`TokenEntry`] lookups. Entries match when every
/// populated field is equal; an empty query matches everything.
#[derive(Debug, Clone, Default)]
pub struct TokenQuery {
    pub authority: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
}

impl TokenQuery {
    pub fn matches(&self, entry: &TokenEntry) -> bool {
        fn field_matches(wanted: &Option<String>, actual: &str) -> bool {
            match wanted {
                Some(wanted) => wanted.eq_ignore_ascii_case(actual),
                None => true,
            }
        }

        field_matches(&self.authority, &entry.authority)
            && field_matches(&self.client_id, &entry.client_id)
            && field_matches(&self.user_id, &entry.user_id)
    }
}

/// Saved service-principal credential, unique per principal id. The entry
/// kind on disk is distinguished by which fields are present: `accessToken`
/// for a secret, `certificateFile` + `thumbprint` for a certificate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalEntry {
    pub service_principal_id: String,
    pub service_principal_tenant: String,
    #[serde(flatten)]
    pub secret: ServicePrincipalSecret,
}

/// The credential material of a service principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServicePrincipalSecret {
    #[serde(rename_all = "camelCase")]
    Secret { access_token: String },
    #[serde(rename_all = "camelCase")]
    Certificate {
        certificate_file: String,
        thumbprint: String,
    },
}

impl ServicePrincipalEntry {
    /// Reject entries whose credential material is empty.
    pub fn validate(&self) -> Result<(), String> {
        match &self.secret {
            ServicePrincipalSecret::Secret { access_token } if access_token.is_empty() => Err(
                format!("service principal '{}' has an empty secret", self.service_principal_id),
            ),
            ServicePrincipalSecret::Certificate { certificate_file, .. }
                if certificate_file.is_empty() =>
            {
                Err(format!(
                    "service principal '{}' has an empty certificate path",
                    self.service_principal_id
                ))
            }
            _ => Ok(()),
        }
    }
}

/// A bearer token ready to be attached to a request.
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub token_type: String,
    pub expires_on: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Identity that owns a set of subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUser {
    pub name: String,
    #[serde(rename = "type")]
    pub user_type: UserType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserType {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "servicePrincipal")]
    ServicePrincipal,
}

/// Lifecycle state reported by Resource Manager for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Enabled,
    Warned,
    PastDue,
    Disabled,
    Deleted,
    #[serde(other)]
    Unknown,
}

impl SubscriptionState {
    /// States that disqualify a subscription from being auto-picked as the
    /// default at login.
    pub fn is_usable_as_default(&self) -> bool {
        !matches!(self, SubscriptionState::Disabled | SubscriptionState::PastDue)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubscriptionState::Enabled => "Enabled",
            SubscriptionState::Warned => "Warned",
            SubscriptionState::PastDue => "PastDue",
            SubscriptionState::Disabled => "Disabled",
            SubscriptionState::Deleted => "Deleted",
            SubscriptionState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One normalized subscription record as persisted in the profile file.
/// At most one record in storage has `is_default == true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub id: String,
    pub name: String,
    pub state: SubscriptionState,
    pub user: AccountUser,
    pub is_default: bool,
    pub tenant_id: String,
    pub environment_name: String,
}

impl SubscriptionRecord {
    /// Records collide when they describe the same subscription for the
    /// same identity in the same tenant.
    pub fn same_identity(&self, other: &SubscriptionRecord) -> bool {
        self.id.eq_ignore_ascii_case(&other.id)
            && self.user.name.eq_ignore_ascii_case(&other.user.name)
            && self.tenant_id.eq_ignore_ascii_case(&other.tenant_id)
    }
}

/// Decode one claim out of an unverified JWT payload.
///
/// Used to pull the signed-in user id (`upn`/`unique_name`) and expiry out
/// of tokens without a validation dependency; the token was just issued to
/// us over TLS, so signature checking adds nothing here.
pub(crate) fn decode_jwt_claim(token: &str, claim: &str) -> Option<serde_json::Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('=')).ok()?;
    let json: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    json.get(claim).cloned()
}
