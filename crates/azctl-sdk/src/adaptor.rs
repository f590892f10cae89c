//! Credential adaptor
//!
//! HTTP-client code gets one calling convention regardless of whether the
//! underlying credential signs requests (the older SDK contract) or hands
//! out bearer tokens for scopes (the current one). Which contract applies
//! is fixed once at construction via [`CredentialKind`]; there is no
//! per-call probing.
//!
//! Failures crossing this boundary are translated into the subsystem's own
//! error type: connectivity problems get a remediation hint, identity
//! errors are classified by their AADSTS code into specific re-auth
//! guidance, and anything unrecognized is re-raised with its original
//! message.

use crate::error::{AuthError, AuthResult};
use crate::types::AccessToken;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying tokens for auxiliary tenants on cross-tenant requests.
pub const AUXILIARY_AUTHORIZATION_HEADER: &str = "x-ms-authorization-auxiliary";

/// Modern credential contract: hand out a bearer token for a set of scopes.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> AuthResult<AccessToken>;

    /// Name for logging/debugging.
    fn name(&self) -> &str;
}

/// Legacy credential contract: sign the outgoing request directly.
#[async_trait]
pub trait LegacyCredential: Send + Sync {
    async fn sign_request(&self, headers: &mut HeaderMap) -> AuthResult<()>;

    fn name(&self) -> &str;
}

/// The credential capability, resolved once at construction.
#[derive(Clone)]
pub enum CredentialKind {
    TokenBearer(Arc<dyn TokenCredential>),
    LegacySigning(Arc<dyn LegacyCredential>),
}

impl std::fmt::Debug for CredentialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialKind::TokenBearer(c) => write!(f, "TokenBearer({})", c.name()),
            CredentialKind::LegacySigning(c) => write!(f, "LegacySigning({})", c.name()),
        }
    }
}

/// Compatibility switches for quirks of older SDK generations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatOptions {
    /// Drop the first scope when more than one is passed, as the buggy SDK
    /// generation expected. Off by default: it is order-dependent and
    /// silently discards a caller's legitimate first scope on fixed SDKs.
    pub drop_first_scope: bool,
}

/// Uniform credential front presented to the HTTP pipeline.
pub struct CredentialAdaptor {
    primary: CredentialKind,
    auxiliary: Vec<Arc<dyn TokenCredential>>,
    default_resource: String,
    compat: CompatOptions,
}

impl CredentialAdaptor {
    pub fn new(primary: CredentialKind, default_resource: impl Into<String>) -> Self {
        Self {
            primary,
            auxiliary: Vec::new(),
            default_resource: default_resource.into(),
            compat: CompatOptions::default(),
        }
    }

    /// Add credentials for auxiliary tenants; their tokens ride along on
    /// cross-tenant requests.
    pub fn with_auxiliary(mut self, auxiliary: Vec<Arc<dyn TokenCredential>>) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    pub fn with_compat(mut self, compat: CompatOptions) -> Self {
        self.compat = compat;
        self
    }

    /// Resolve scopes and fetch the primary token plus one token per
    /// auxiliary credential.
    ///
    /// No scopes means the configured default resource in its
    /// `{resource}/.default` scope form.
    pub async fn get_token(
        &self,
        scopes: &[String],
    ) -> AuthResult<(AccessToken, Vec<AccessToken>)> {
        let scopes = self.resolve_scopes(scopes);

        let primary = match &self.primary {
            CredentialKind::TokenBearer(cred) => cred
                .get_token(&scopes)
                .await
                .map_err(classify_failure)?,
            CredentialKind::LegacySigning(cred) => {
                return Err(AuthError::Validation(format!(
                    "credential '{}' signs requests and does not expose bearer tokens",
                    cred.name()
                )))
            }
        };

        let mut auxiliary = Vec::with_capacity(self.auxiliary.len());
        for cred in &self.auxiliary {
            auxiliary.push(cred.get_token(&scopes).await.map_err(classify_failure)?);
        }

        Ok((primary, auxiliary))
    }

    /// Attach authorization headers to an outgoing request: `Authorization`
    /// from the primary credential and, when auxiliary tenants are
    /// configured, `x-ms-authorization-auxiliary` with their tokens joined
    /// by semicolons.
    pub async fn signed_session(&self, headers: &mut HeaderMap) -> AuthResult<()> {
        match &self.primary {
            CredentialKind::LegacySigning(cred) => {
                cred.sign_request(headers).await.map_err(classify_failure)?;
            }
            CredentialKind::TokenBearer(_) => {
                let (primary, auxiliary) = self.get_token(&[]).await?;
                headers.insert(AUTHORIZATION, bearer_value(&primary)?);

                if !auxiliary.is_empty() {
                    let joined = auxiliary
                        .iter()
                        .map(|t| format!("Bearer {}", t.token))
                        .collect::<Vec<_>>()
                        .join(";");
                    headers.insert(
                        AUXILIARY_AUTHORIZATION_HEADER,
                        HeaderValue::from_str(&joined).map_err(|e| {
                            AuthError::Validation(format!("auxiliary token not header-safe: {e}"))
                        })?,
                    );
                }
            }
        }
        Ok(())
    }

    fn resolve_scopes(&self, scopes: &[String]) -> Vec<String> {
        if scopes.is_empty() {
            return vec![resource_to_scope(&self.default_resource)];
        }

        let mut scopes = scopes.to_vec();
        if self.compat.drop_first_scope && scopes.len() > 1 {
            let dropped = scopes.remove(0);
            debug!("Compat shim dropped leading scope '{dropped}'");
        }
        scopes
    }
}

fn bearer_value(token: &AccessToken) -> AuthResult<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.token))
        .map_err(|e| AuthError::Validation(format!("token not header-safe: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Convert a legacy resource URI into its `/.default` scope form.
pub fn resource_to_scope(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

/// Inverse of [`resource_to_scope`], for token endpoints that still speak
/// in resources.
pub fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// AADSTS error-code table: code, guidance. Kept additive; unknown codes
/// fall through untouched.
const AADSTS_GUIDANCE: &[(&str, &str)] = &[
    (
        "AADSTS70008",
        "The cached credential has expired. Please run `azctl login` to re-authenticate",
    ),
    (
        "AADSTS50173",
        "The account's grants were revoked or its password changed since sign-in. Please run `azctl login` to re-authenticate",
    ),
    (
        "AADSTS50076",
        "Multi-factor authentication is required. Please run `azctl login` to sign in interactively",
    ),
    (
        "AADSTS50078",
        "Multi-factor authentication enrollment is required. Please run `azctl login` to sign in interactively",
    ),
    (
        "AADSTS50079",
        "Multi-factor authentication enrollment is required. Please run `azctl login` to sign in interactively",
    ),
    (
        "AADSTS53003",
        "Access is blocked by a Conditional Access policy. Please sign in interactively with `azctl login` or contact your administrator",
    ),
    (
        "AADSTS700016",
        "The application is not registered in the target tenant. Check the --tenant value and the client id",
    ),
    (
        "AADSTS50057",
        "The account is disabled. Contact your administrator, or sign in with a different account",
    ),
];

/// Pull the `AADSTS<digits>` code out of an error body, if present.
fn extract_aadsts_code(text: &str) -> Option<String> {
    let start = text.find("AADSTS")?;
    let digits: String = text[start + "AADSTS".len()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("AADSTS{digits}"))
}

/// Classify a failure crossing the adaptor boundary into a user-facing
/// error. Side effect: in constrained cloud-console environments the local
/// host name is logged once, at warning level, for support diagnosis.
pub(crate) fn classify_failure(err: AuthError) -> AuthError {
    log_console_host_once();

    let (code, message, guidance) = match err {
        AuthError::Authentication {
            code,
            message,
            guidance,
        } => (code, message, guidance),
        other => return other,
    };

    let code = code.or_else(|| extract_aadsts_code(&message));
    if let Some(code) = &code {
        if let Some((_, mapped)) = AADSTS_GUIDANCE.iter().find(|(c, _)| c == code) {
            return AuthError::Authentication {
                code: Some(code.clone()),
                message,
                guidance: (*mapped).to_string(),
            };
        }
    }

    // Last resort: substring matching for responses without a usable code.
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("interaction_required") || lowered.contains("token is expired") {
        return AuthError::Authentication {
            code,
            message,
            guidance: "Please run `azctl login` to re-authenticate".to_string(),
        };
    }

    AuthError::Authentication { code, message, guidance }
}

/// Whether the error indicates the account cannot sign in to a tenant at
/// all (disabled or similar), as opposed to a transient or scope problem.
pub(crate) fn is_account_disabled(err: &AuthError) -> bool {
    match err {
        AuthError::Authentication { code, message, .. } => {
            code.as_deref() == Some("AADSTS50057")
                || message.to_ascii_lowercase().contains("account is disabled")
        }
        _ => false,
    }
}

static CONSOLE_HOST_LOGGED: OnceCell<()> = OnceCell::new();

fn log_console_host_once() {
    if !azctl_common::env::in_cloud_shell() {
        return;
    }
    CONSOLE_HOST_LOGGED.get_or_init(|| {
        if let Some(host) = sysinfo::System::host_name() {
            warn!("Authentication failure on console host '{host}'");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    struct StubCredential {
        calls: Mutex<Vec<Vec<String>>>,
        token: String,
    }

    impl StubCredential {
        fn new(token: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                token: token.to_string(),
            })
        }

        fn requested_scopes(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TokenCredential for StubCredential {
        async fn get_token(&self, scopes: &[String]) -> AuthResult<AccessToken> {
            self.calls.lock().unwrap().push(scopes.to_vec());
            Ok(AccessToken {
                token: self.token.clone(),
                token_type: "Bearer".to_string(),
                expires_on: Utc::now() + Duration::hours(1),
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn empty_scopes_fall_back_to_default_resource_scope() {
        let stub = StubCredential::new("t");
        let adaptor = CredentialAdaptor::new(
            CredentialKind::TokenBearer(stub.clone()),
            "https://management.azure.com/",
        );

        adaptor.get_token(&[]).await.unwrap();

        assert_eq!(
            stub.requested_scopes(),
            vec![vec!["https://management.azure.com/.default".to_string()]]
        );
    }

    #[tokio::test]
    async fn multiple_scopes_pass_through_unless_compat_shim_enabled() {
        let scopes = vec!["first/.default".to_string(), "second/.default".to_string()];

        let stub = StubCredential::new("t");
        let adaptor =
            CredentialAdaptor::new(CredentialKind::TokenBearer(stub.clone()), "https://r");
        adaptor.get_token(&scopes).await.unwrap();
        assert_eq!(stub.requested_scopes(), vec![scopes.clone()]);

        let stub = StubCredential::new("t");
        let adaptor = CredentialAdaptor::new(CredentialKind::TokenBearer(stub.clone()), "https://r")
            .with_compat(CompatOptions {
                drop_first_scope: true,
            });
        adaptor.get_token(&scopes).await.unwrap();
        assert_eq!(
            stub.requested_scopes(),
            vec![vec!["second/.default".to_string()]]
        );
    }

    #[tokio::test]
    async fn signed_session_sets_bearer_and_auxiliary_headers() {
        let primary = StubCredential::new("primary-token");
        let aux1 = StubCredential::new("aux-one");
        let aux2 = StubCredential::new("aux-two");
        let adaptor = CredentialAdaptor::new(CredentialKind::TokenBearer(primary), "https://r")
            .with_auxiliary(vec![aux1 as Arc<dyn TokenCredential>, aux2]);

        let mut headers = HeaderMap::new();
        adaptor.signed_session(&mut headers).await.unwrap();

        assert_eq!(headers[AUTHORIZATION], "Bearer primary-token");
        assert_eq!(
            headers[AUXILIARY_AUTHORIZATION_HEADER],
            "Bearer aux-one;Bearer aux-two"
        );
    }

    struct StubSigner;

    #[async_trait]
    impl LegacyCredential for StubSigner {
        async fn sign_request(&self, headers: &mut HeaderMap) -> AuthResult<()> {
            headers.insert(AUTHORIZATION, HeaderValue::from_static("SharedKey abc"));
            Ok(())
        }

        fn name(&self) -> &str {
            "stub-signer"
        }
    }

    #[tokio::test]
    async fn legacy_credentials_sign_the_session_directly() {
        let adaptor =
            CredentialAdaptor::new(CredentialKind::LegacySigning(Arc::new(StubSigner)), "https://r");

        let mut headers = HeaderMap::new();
        adaptor.signed_session(&mut headers).await.unwrap();
        assert_eq!(headers[AUTHORIZATION], "SharedKey abc");

        // A signing-only credential cannot hand out bearer tokens.
        assert!(matches!(
            adaptor.get_token(&[]).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn known_code_maps_to_specific_guidance() {
        let classified = classify_failure(AuthError::Authentication {
            code: None,
            message: "AADSTS70008: The provided grant has expired".to_string(),
            guidance: String::new(),
        });

        match classified {
            AuthError::Authentication { code, guidance, .. } => {
                assert_eq!(code.as_deref(), Some("AADSTS70008"));
                assert!(guidance.contains("azctl login"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_errors_keep_their_original_message() {
        let original = AuthError::Authentication {
            code: None,
            message: "AADSTS99999: something new".to_string(),
            guidance: "original guidance".to_string(),
        };
        match classify_failure(original) {
            AuthError::Authentication { code, message, guidance } => {
                assert_eq!(code.as_deref(), Some("AADSTS99999"));
                assert_eq!(message, "AADSTS99999: something new");
                assert_eq!(guidance, "original guidance");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn non_authentication_errors_pass_through() {
        let err = classify_failure(AuthError::connectivity("dns failure"));
        assert!(matches!(err, AuthError::Connectivity { .. }));
    }

    #[test]
    fn scope_resource_conversions() {
        assert_eq!(
            resource_to_scope("https://management.azure.com/"),
            "https://management.azure.com/.default"
        );
        assert_eq!(
            scope_to_resource("https://management.azure.com/.default"),
            "https://management.azure.com"
        );
        assert_eq!(scope_to_resource("plain-resource"), "plain-resource");
    }

    #[test]
    fn disabled_account_detection() {
        assert!(is_account_disabled(&AuthError::Authentication {
            code: Some("AADSTS50057".to_string()),
            message: "disabled".to_string(),
            guidance: String::new(),
        }));
        assert!(!is_account_disabled(&AuthError::NotLoggedIn));
    }
}
