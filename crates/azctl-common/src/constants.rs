//! Identity and API constants compiled into the binary
//!
//! These values are pre-compiled to avoid the need for external
//! configuration files on first use.

/// Client id of the first-party CLI application registration.
///
/// Present in every Azure AD tenant, so no per-tenant app registration is
/// needed before a user can sign in.
pub const CLI_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Api-version used for Resource Manager `subscriptions` and `tenants` calls.
pub const ARM_API_VERSION: &str = "2019-11-01";

/// Default port of the local managed-identity token endpoint.
pub const DEFAULT_MSI_PORT: u16 = 50342;

/// Placeholder subscription name used when an identity has access to a
/// tenant but to no subscription in it.
pub const TENANT_LEVEL_ACCOUNT_NAME: &str = "N/A(tenant level account)";
