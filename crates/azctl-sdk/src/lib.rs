//! Authentication and account subsystem for azctl
//!
//! Three layers, leaf-first:
//! - [`cache::TokenCache`] persists OAuth token entries and
//!   service-principal credentials across CLI invocations.
//! - [`adaptor::CredentialAdaptor`] presents one calling convention to
//!   HTTP-client code over both legacy request-signing and modern
//!   bearer-token credential contracts.
//! - [`profile::Profile`] orchestrates login flows, discovers the
//!   subscriptions visible to an identity, and keeps the normalized
//!   subscription list with its active/default marker.

pub mod adaptor;
pub mod arm;
pub mod cache;
pub mod error;
pub mod identity;
pub mod msi;
pub mod profile;

mod finder;
mod persist;
mod types;

pub use adaptor::{CompatOptions, CredentialAdaptor, CredentialKind, TokenCredential};
pub use arm::{ArmClient, ArmSubscription, ArmTenant};
pub use cache::{PersistMode, TokenCache};
pub use error::{AuthError, AuthResult};
pub use finder::{SubscriptionFinder, TenantSubscriptions};
pub use identity::{AadClient, DeviceCodeChallenge};
pub use msi::MsiClient;
pub use profile::{Profile, MSI_ACCOUNT_NAME};
pub use types::{
    AccessToken, AccountUser, ServicePrincipalEntry, ServicePrincipalSecret, SubscriptionRecord,
    SubscriptionState, TokenEntry, TokenQuery, UserType,
};
