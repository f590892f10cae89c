use clap::Subcommand;
use std::path::PathBuf;

/// Main CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in to Azure
    Login {
        #[command(flatten)]
        options: LoginOptions,
    },

    /// Sign out of one account, or of everything
    Logout {
        /// Account to sign out (user name or service-principal id);
        /// defaults to the active account
        #[arg(long)]
        username: Option<String>,

        /// Sign out every account and delete the credential cache
        #[arg(long, conflicts_with = "username")]
        all: bool,
    },

    /// Manage the subscriptions known to the CLI
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

/// Options for `azctl login`
#[derive(clap::Args, Debug)]
pub struct LoginOptions {
    /// User name, or the application id with --service-principal
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password, or the client secret with --service-principal; prompted
    /// for when omitted
    #[arg(short, long)]
    pub password: Option<String>,

    /// Sign in a service principal instead of a user
    #[arg(long)]
    pub service_principal: bool,

    /// PEM file with certificate and private key, as the
    /// service-principal credential
    #[arg(long, requires = "service_principal")]
    pub certificate: Option<PathBuf>,

    /// Tenant id or domain to sign in to
    #[arg(short, long)]
    pub tenant: Option<String>,

    /// Sign in with the machine's managed identity
    #[arg(long, conflicts_with_all = ["username", "service_principal"])]
    pub identity: bool,

    /// Use the device-code flow instead of username/password
    #[arg(long)]
    pub use_device_code: bool,

    /// Keep the login even when the identity has no subscription,
    /// recording tenant-level access instead
    #[arg(long)]
    pub allow_no_subscriptions: bool,

    /// Cloud to sign in to (AzureCloud, AzureChinaCloud,
    /// AzureUSGovernment); persisted for later commands
    #[arg(long)]
    pub cloud: Option<String>,
}

/// Subscription management actions
#[derive(Subcommand, Debug)]
pub enum AccountAction {
    /// List all subscriptions of all signed-in accounts
    List,

    /// Show the active subscription, or a named one
    Show {
        /// Subscription id or name
        #[arg(short, long)]
        subscription: Option<String>,
    },

    /// Make a subscription the active one
    Set {
        /// Subscription id or name
        #[arg(short, long)]
        subscription: String,
    },

    /// Remove every account and clear cached credentials
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Print a raw access token for the active subscription
    GetAccessToken {
        /// Resource URI the token should be good for
        #[arg(long)]
        resource: Option<String>,

        /// Subscription id or name
        #[arg(short, long)]
        subscription: Option<String>,
    },
}
