//! Authentication command handlers

use crate::cli::commands::LoginOptions;
use crate::cli::handlers::open_profile;
use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::output::{account_table, json_output, print_info, print_success};
use azctl_sdk::identity::certificate_thumbprint;
use azctl_sdk::{AuthError, Profile, ServicePrincipalSecret};
use std::path::Path;
use tracing::debug;

/// Handle the login command
pub async fn handle_login(
    options: LoginOptions,
    config_dir: &Path,
    mut config: CliConfig,
    json: bool,
) -> Result<()> {
    let LoginOptions {
        username,
        password,
        service_principal,
        certificate,
        tenant,
        identity,
        use_device_code,
        allow_no_subscriptions,
        cloud,
    } = options;

    // An explicit cloud choice sticks for later commands.
    if let Some(cloud_name) = cloud.as_deref() {
        let resolved = config.resolve_cloud(Some(cloud_name))?;
        if config.cloud.name != resolved.name {
            config.cloud.name = resolved.name;
            config.save(config_dir).await?;
        }
    }

    let mut profile = open_profile(config_dir, &config, cloud.as_deref()).await?;
    let tenant = tenant.as_deref();

    let outcome = if identity {
        debug!("Signing in with managed identity");
        profile
            .login_with_managed_identity(config.auth.msi_port, allow_no_subscriptions)
            .await
    } else if service_principal {
        let sp_id = username.ok_or_else(|| {
            CliError::invalid_argument("--service-principal requires --username <app-id>")
        })?;
        let tenant = tenant.ok_or_else(|| {
            CliError::invalid_argument("--service-principal requires --tenant")
                .with_suggestion("Service principals sign in to one tenant; pass --tenant <id>")
        })?;

        let secret = match certificate {
            Some(path) => {
                let pem = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    CliError::internal(format!(
                        "could not read certificate '{}': {e}",
                        path.display()
                    ))
                })?;
                ServicePrincipalSecret::Certificate {
                    certificate_file: path.display().to_string(),
                    thumbprint: certificate_thumbprint(&pem).map_err(CliError::Auth)?,
                }
            }
            None => {
                let secret = match password {
                    Some(secret) => secret,
                    None => prompt_secret(&format!("Client secret for {sp_id}"))?,
                };
                ServicePrincipalSecret::Secret {
                    access_token: secret,
                }
            }
        };

        profile
            .login_with_service_principal(&sp_id, secret, tenant, allow_no_subscriptions)
            .await
    } else if azctl_common::env::in_cloud_shell() && username.is_none() && !use_device_code {
        print_info("Signing in with the cloud-console identity...");
        profile.login_with_cloud_shell(allow_no_subscriptions).await
    } else if let Some(username) = username {
        let password = match password {
            Some(password) => password,
            None => prompt_secret(&format!("Password for {username}"))?,
        };
        profile
            .login_with_password(&username, &password, tenant, allow_no_subscriptions)
            .await
    } else {
        profile
            .login_with_device_code(tenant, allow_no_subscriptions, |challenge| {
                match &challenge.message {
                    Some(message) => print_info(message),
                    None => print_info(&format!(
                        "To sign in, open {} in a browser and enter the code {}",
                        challenge.verification_uri, challenge.user_code
                    )),
                }
            })
            .await
    };

    let records = finish(&mut profile, outcome).await?;

    print_success("Login successful.");
    if json {
        json_output(&records)?;
    } else {
        println!("{}", account_table(&records));
    }
    Ok(())
}

/// Handle the logout command
pub async fn handle_logout(
    username: Option<String>,
    all: bool,
    config_dir: &Path,
    config: &CliConfig,
) -> Result<()> {
    let mut profile = open_profile(config_dir, config, None).await?;

    if all {
        let outcome = profile.logout_all().await;
        finish(&mut profile, outcome).await?;
        print_success("Signed out of all accounts.");
        return Ok(());
    }

    let user = match username {
        Some(user) => user,
        None => match profile.get_subscription(None).await {
            Ok(record) => record.user.name,
            Err(AuthError::NotLoggedIn) => {
                print_info("You are not signed in.");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        },
    };

    let outcome = profile.logout(&user).await;
    finish(&mut profile, outcome).await?;
    print_success(&format!("Signed out '{user}'."));
    Ok(())
}

/// Run the cache flush barrier whatever the command outcome was, then
/// surface the more interesting of the two errors.
pub(crate) async fn finish<T>(
    profile: &mut Profile,
    outcome: azctl_sdk::AuthResult<T>,
) -> Result<T> {
    let flushed = profile.shutdown().await;
    let value = outcome?;
    flushed?;
    Ok(value)
}

fn prompt_secret(prompt: &str) -> Result<String> {
    dialoguer::Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| {
            CliError::internal(format!("could not read secret from the terminal: {e}"))
                .with_suggestion("Pass the value with --password when running non-interactively")
        })
}
