//! Subscription management command handlers

use crate::cli::commands::AccountAction;
use crate::cli::handlers::{auth::finish, open_profile};
use crate::config::CliConfig;
use crate::error::{CliError, Result};
use crate::output::{account_table, json_output, print_info, print_success};
use std::path::Path;

/// Handle `azctl account` subcommands
pub async fn handle_account(
    action: AccountAction,
    config_dir: &Path,
    config: &CliConfig,
    json: bool,
) -> Result<()> {
    let mut profile = open_profile(config_dir, config, None).await?;

    match action {
        AccountAction::List => {
            let records = profile.subscriptions().await?;
            if records.is_empty() {
                print_info("No accounts are signed in. Run `azctl login`.");
                return Ok(());
            }
            if json {
                json_output(&records)?;
            } else {
                println!("{}", account_table(&records));
            }
            Ok(())
        }

        AccountAction::Show { subscription } => {
            let record = profile.get_subscription(subscription.as_deref()).await?;
            json_output(&record)
        }

        AccountAction::Set { subscription } => {
            let record = profile.set_active_subscription(&subscription).await?;
            print_success(&format!(
                "Active subscription is now '{}' ({})",
                record.name, record.id
            ));
            Ok(())
        }

        AccountAction::Clear { yes } => {
            if !yes && !confirm_clear()? {
                print_info("Cancelled.");
                return Ok(());
            }
            let outcome = profile.logout_all().await;
            finish(&mut profile, outcome).await?;
            print_success("Removed all accounts and cached credentials.");
            Ok(())
        }

        AccountAction::GetAccessToken {
            resource,
            subscription,
        } => {
            let record = profile.get_subscription(subscription.as_deref()).await?;
            let outcome = profile
                .get_raw_token(resource.as_deref(), subscription.as_deref())
                .await;
            let (token_type, token, entry) = finish(&mut profile, outcome).await?;

            json_output(&serde_json::json!({
                "accessToken": token,
                "tokenType": token_type,
                "expiresOn": entry.expires_on,
                "subscription": record.id,
                "tenant": record.tenant_id,
            }))
        }
    }
}

fn confirm_clear() -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt("Remove all accounts and cached credentials?")
        .default(false)
        .interact()
        .map_err(|e| {
            CliError::internal(format!("could not read confirmation: {e}"))
                .with_suggestion("Use `--yes` to skip the prompt when running non-interactively")
        })
}
