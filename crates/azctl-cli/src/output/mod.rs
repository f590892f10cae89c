//! Output formatting utilities

use crate::error::Result;
use azctl_sdk::SubscriptionRecord;
use console::style;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output data as JSON
pub fn json_output<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    println!("{json}");
    Ok(())
}

/// Print a success message with green checkmark
pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message with red X
pub fn print_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Print an informational message with blue info icon
pub fn print_info(message: &str) {
    println!("{} {}", style("ℹ").blue(), message);
}

/// Print a warning message with yellow marker
pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), style(message).yellow());
}

#[derive(Tabled)]
struct AccountRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "SubscriptionId")]
    id: String,
    #[tabled(rename = "TenantId")]
    tenant_id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Default")]
    default_marker: String,
}

/// Render subscription records as the `account list` table.
pub fn account_table(records: &[SubscriptionRecord]) -> String {
    let rows: Vec<AccountRow> = records
        .iter()
        .map(|r| AccountRow {
            name: r.name.clone(),
            id: r.id.clone(),
            tenant_id: r.tenant_id.clone(),
            state: r.state.to_string(),
            default_marker: if r.is_default { "*".to_string() } else { String::new() },
        })
        .collect();

    Table::new(rows).with(Style::sharp()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use azctl_sdk::{AccountUser, SubscriptionState, UserType};

    #[test]
    fn account_table_marks_the_default_row() {
        let records = vec![SubscriptionRecord {
            id: "1111".to_string(),
            name: "Prod".to_string(),
            state: SubscriptionState::Enabled,
            user: AccountUser {
                name: "alice@contoso.com".to_string(),
                user_type: UserType::User,
            },
            is_default: true,
            tenant_id: "tenant-1".to_string(),
            environment_name: "AzureCloud".to_string(),
        }];

        let table = account_table(&records);
        assert!(table.contains("Prod"));
        assert!(table.contains("1111"));
        assert!(table.contains('*'));
    }
}
