//! National cloud definitions
//!
//! Each sovereign cloud runs its own Azure AD authority and Resource
//! Manager endpoint. The public cloud is the default everywhere.

use serde::{Deserialize, Serialize};

/// Endpoints of one Azure cloud environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cloud {
    /// Registered environment name, e.g. `AzureCloud`.
    pub name: String,
    /// Azure AD authority host, without a tenant segment.
    pub authority_host: String,
    /// Resource Manager endpoint, also the default token audience.
    pub resource_manager: String,
}

impl Cloud {
    /// The worldwide public cloud.
    pub fn azure_public() -> Cloud {
        Cloud {
            name: "AzureCloud".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            resource_manager: "https://management.azure.com".to_string(),
        }
    }

    /// Azure operated by 21Vianet.
    pub fn azure_china() -> Cloud {
        Cloud {
            name: "AzureChinaCloud".to_string(),
            authority_host: "https://login.chinacloudapi.cn".to_string(),
            resource_manager: "https://management.chinacloudapi.cn".to_string(),
        }
    }

    /// Azure Government.
    pub fn azure_us_government() -> Cloud {
        Cloud {
            name: "AzureUSGovernment".to_string(),
            authority_host: "https://login.microsoftonline.us".to_string(),
            resource_manager: "https://management.usgovcloudapi.net".to_string(),
        }
    }

    /// All registered clouds, public cloud first.
    pub fn known() -> Vec<Cloud> {
        vec![
            Cloud::azure_public(),
            Cloud::azure_china(),
            Cloud::azure_us_government(),
        ]
    }

    /// Look up a cloud by its registered name (case-insensitive).
    pub fn by_name(name: &str) -> Option<Cloud> {
        Cloud::known()
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Authority URL for one tenant, e.g.
    /// `https://login.microsoftonline.com/contoso.onmicrosoft.com`.
    pub fn authority(&self, tenant: &str) -> String {
        format!("{}/{}", self.authority_host.trim_end_matches('/'), tenant)
    }
}

impl Default for Cloud {
    fn default() -> Self {
        Cloud::azure_public()
    }
}
