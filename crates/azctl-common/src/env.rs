//! Environment variables consumed by azctl

/// Overrides the configuration directory (where the credential cache and
/// subscription profile live).
pub const CONFIG_DIR_VAR: &str = "AZCTL_CONFIG_DIR";

/// Set by constrained cloud-console environments. Changes login defaults
/// and enables extra diagnostics on authentication failures.
pub const CLOUD_SHELL_VAR: &str = "AZCTL_CLOUD_SHELL";

/// Disables TLS certificate verification on outbound requests. Intended
/// for corporate proxies that re-sign traffic; logged loudly when set.
pub const TLS_NO_VERIFY_VAR: &str = "AZCTL_TLS_NO_VERIFY";

/// Full URL of the local managed-identity token endpoint, set by cloud
/// shell and some container hosts.
pub const MSI_ENDPOINT_VAR: &str = "MSI_ENDPOINT";

fn flag_is_set(var: &str) -> bool {
    match std::env::var(var) {
        Ok(v) => !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"),
        Err(_) => false,
    }
}

/// Whether we are running inside a cloud-console environment.
pub fn in_cloud_shell() -> bool {
    flag_is_set(CLOUD_SHELL_VAR)
}

/// Whether TLS certificate verification has been disabled by the user.
pub fn tls_verification_disabled() -> bool {
    flag_is_set(TLS_NO_VERIFY_VAR)
}

/// Managed-identity endpoint override, if any.
pub fn msi_endpoint_override() -> Option<String> {
    std::env::var(MSI_ENDPOINT_VAR).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn flag_parsing() {
        std::env::remove_var(CLOUD_SHELL_VAR);
        assert!(!in_cloud_shell());

        std::env::set_var(CLOUD_SHELL_VAR, "1");
        assert!(in_cloud_shell());

        std::env::set_var(CLOUD_SHELL_VAR, "false");
        assert!(!in_cloud_shell());

        std::env::remove_var(CLOUD_SHELL_VAR);
    }
}
