//! Environment variable expansion for configuration strings.

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` names the configuration key in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_unchanged() {
        assert_eq!(expand_env("npm", "build.command").unwrap(), "npm");
    }

    #[test]
    fn test_default_used_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("RELIVE_EXPAND_UNSET");
        }
        let value = expand_env("${RELIVE_EXPAND_UNSET:-fallback}", "server.host").unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_missing_var_names_field_and_var() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("RELIVE_EXPAND_MISSING");
        }
        let err = expand_env("${RELIVE_EXPAND_MISSING}", "build.cwd").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("build.cwd"));
        assert!(msg.contains("RELIVE_EXPAND_MISSING"));
    }
}
