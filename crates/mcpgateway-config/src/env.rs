//! Environment variable parsing helpers.
//!
//! The gateway's env surface uses flat, historically-named keys (`HOST`,
//! `DATABASE_URL`, `MCPGATEWAY_ENABLE_FEDERATION`, ...), so each override
//! is applied explicitly rather than through a prefix-mapped source. This
//! keeps validation errors pointing at the exact key the operator set.

use crate::{ConfigError, ConfigResult};
use std::str::FromStr;
use std::time::Duration;

/// Read an env var, treating empty strings as unset.
pub(crate) fn var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Parse an env var with `FromStr`, naming the key on failure.
pub(crate) fn parse<T: FromStr>(key: &str) -> ConfigResult<Option<T>> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, format!("cannot parse {raw:?}"))),
        None => Ok(None),
    }
}

/// Parse a boolean env var. Accepts `true/false`, `1/0`, `yes/no`, `on/off`
/// case-insensitively.
pub(crate) fn parse_bool(key: &str) -> ConfigResult<Option<bool>> {
    match var(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            other => Err(ConfigError::invalid(
                key,
                format!("expected a boolean, got {other:?}"),
            )),
        },
        None => Ok(None),
    }
}

/// Parse a duration given in whole seconds.
pub(crate) fn parse_secs(key: &str) -> ConfigResult<Option<Duration>> {
    Ok(parse::<u64>(key)?.map(Duration::from_secs))
}

/// Parse a comma-separated list, trimming whitespace and dropping empties.
pub(crate) fn parse_list(key: &str) -> Option<Vec<String>> {
    var(key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[cfg(test)]
#[allow(unsafe_code)] // Required for set_var in Rust 2024 edition
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn bool_parsing_accepts_common_spellings() {
        unsafe { std::env::set_var("MCPGW_TEST_BOOL", "Yes") };
        assert_eq!(parse_bool("MCPGW_TEST_BOOL").unwrap(), Some(true));
        unsafe { std::env::set_var("MCPGW_TEST_BOOL", "0") };
        assert_eq!(parse_bool("MCPGW_TEST_BOOL").unwrap(), Some(false));
        unsafe { std::env::set_var("MCPGW_TEST_BOOL", "maybe") };
        assert!(parse_bool("MCPGW_TEST_BOOL").is_err());
        unsafe { std::env::remove_var("MCPGW_TEST_BOOL") };
    }

    #[test]
    #[serial]
    fn empty_env_var_is_unset() {
        unsafe { std::env::set_var("MCPGW_TEST_EMPTY", "  ") };
        assert_eq!(var("MCPGW_TEST_EMPTY"), None);
        unsafe { std::env::remove_var("MCPGW_TEST_EMPTY") };
    }

    #[test]
    #[serial]
    fn list_parsing_trims_and_drops_empties() {
        unsafe { std::env::set_var("MCPGW_TEST_LIST", "X-Tenant-Id, X-Trace-Id,,") };
        assert_eq!(
            parse_list("MCPGW_TEST_LIST").unwrap(),
            vec!["X-Tenant-Id".to_string(), "X-Trace-Id".to_string()]
        );
        unsafe { std::env::remove_var("MCPGW_TEST_LIST") };
    }
}
