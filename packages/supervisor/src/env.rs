// ABOUTME: Environment variable parsing utilities
// ABOUTME: Provides helper functions for parsing and validating environment variables

use std::str::FromStr;

/// Read and parse a variable, silently using `default` when it is unset or malformed
pub fn parse_env_or_default<T>(var_name: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(var_name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Like [`parse_env_or_default`], but values rejected by `validator` also fall back.
///
/// A set-but-rejected value is logged so misconfiguration is visible.
pub fn parse_env_or_default_with_validation<T, F>(var_name: &str, default: T, validator: F) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(T) -> bool,
{
    match std::env::var(var_name) {
        Ok(raw_value) => match raw_value.trim().parse::<T>() {
            Ok(parsed_value) if validator(parsed_value) => parsed_value,
            Ok(_) => {
                tracing::warn!(
                    "Environment variable {} has invalid value '{}', using default: {}",
                    var_name,
                    raw_value,
                    default
                );
                default
            }
            Err(_) => {
                tracing::warn!(
                    "Environment variable {} has unparseable value '{}', using default: {}",
                    var_name,
                    raw_value,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean flag, accepting 1/0, true/false, yes/no and on/off
pub fn parse_env_flag(var_name: &str, default: bool) -> bool {
    match std::env::var(var_name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                tracing::warn!(
                    "Environment variable {} has unrecognized flag '{}', using default: {}",
                    var_name,
                    raw,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

/// Read a string variable, treating empty values as unset
pub fn env_string_or(var_name: &str, default: &str) -> String {
    std::env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Split a comma separated list, dropping blank entries
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_env_or_default_not_set() {
        std::env::remove_var("NEXUS_TEST_VAR_NOT_SET");
        let result: u64 = parse_env_or_default("NEXUS_TEST_VAR_NOT_SET", 42);
        assert_eq!(result, 42);
    }

    #[test]
    #[serial]
    fn test_parse_env_or_default_invalid() {
        std::env::set_var("NEXUS_TEST_VAR_INVALID", "not_a_number");
        let result: u64 = parse_env_or_default("NEXUS_TEST_VAR_INVALID", 42);
        assert_eq!(result, 42);
        std::env::remove_var("NEXUS_TEST_VAR_INVALID");
    }

    #[test]
    #[serial]
    fn test_parse_env_with_validation_rejects_out_of_range() {
        std::env::set_var("NEXUS_TEST_VALIDATION", "50000");
        let result =
            parse_env_or_default_with_validation("NEXUS_TEST_VALIDATION", 200usize, |v| {
                (10..=10000).contains(&v)
            });
        assert_eq!(result, 200);

        std::env::set_var("NEXUS_TEST_VALIDATION", "500");
        let result =
            parse_env_or_default_with_validation("NEXUS_TEST_VALIDATION", 200usize, |v| {
                (10..=10000).contains(&v)
            });
        assert_eq!(result, 500);
        std::env::remove_var("NEXUS_TEST_VALIDATION");
    }

    #[test]
    #[serial]
    fn test_parse_env_flag_variants() {
        std::env::set_var("NEXUS_TEST_FLAG", "yes");
        assert!(parse_env_flag("NEXUS_TEST_FLAG", false));
        std::env::set_var("NEXUS_TEST_FLAG", "OFF");
        assert!(!parse_env_flag("NEXUS_TEST_FLAG", true));
        std::env::set_var("NEXUS_TEST_FLAG", "maybe");
        assert!(parse_env_flag("NEXUS_TEST_FLAG", true));
        std::env::remove_var("NEXUS_TEST_FLAG");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("nexus, prover,,"), vec!["nexus", "prover"]);
        assert!(split_list("  ").is_empty());
    }
}
