//! Environment variable interpolation for config files.
//!
//! Supports:
//! - `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset or empty
//! - `$$` - escape sequence for a literal `$`

use regex::Regex;
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                            # escape sequence
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)    # variable name
            (?: :- ([^}]*) )?           # optional default
        \}
        ",
    )
    .expect("interpolation pattern must compile")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Any errors encountered. Accumulated so the user sees all missing
    /// variables at once.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            if &caps[0] == "$$" {
                return "$".to_string();
            }

            let name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str());

            match env::var(name) {
                Ok(value) if value.contains('\n') || value.contains('\r') => {
                    errors.push(format!(
                        "environment variable '{name}' contains newlines, which is not allowed"
                    ));
                    caps[0].to_string()
                }
                Ok(value) if value.is_empty() && default.is_some() => {
                    default.unwrap_or("").to_string()
                }
                Ok(value) => value,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        errors.push(format!("environment variable '{name}' is not set"));
                        caps[0].to_string()
                    }
                },
            }
        })
        .to_string();

    InterpolationResult { text, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: test env vars are unique per test and restored below
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring original environment state
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_braced_substitution() {
        with_env_vars(&[("SNOWDRIFT_TEST_BRACED", Some("flights"))], || {
            let result = interpolate("table: ${SNOWDRIFT_TEST_BRACED}");
            assert!(result.is_ok());
            assert_eq!(result.text, "table: flights");
        });
    }

    #[test]
    fn test_missing_variable_error() {
        with_env_vars(&[("SNOWDRIFT_TEST_MISSING", None)], || {
            let result = interpolate("path: ${SNOWDRIFT_TEST_MISSING}");
            assert!(!result.is_ok());
            assert_eq!(result.errors.len(), 1);
            assert!(result.errors[0].contains("SNOWDRIFT_TEST_MISSING"));
        });
    }

    #[test]
    fn test_default_value_when_unset() {
        with_env_vars(&[("SNOWDRIFT_TEST_UNSET", None)], || {
            let result = interpolate("region: ${SNOWDRIFT_TEST_UNSET:-us-east-1}");
            assert!(result.is_ok());
            assert_eq!(result.text, "region: us-east-1");
        });
    }

    #[test]
    fn test_default_value_when_empty() {
        with_env_vars(&[("SNOWDRIFT_TEST_EMPTY", Some(""))], || {
            let result = interpolate("region: ${SNOWDRIFT_TEST_EMPTY:-fallback}");
            assert!(result.is_ok());
            assert_eq!(result.text, "region: fallback");
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("price: $$100");
        assert!(result.is_ok());
        assert_eq!(result.text, "price: $100");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("SNOWDRIFT_TEST_NL", Some("a\nb"))], || {
            let result = interpolate("value: ${SNOWDRIFT_TEST_NL}");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_accumulates_all_errors() {
        with_env_vars(
            &[("SNOWDRIFT_TEST_A", None), ("SNOWDRIFT_TEST_B", None)],
            || {
                let result = interpolate("a: ${SNOWDRIFT_TEST_A}, b: ${SNOWDRIFT_TEST_B}");
                assert_eq!(result.errors.len(), 2);
            },
        );
    }
}
