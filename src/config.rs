//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Wizard configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Path of the local libSQL database holding the profile slot.
    pub db_path: PathBuf,
    /// Settings owner for the profile slot (single-user console).
    pub user_id: String,
    /// Whether the mock collaborators sleep to imitate network latency.
    pub simulate_latency: bool,
    /// Probability that a mock identity verification succeeds.
    pub verify_success_rate: f64,
    /// Recipient of new-application notifications.
    pub bizdev_email: String,
    /// Sender address on notifications.
    pub from_email: String,
    /// Directory for rolling log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/onboarding.db"),
            user_id: "default".to_string(),
            simulate_latency: true,
            verify_success_rate: 0.85,
            bizdev_email: "bizdev@arqitech.com".to_string(),
            from_email: "onboarding@arqitech.com".to_string(),
            log_dir: None,
        }
    }
}

impl WizardConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let db_path = lookup("ONBOARDING_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let user_id = lookup("ONBOARDING_USER_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.user_id);

        let simulate_latency = match lookup("ONBOARDING_SIMULATE_LATENCY") {
            Some(raw) => parse_bool("ONBOARDING_SIMULATE_LATENCY", &raw)?,
            None => defaults.simulate_latency,
        };

        let verify_success_rate = match lookup("ONBOARDING_VERIFY_SUCCESS_RATE") {
            Some(raw) => {
                let rate: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "ONBOARDING_VERIFY_SUCCESS_RATE".to_string(),
                    message: format!("'{raw}' is not a number"),
                })?;
                if !(0.0..=1.0).contains(&rate) {
                    return Err(ConfigError::InvalidValue {
                        key: "ONBOARDING_VERIFY_SUCCESS_RATE".to_string(),
                        message: format!("{rate} is outside 0..=1"),
                    });
                }
                rate
            }
            None => defaults.verify_success_rate,
        };

        let bizdev_email = lookup("ONBOARDING_BIZDEV_EMAIL").unwrap_or(defaults.bizdev_email);
        let from_email = lookup("ONBOARDING_FROM_EMAIL").unwrap_or(defaults.from_email);
        let log_dir = lookup("ONBOARDING_LOG_DIR").map(PathBuf::from);

        Ok(Self {
            db_path,
            user_id,
            simulate_latency,
            verify_success_rate,
            bizdev_email,
            from_email,
            log_dir,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{other}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = WizardConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("./data/onboarding.db"));
        assert_eq!(config.user_id, "default");
        assert!(config.simulate_latency);
        assert_eq!(config.verify_success_rate, 0.85);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = WizardConfig::from_lookup(lookup_from(&[
            ("ONBOARDING_DB_PATH", "/tmp/x.db"),
            ("ONBOARDING_USER_ID", "alice"),
            ("ONBOARDING_SIMULATE_LATENCY", "off"),
            ("ONBOARDING_VERIFY_SUCCESS_RATE", "1.0"),
            ("ONBOARDING_LOG_DIR", "/tmp/logs"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.user_id, "alice");
        assert!(!config.simulate_latency);
        assert_eq!(config.verify_success_rate, 1.0);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn blank_user_id_falls_back() {
        let config =
            WizardConfig::from_lookup(lookup_from(&[("ONBOARDING_USER_ID", "   ")])).unwrap();
        assert_eq!(config.user_id, "default");
    }

    #[test]
    fn rejects_out_of_range_success_rate() {
        let err = WizardConfig::from_lookup(lookup_from(&[(
            "ONBOARDING_VERIFY_SUCCESS_RATE",
            "1.5",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ONBOARDING_VERIFY_SUCCESS_RATE"));
    }

    #[test]
    fn rejects_garbage_boolean() {
        let err = WizardConfig::from_lookup(lookup_from(&[(
            "ONBOARDING_SIMULATE_LATENCY",
            "maybe",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }
}
