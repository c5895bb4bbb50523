use rocket::figment::providers::{Env, Format, Serialized, Toml};
use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

use std::path::PathBuf;
use std::time::Duration;

use crate::internal_error::InternalResult;

pub const CONFIG_FILE: &str = "Agenda.toml";
pub const ENV_PREFIX: &str = "AGENDA_";

/// What to do when the initial remote load times out or fails.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailurePolicy {
    /// Hydrate from local storage and keep the error around for display.
    Fallback,
    /// Stay in the failed state and refuse mutations.
    Surface,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub backend_url: Option<String>,
    pub backend_key: Option<String>,
    pub database: PathBuf,
    pub load_timeout_secs: u64,
    pub load_failure: LoadFailurePolicy,
    pub static_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> AppConfig {
        AppConfig {
            backend_url: None,
            backend_key: None,
            database: PathBuf::from("agenda.db"),
            load_timeout_secs: 8,
            load_failure: LoadFailurePolicy::Fallback,
            static_dir: None,
        }
    }
}

/// Connection details for the hosted backend, present only when both
/// values are non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

impl AppConfig {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load() -> InternalResult<AppConfig> {
        AppConfig::from_figment(&AppConfig::figment())
    }

    pub fn from_figment(figment: &Figment) -> InternalResult<AppConfig> {
        Ok(figment.extract()?)
    }

    pub fn backend(&self) -> Option<BackendConfig> {
        let url = self.backend_url.as_deref().map(str::trim).unwrap_or("");
        let anon_key = self.backend_key.as_deref().map(str::trim).unwrap_or("");

        if url.is_empty() || anon_key.is_empty() {
            return None;
        }

        Some(BackendConfig {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_in_local_mode() {
        let config = AppConfig::from_figment(&Figment::from(Serialized::defaults(
            AppConfig::default(),
        )))
        .unwrap();

        assert!(config.backend().is_none());
        assert_eq!(config.load_timeout(), Duration::from_secs(8));
        assert_eq!(config.load_failure, LoadFailurePolicy::Fallback);
    }

    #[test]
    fn blank_backend_values_mean_local_mode() {
        let config = AppConfig {
            backend_url: Some("https://example.supabase.co".into()),
            backend_key: Some("   ".into()),
            ..AppConfig::default()
        };
        assert!(config.backend().is_none());

        let config = AppConfig {
            backend_url: Some("".into()),
            backend_key: Some("anon".into()),
            ..AppConfig::default()
        };
        assert!(config.backend().is_none());
    }

    #[test]
    fn backend_url_loses_trailing_slash() {
        let config = AppConfig {
            backend_url: Some("https://example.supabase.co/".into()),
            backend_key: Some("anon".into()),
            ..AppConfig::default()
        };

        assert_eq!(
            config.backend(),
            Some(BackendConfig {
                url: "https://example.supabase.co".into(),
                anon_key: "anon".into(),
            })
        );
    }

    #[test]
    fn overrides_merge_over_defaults() {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(("load_failure", "surface"))
            .merge(("load_timeout_secs", 10));

        let config = AppConfig::from_figment(&figment).unwrap();
        assert_eq!(config.load_failure, LoadFailurePolicy::Surface);
        assert_eq!(config.load_timeout_secs, 10);
    }
}
