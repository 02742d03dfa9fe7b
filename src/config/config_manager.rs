use std::env::VarError;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Desktop,
    Android,
    Ios,
}

impl Platform {
    pub fn is_mobile(&self) -> bool {
        matches!(self, Platform::Android | Platform::Ios)
    }
}

/// How already-served creatives are filtered out of later eligible sets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeenAdsPolicy {
    /// Skip seen ads until every eligible ad has been seen, then start over.
    #[default]
    RoundRobin,
    /// Skip seen ads, never starting over.
    Exclude,
    Disabled,
}

/// When reaction observers are notified.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReactionNotifyPolicy {
    #[default]
    EveryChange,
    /// Only when a toggle lands on liked, disliked, saved or flagged.
    PositiveOnly,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Serving parameters. Every field has a default so a partial (or missing) config file
/// is valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AdsConfig {
    pub serving_enabled: bool,
    /// Eligible-ads strategy: 1 (segment fallback chain), 2 (single query) or 3
    /// (single query, embedding required).
    pub serving_version: u32,
    #[serde(with = "duration_secs")]
    pub serve_first_ad_after: Duration,
    #[serde(with = "duration_secs")]
    pub minimum_delay_before_serving: Duration,
    #[serde(with = "duration_secs")]
    pub retry_serving_ad_after: Duration,
    pub remind_user_if_clicking_same_ad_after: u32,
    #[serde(with = "duration_secs")]
    pub history_time_window: Duration,
    pub platform: Platform,
    /// Defaults to `true` on mobile platforms when absent.
    pub serve_at_regular_intervals: Option<bool>,
    pub minimum_browser_version: u32,
    #[serde(with = "duration_secs")]
    pub catalog_lifespan: Duration,
    pub user_activity_threshold: f64,
    pub minimum_unblinded_tokens: usize,
    #[serde(with = "duration_secs")]
    pub transferred_window: Duration,
    /// Absent means a conversion excludes its creative set forever.
    #[serde(with = "option_duration_secs")]
    pub conversion_window: Option<Duration>,
    #[serde(with = "duration_secs")]
    pub dismissed_window: Duration,
    pub dismissed_cap: u32,
    pub seen_ads_policy: SeenAdsPolicy,
    pub reaction_notify_policy: ReactionNotifyPolicy,
    pub top_segments_count: usize,
    /// Do-not-disturb hours on mobile, local time, `[start, end)` wrapping midnight.
    pub do_not_disturb_from_hour: u32,
    pub do_not_disturb_to_hour: u32,
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            serving_enabled: true,
            serving_version: 2,
            serve_first_ad_after: 2 * MINUTE,
            minimum_delay_before_serving: MINUTE,
            retry_serving_ad_after: 2 * MINUTE,
            remind_user_if_clicking_same_ad_after: 3,
            history_time_window: 30 * DAY,
            platform: Platform::Desktop,
            serve_at_regular_intervals: None,
            minimum_browser_version: 0,
            catalog_lifespan: DAY,
            user_activity_threshold: 0.0,
            minimum_unblinded_tokens: 10,
            transferred_window: 48 * HOUR,
            conversion_window: None,
            dismissed_window: 48 * HOUR,
            dismissed_cap: 2,
            seen_ads_policy: SeenAdsPolicy::RoundRobin,
            reaction_notify_policy: ReactionNotifyPolicy::EveryChange,
            top_segments_count: 3,
            do_not_disturb_from_hour: 21,
            do_not_disturb_to_hour: 6,
        }
    }
}

impl AdsConfig {
    pub fn should_serve_at_regular_intervals(&self) -> bool {
        self.serve_at_regular_intervals
            .unwrap_or_else(|| self.platform.is_mobile())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.serving_version) {
            return Err(ConfigError::Invalid(format!(
                "serving_version must be 1, 2 or 3, got {}",
                self.serving_version
            )));
        }
        if self.remind_user_if_clicking_same_ad_after == 0 {
            return Err(ConfigError::Invalid(
                "remind_user_if_clicking_same_ad_after must be positive".to_string(),
            ));
        }
        if self.history_time_window.is_zero() {
            return Err(ConfigError::Invalid(
                "history_time_window must be positive".to_string(),
            ));
        }
        if self.do_not_disturb_from_hour > 23 || self.do_not_disturb_to_hour > 23 {
            return Err(ConfigError::Invalid(
                "do-not-disturb hours must be within 0..=23".to_string(),
            ));
        }
        Ok(())
    }
}

/// Owns the validated [`AdsConfig`] for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct ConfigManager {
    config: AdsConfig,
}

impl ConfigManager {
    pub fn new(config: AdsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(ConfigManager { config })
    }

    /// Loads the JSON config at `path` (defaults when the file does not exist), then
    /// applies `BRAVE_ADS_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = read_config_file(path.as_ref())?;
        let config = apply_env_overrides(config, |key| std::env::var(key))?;
        Self::new(config)
    }

    pub fn config(&self) -> &AdsConfig {
        &self.config
    }
}

fn read_config_file(path: &Path) -> Result<AdsConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "No ads config file, using defaults");
            return Ok(AdsConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Applies environment overrides using the provided lookup, so tests can drive it with
/// a plain map.
fn apply_env_overrides<F>(mut config: AdsConfig, lookup: F) -> Result<AdsConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    if let Ok(raw) = lookup("BRAVE_ADS_SERVING_VERSION") {
        config.serving_version = raw
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid("BRAVE_ADS_SERVING_VERSION", e.to_string()))?;
        debug!(serving_version = config.serving_version, "Serving version overridden");
    }

    if let Ok(raw) = lookup("BRAVE_ADS_SERVING_ENABLED") {
        config.serving_enabled = match raw.trim() {
            "1" | "true" => true,
            "0" | "false" => false,
            other => {
                return Err(invalid(
                    "BRAVE_ADS_SERVING_ENABLED",
                    format!("expected true/false, got {other:?}"),
                ))
            }
        };
    }

    if let Ok(raw) = lookup("BRAVE_ADS_PLATFORM") {
        config.platform = match raw.trim() {
            "desktop" => Platform::Desktop,
            "android" => Platform::Android,
            "ios" => Platform::Ios,
            other => {
                return Err(invalid(
                    "BRAVE_ADS_PLATFORM",
                    format!("unknown platform {other:?}"),
                ))
            }
        };
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn defaults_match_serving_parameters() {
        let config = AdsConfig::default();
        assert!(config.serving_enabled);
        assert_eq!(config.serving_version, 2);
        assert_eq!(config.serve_first_ad_after, Duration::from_secs(120));
        assert_eq!(config.minimum_delay_before_serving, Duration::from_secs(60));
        assert_eq!(config.retry_serving_ad_after, Duration::from_secs(120));
        assert_eq!(config.remind_user_if_clicking_same_ad_after, 3);
        assert!(!config.should_serve_at_regular_intervals());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AdsConfig =
            serde_json::from_str(r#"{"serving_version": 3, "retry_serving_ad_after": 0.5}"#)
                .unwrap();
        assert_eq!(config.serving_version, 3);
        assert_eq!(config.retry_serving_ad_after, Duration::from_millis(500));
        assert_eq!(config.minimum_delay_before_serving, Duration::from_secs(60));
    }

    #[test]
    fn mobile_platforms_serve_at_regular_intervals() {
        let config = AdsConfig {
            platform: Platform::Android,
            ..AdsConfig::default()
        };
        assert!(config.should_serve_at_regular_intervals());
    }

    #[test]
    fn rejects_unknown_serving_version() {
        let config = AdsConfig {
            serving_version: 7,
            ..AdsConfig::default()
        };
        assert!(matches!(ConfigManager::new(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_history_window() {
        let config = AdsConfig {
            history_time_window: Duration::ZERO,
            ..AdsConfig::default()
        };
        assert!(matches!(ConfigManager::new(config), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let map = HashMap::from([
            ("BRAVE_ADS_SERVING_VERSION", "1"),
            ("BRAVE_ADS_SERVING_ENABLED", "false"),
            ("BRAVE_ADS_PLATFORM", "ios"),
        ]);
        let config = apply_env_overrides(AdsConfig::default(), lookup_from_map(&map)).unwrap();
        assert_eq!(config.serving_version, 1);
        assert!(!config.serving_enabled);
        assert_eq!(config.platform, Platform::Ios);
    }

    #[test]
    fn env_override_with_garbage_fails() {
        let map = HashMap::from([("BRAVE_ADS_SERVING_VERSION", "two")]);
        let result = apply_env_overrides(AdsConfig::default(), lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "BRAVE_ADS_SERVING_VERSION"),
            "expected InvalidEnvVar, got: {result:?}"
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = read_config_file(Path::new("/definitely/not/here/ads.json")).unwrap();
        assert_eq!(config, AdsConfig::default());
    }
}
