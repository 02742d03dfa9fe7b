use std::time::Duration;

use chrono::Timelike;

use super::{PermissionContext, PermissionRule};
use crate::frequency_capping::{respects_cap, to_time_delta};

const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn served_history(context: &PermissionContext<'_>) -> Vec<chrono::DateTime<chrono::Utc>> {
    context
        .served_ad_events
        .iter()
        .map(|event| event.created_at)
        .collect()
}

pub struct FeatureEnabledPermissionRule;

impl PermissionRule for FeatureEnabledPermissionRule {
    fn name(&self) -> &'static str {
        "feature_enabled"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if !context.config.serving_enabled {
            return Err("Ad serving feature is disabled".to_string());
        }
        Ok(())
    }
}

pub struct SupportedVersionPermissionRule;

impl PermissionRule for SupportedVersionPermissionRule {
    fn name(&self) -> &'static str {
        "supported_version"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        let version = context.ads_client.browser_major_version();
        if version < context.config.minimum_browser_version {
            return Err(format!(
                "Browser version {version} is below the minimum supported version {}",
                context.config.minimum_browser_version
            ));
        }
        Ok(())
    }
}

pub struct AllowNotificationsPermissionRule;

impl PermissionRule for AllowNotificationsPermissionRule {
    fn name(&self) -> &'static str {
        "allow_notifications"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if !context.ads_client.can_show_notification_ads() {
            return Err("System notifications not allowed".to_string());
        }
        Ok(())
    }
}

pub struct NetworkConnectionPermissionRule;

impl PermissionRule for NetworkConnectionPermissionRule {
    fn name(&self) -> &'static str {
        "network_connection"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if !context.ads_client.is_network_connection_available() {
            return Err("Network connection is unavailable".to_string());
        }
        Ok(())
    }
}

pub struct FullScreenModePermissionRule;

impl PermissionRule for FullScreenModePermissionRule {
    fn name(&self) -> &'static str {
        "full_screen_mode"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if context.ads_client.is_browser_in_full_screen_mode() {
            return Err("Full screen mode".to_string());
        }
        Ok(())
    }
}

/// Desktop only.
pub struct BrowserIsActivePermissionRule;

impl PermissionRule for BrowserIsActivePermissionRule {
    fn name(&self) -> &'static str {
        "browser_is_active"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if context.config.platform.is_mobile() || context.ads_client.is_browser_active() {
            return Ok(());
        }
        Err("Browser window is not active".to_string())
    }
}

/// Mobile only: no ads overnight while the browser is in the background.
pub struct DoNotDisturbPermissionRule;

impl DoNotDisturbPermissionRule {
    fn is_quiet_hour(hour: u32, from: u32, to: u32) -> bool {
        if from <= to {
            hour >= from && hour < to
        } else {
            hour >= from || hour < to
        }
    }
}

impl PermissionRule for DoNotDisturbPermissionRule {
    fn name(&self) -> &'static str {
        "do_not_disturb"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if !context.config.platform.is_mobile() || context.ads_client.is_browser_active() {
            return Ok(());
        }
        let hour = context.local_now.hour();
        if Self::is_quiet_hour(
            hour,
            context.config.do_not_disturb_from_hour,
            context.config.do_not_disturb_to_hour,
        ) {
            return Err("Should not disturb".to_string());
        }
        Ok(())
    }
}

pub struct CatalogPermissionRule;

impl PermissionRule for CatalogPermissionRule {
    fn name(&self) -> &'static str {
        "catalog"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        let Some(last_updated_at) = context.ads_client.catalog_last_updated_at() else {
            return Err("Catalog does not exist".to_string());
        };
        if context.now - last_updated_at >= to_time_delta(context.config.catalog_lifespan) {
            return Err("Catalog has expired".to_string());
        }
        Ok(())
    }
}

/// Denies when the token wallet runs low, asking for a refill on the way out.
pub struct UnblindedTokensPermissionRule;

impl PermissionRule for UnblindedTokensPermissionRule {
    fn name(&self) -> &'static str {
        "unblinded_tokens"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        let count = context.ads_client.unblinded_token_count();
        if count < context.config.minimum_unblinded_tokens {
            context.ads_client.refill_unblinded_tokens();
            return Err(format!(
                "You do not have enough unblinded tokens ({count} < {})",
                context.config.minimum_unblinded_tokens
            ));
        }
        Ok(())
    }
}

pub struct UserActivityPermissionRule;

impl PermissionRule for UserActivityPermissionRule {
    fn name(&self) -> &'static str {
        "user_activity"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        let score = context.ads_client.user_activity_score();
        if score < context.config.user_activity_threshold {
            return Err(format!(
                "User was inactive (score {score} below threshold {})",
                context.config.user_activity_threshold
            ));
        }
        Ok(())
    }
}

pub struct MediaPermissionRule;

impl PermissionRule for MediaPermissionRule {
    fn name(&self) -> &'static str {
        "media"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if context.ads_client.is_media_playing() {
            return Err("Media is playing".to_string());
        }
        Ok(())
    }
}

pub struct AdsPerDayPermissionRule;

impl PermissionRule for AdsPerDayPermissionRule {
    fn name(&self) -> &'static str {
        "ads_per_day"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        let cap = context.ads_client.maximum_notification_ads_per_day();
        if !respects_cap(&served_history(context), context.now, Some(DAY), cap) {
            return Err("You have exceeded the allowed ads per day".to_string());
        }
        Ok(())
    }
}

/// Desktop only.
pub struct AdsPerHourPermissionRule;

impl PermissionRule for AdsPerHourPermissionRule {
    fn name(&self) -> &'static str {
        "ads_per_hour"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if context.config.platform.is_mobile() {
            return Ok(());
        }
        let cap = context.ads_client.maximum_notification_ads_per_hour();
        if !respects_cap(&served_history(context), context.now, Some(HOUR), cap) {
            return Err("You have exceeded the allowed ads per hour".to_string());
        }
        Ok(())
    }
}

/// Desktop only: at most one ad per `1 hour / ads per hour`.
pub struct MinimumWaitTimePermissionRule;

impl PermissionRule for MinimumWaitTimePermissionRule {
    fn name(&self) -> &'static str {
        "minimum_wait_time"
    }

    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String> {
        if context.config.platform.is_mobile() {
            return Ok(());
        }
        let ads_per_hour = context.ads_client.maximum_notification_ads_per_hour();
        if ads_per_hour == 0 {
            return Err("Notification ads are switched off".to_string());
        }
        let window = HOUR / ads_per_hour;
        if !respects_cap(&served_history(context), context.now, Some(window), 1) {
            return Err("Ad cannot be shown as minimum wait time has not passed".to_string());
        }
        Ok(())
    }
}
