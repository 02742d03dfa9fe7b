//! Global gates evaluated once per serving attempt, before any candidate is fetched.
//!
//! Rules run in a fixed order and stop at the first denial.

mod rules;

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::AdsConfig;
use crate::model::adapters::AdsClient;
use crate::model::AdEvent;

pub use rules::{
    AdsPerDayPermissionRule, AdsPerHourPermissionRule, AllowNotificationsPermissionRule,
    BrowserIsActivePermissionRule, CatalogPermissionRule, DoNotDisturbPermissionRule,
    FeatureEnabledPermissionRule, FullScreenModePermissionRule, MediaPermissionRule,
    MinimumWaitTimePermissionRule, NetworkConnectionPermissionRule,
    SupportedVersionPermissionRule, UnblindedTokensPermissionRule, UserActivityPermissionRule,
};

/// Inputs shared by every permission rule for one attempt.
pub struct PermissionContext<'a> {
    pub ads_client: &'a dyn AdsClient,
    pub config: &'a AdsConfig,
    /// Served events for the ad type, at least a day deep.
    pub served_ad_events: &'a [AdEvent],
    pub now: DateTime<Utc>,
    pub local_now: DateTime<FixedOffset>,
}

pub trait PermissionRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` carries the reason serving is not allowed right now.
    fn should_allow(&self, context: &PermissionContext<'_>) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{rule}: {reason}")]
pub struct PermissionDenied {
    pub rule: &'static str,
    pub reason: String,
}

pub struct PermissionRules {
    rules: Vec<Box<dyn PermissionRule>>,
}

impl PermissionRules {
    pub fn new(rules: Vec<Box<dyn PermissionRule>>) -> Self {
        Self { rules }
    }

    /// Feature gate, version gate, then the notification ad permission set.
    pub fn notification_ads() -> Self {
        Self::new(vec![
            Box::new(FeatureEnabledPermissionRule),
            Box::new(SupportedVersionPermissionRule),
            Box::new(AllowNotificationsPermissionRule),
            Box::new(NetworkConnectionPermissionRule),
            Box::new(FullScreenModePermissionRule),
            Box::new(BrowserIsActivePermissionRule),
            Box::new(DoNotDisturbPermissionRule),
            Box::new(CatalogPermissionRule),
            Box::new(UnblindedTokensPermissionRule),
            Box::new(UserActivityPermissionRule),
            Box::new(MediaPermissionRule),
            Box::new(AdsPerDayPermissionRule),
            Box::new(AdsPerHourPermissionRule),
            Box::new(MinimumWaitTimePermissionRule),
        ])
    }

    pub fn has_permission(&self, context: &PermissionContext<'_>) -> Result<(), PermissionDenied> {
        for rule in &self.rules {
            if let Err(reason) = rule.should_allow(context) {
                info!(rule = rule.name(), %reason, "Permission denied");
                return Err(PermissionDenied {
                    rule: rule.name(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
