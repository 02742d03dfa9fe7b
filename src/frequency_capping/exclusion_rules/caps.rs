use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::ExclusionRule;
use crate::frequency_capping::respects_cap;
use crate::model::ad_event::timestamps_where;
use crate::model::{AdEvent, ConfirmationType, CreativeAd};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const MONTH: Duration = Duration::from_secs(28 * 24 * 60 * 60);

/// Served events matching `matches`, counted over `window` and compared against `cap`.
/// A zero cap excludes, for every cap type.
fn check_served_cap<F>(
    ad_events: &[AdEvent],
    now: DateTime<Utc>,
    window: Option<Duration>,
    cap: u32,
    matches: F,
) -> bool
where
    F: Fn(&AdEvent) -> bool,
{
    let history = timestamps_where(ad_events, |event| {
        event.confirmation_type == ConfirmationType::Served && matches(event)
    });
    respects_cap(&history, now, window, cap)
}

/// Campaign-wide served cap over a rolling day.
pub struct DailyCapExclusionRule {
    ad_events: Arc<[AdEvent]>,
    now: DateTime<Utc>,
}

impl DailyCapExclusionRule {
    pub fn new(ad_events: Arc<[AdEvent]>, now: DateTime<Utc>) -> Self {
        Self { ad_events, now }
    }
}

impl ExclusionRule for DailyCapExclusionRule {
    fn name(&self) -> &'static str {
        "daily_cap"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        if !check_served_cap(&self.ad_events, self.now, Some(DAY), creative_ad.daily_cap, |event| {
            event.campaign_id == creative_ad.campaign_id
        }) {
            return Err(format!(
                "campaignId {} has exceeded the dailyCap frequency cap",
                creative_ad.campaign_id
            ));
        }
        Ok(())
    }
}

macro_rules! creative_set_cap_rule {
    ($rule:ident, $name:literal, $field:ident, $window:expr, $label:literal) => {
        pub struct $rule {
            ad_events: Arc<[AdEvent]>,
            now: DateTime<Utc>,
        }

        impl $rule {
            pub fn new(ad_events: Arc<[AdEvent]>, now: DateTime<Utc>) -> Self {
                Self { ad_events, now }
            }
        }

        impl ExclusionRule for $rule {
            fn name(&self) -> &'static str {
                $name
            }

            fn cache_key(&self, creative_ad: &CreativeAd) -> String {
                creative_ad.creative_set_id.clone()
            }

            fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
                if !check_served_cap(
                    &self.ad_events,
                    self.now,
                    $window,
                    creative_ad.$field,
                    |event| event.creative_set_id == creative_ad.creative_set_id,
                ) {
                    return Err(format!(
                        concat!("creativeSetId {} has exceeded the ", $label, " frequency cap"),
                        creative_ad.creative_set_id
                    ));
                }
                Ok(())
            }
        }
    };
}

creative_set_cap_rule!(PerDayExclusionRule, "per_day", per_day, Some(DAY), "perDay");
creative_set_cap_rule!(PerWeekExclusionRule, "per_week", per_week, Some(WEEK), "perWeek");
creative_set_cap_rule!(PerMonthExclusionRule, "per_month", per_month, Some(MONTH), "perMonth");
creative_set_cap_rule!(TotalMaxExclusionRule, "total_max", total_max, None, "totalMax");
